//! Token conversions applied to raw grammar captures.
//!
//! Every function returns `None` when the token does not fit its target
//! type; the grammars turn that into a field coercion failure so the
//! variant under trial is abandoned instead of aborting the run.

use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};

use crate::record::Delays;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct",
    "Nov", "Dec",
];

/// Hostname token postfix logs when reverse DNS gave nothing.
const UNKNOWN_HOSTNAME: &str = "unknown";

pub fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().position(|month| *month == name).map(|idx| idx as u32 + 1)
}

/// Syslog timestamps carry no year, so it always comes from the caller.
pub fn calendar_date(
    year: i32,
    month: u32,
    day: u32
) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn time_of_day(token: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(token, "%H:%M:%S").ok()
}

/// Strict unsigned integer: ascii digits only, no sign, no blanks.
pub fn integer<T: FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Non-negative decimal seconds such as `0.18`, `0` or `12`.
pub fn seconds(token: &str) -> Option<f64> {
    if token.is_empty()
        || !token.bytes().all(|b| b.is_ascii_digit() || b == b'.')
    {
        return None;
    }
    token.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// `before_queue/in_queue/connect/transmit`, exactly four parts.
pub fn delays(token: &str) -> Option<Delays> {
    let mut parts = [0.0_f64; 4];
    let mut split = token.split('/');

    for slot in parts.iter_mut() {
        *slot = seconds(split.next()?)?;
    }

    if split.next().is_some() {
        return None;
    }

    Some(Delays::from(parts))
}

/// Enhanced status code `class.subject.detail`, kept as text.
pub fn dsn(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|part| integer::<u16>(part).is_none())
    {
        return None;
    }
    Some(token.to_string())
}

pub fn ipv4(token: &str) -> Option<Ipv4Addr> {
    token.parse().ok()
}

/// Maps postfix's `unknown` placeholder to an absent hostname.
pub fn optional_hostname(token: &str) -> Option<String> {
    if token == UNKNOWN_HOSTNAME { None } else { Some(token.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_abbreviations_map_to_calendar_months() {
        assert_eq!(month_number("Jan"), Some(1));
        assert_eq!(month_number("Sep"), Some(9));
        assert_eq!(month_number("Dec"), Some(12));
        assert_eq!(month_number("Sept"), None);
        assert_eq!(month_number("sep"), None);
    }

    #[test]
    fn calendar_date_uses_supplied_year() {
        assert_eq!(
            calendar_date(2009, 9, 27),
            NaiveDate::from_ymd_opt(2009, 9, 27)
        );
        assert_eq!(calendar_date(2009, 2, 29), None);
        assert!(calendar_date(2008, 2, 29).is_some());
    }

    #[test]
    fn time_of_day_accepts_syslog_clock() {
        assert_eq!(time_of_day("09:58:05"), NaiveTime::from_hms_opt(9, 58, 5));
        assert_eq!(time_of_day("24:00:00"), None);
        assert_eq!(time_of_day("09:58"), None);
    }

    #[test]
    fn integers_are_strict() {
        assert_eq!(integer::<u64>("16324"), Some(16324));
        assert_eq!(integer::<u64>("+1"), None);
        assert_eq!(integer::<u64>("abc"), None);
        assert_eq!(integer::<u64>(""), None);
        assert_eq!(integer::<u16>("70000"), None);
    }

    #[test]
    fn seconds_accept_plain_decimals_only() {
        assert_eq!(seconds("0.18"), Some(0.18));
        assert_eq!(seconds("0"), Some(0.0));
        assert_eq!(seconds("-1"), None);
        assert_eq!(seconds("1e3"), None);
        assert_eq!(seconds("1.2.3"), None);
    }

    #[test]
    fn delays_require_four_parts() {
        let parsed = delays("0.11/0/0/0.06").unwrap();
        assert_eq!(parsed.as_array(), [0.11, 0.0, 0.0, 0.06]);
        assert_eq!(parsed.to_string(), "0.11/0/0/0.06");

        assert_eq!(delays("0.11/0/0"), None);
        assert_eq!(delays("0.11/0/0/0.06/1"), None);
        assert_eq!(delays("0.11/x/0/0.06"), None);
    }

    #[test]
    fn dsn_is_a_dotted_triplet() {
        assert_eq!(dsn("2.1.5").as_deref(), Some("2.1.5"));
        assert_eq!(dsn("4.4.1").as_deref(), Some("4.4.1"));
        assert_eq!(dsn("2.1"), None);
        assert_eq!(dsn("2.1.5.0"), None);
        assert_eq!(dsn("2..5"), None);
    }

    #[test]
    fn unknown_hostname_is_absent() {
        assert_eq!(optional_hostname("unknown"), None);
        assert_eq!(
            optional_hostname("mail.example.com").as_deref(),
            Some("mail.example.com")
        );
    }
}
