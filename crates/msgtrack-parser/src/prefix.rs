//! Shared header grammar and the small token parsers every variant reuses.
//!
//! Blanks between tokens are optional, so padded days (`Sep  7`) and
//! `client=host[ip], sasl_method=...` spacing variations parse the same way.
//! Compound tokens (time, addresses, dotted numbers) allow no inner blanks.

use std::net::Ipv4Addr;

use chrono::NaiveTime;
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while1};
use nom::character::complete::{char, digit1, one_of, space0};
use nom::combinator::{map, map_res, opt, recognize, verify};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded, separated_pair, terminated, tuple};
use nom::{IResult, Parser};

use crate::error::{ClassifyError, GrammarError, InvalidField};
use crate::normalize;
use crate::record::Header;

pub(crate) type PResult<'a, O> = IResult<&'a str, O, GrammarError<'a>>;

/// Header fields before normalization; the year is applied later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawHeader<'a> {
    pub month: u32,
    pub day: u32,
    pub time: NaiveTime,
    pub hostname: &'a str,
    pub process: &'a str,
    pub service: Option<&'a str>,
    pub pid: u32,
}

impl RawHeader<'_> {
    pub fn normalize(
        &self,
        year: i32
    ) -> Result<Header, ClassifyError> {
        let date = normalize::calendar_date(year, self.month, self.day)
            .ok_or_else(|| {
                ClassifyError::coercion(
                    "date",
                    format!("{year}-{:02}-{:02}", self.month, self.day),
                )
            })?;

        Ok(Header {
            date,
            time: self.time,
            hostname: self.hostname.to_string(),
            process: self.process.to_string(),
            service: self.service.map(ToOwned::to_owned),
            pid: self.pid,
        })
    }
}

/// Skips leading blanks, then runs `parser`.
pub(crate) fn token<'a, O, F>(
    parser: F
) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: Parser<&'a str, O, GrammarError<'a>>,
{
    preceded(space0, parser)
}

/// Literal text after optional blanks.
pub(crate) fn keyword<'a>(
    word: &'static str
) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(space0, tag(word))
}

/// Runs `parser` and converts its output, reporting a coercion failure for
/// `field` when `convert` rejects the captured token.
pub(crate) fn coerce<'a, O, F, G>(
    field: &'static str,
    parser: F,
    convert: G
) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: Parser<&'a str, &'a str, GrammarError<'a>>,
    G: Fn(&'a str) -> Option<O>,
{
    map_res(parser, move |token: &'a str| {
        convert(token).ok_or(InvalidField { field, token })
    })
}

/// Raw value of a `key=value` pair: everything up to a blank, comma or
/// parenthesis. Shape checks happen in the normalizer.
pub(crate) fn value(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| {
        !c.is_whitespace() && c != ',' && c != '(' && c != ')'
    })(input)
}

pub(crate) fn hostname(input: &str) -> PResult<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-')(
        input,
    )
}

pub(crate) fn ipv4(input: &str) -> PResult<'_, Ipv4Addr> {
    coerce("ip", recognize(separated_list1(char('.'), digit1)), normalize::ipv4)(
        input,
    )
}

/// `<local@domain>` with an optional `,` or `:` glued to the closing angle.
pub(crate) fn mail_addr(input: &str) -> PResult<'_, String> {
    let (input, _) = token(char('<'))(input)?;
    let (input, (local, domain)) =
        separated_pair(take_while1(is_local_part_char), char('@'), hostname)(
            input,
        )?;
    let (input, _) = char('>')(input)?;
    let (input, _) = opt(one_of(",:"))(input)?;
    Ok((input, format!("{local}@{domain}")))
}

/// Envelope sender: a mail address, or `<>` for the null sender that
/// bounces and delivery reports carry. The null sender is an empty string.
pub(crate) fn sender_addr(input: &str) -> PResult<'_, String> {
    alt((
        mail_addr,
        map(terminated(keyword("<>"), opt(one_of(",:"))), |_| String::new()),
    ))(input)
}

/// `[client=]host[a.b.c.d][:]`, shared by client and reject lines.
pub(crate) fn client_endpoint(
    input: &str
) -> PResult<'_, (Option<String>, Ipv4Addr)> {
    let (input, _) = opt(keyword("client="))(input)?;
    let (input, name) = token(hostname)(input)?;
    let (input, ip) = delimited(keyword("["), token(ipv4), keyword("]"))(input)?;
    let (input, _) = opt(keyword(":"))(input)?;
    Ok((input, (normalize::optional_hostname(name), ip)))
}

fn month(input: &str) -> PResult<'_, u32> {
    coerce(
        "month",
        verify(take(3usize), |s: &str| {
            let mut chars = s.chars();
            chars.next().is_some_and(|c| c.is_ascii_uppercase())
                && chars.all(|c| c.is_ascii_lowercase())
        }),
        normalize::month_number,
    )(input)
}

fn clock(input: &str) -> PResult<'_, NaiveTime> {
    coerce(
        "time",
        recognize(tuple((digit1, char(':'), digit1, char(':'), digit1))),
        normalize::time_of_day,
    )(input)
}

fn pid(input: &str) -> PResult<'_, u32> {
    delimited(
        keyword("["),
        token(coerce(
            "pid",
            take_while1(|c: char| c != ']' && !c.is_whitespace()),
            normalize::integer::<u32>,
        )),
        keyword("]"),
    )(input)
}

fn is_process_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'
}

fn is_local_part_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || " !#$%&'*+-/=?^_`{|}~\".".contains(c)
}

/// `Mon dd HH:MM:SS host <info> process[/service][pid]:`
///
/// The remainder is returned untouched so the caller can try the queue-id
/// grammars and the reject grammar on it.
pub(crate) fn header(input: &str) -> PResult<'_, RawHeader<'_>> {
    let (input, month) = token(month)(input)?;
    let (input, day) =
        token(coerce("day", digit1, normalize::integer::<u32>))(input)?;
    let (input, time) = token(clock)(input)?;
    let (input, hostname) = token(hostname)(input)?;
    let (input, _) = keyword("<info>")(input)?;
    let (input, process) = token(take_while1(is_process_char))(input)?;
    let (input, service) = opt(preceded(
        char('/'),
        take_while1(|c: char| is_process_char(c) || c == '/'),
    ))(input)?;
    let (input, pid) = pid(input)?;
    let (input, _) = keyword(":")(input)?;

    Ok((
        input,
        RawHeader { month, day, time, hostname, process, service, pid },
    ))
}

/// Hex queue id terminated by a colon, e.g. `8EE541568:`.
pub(crate) fn queue_id(input: &str) -> PResult<'_, &str> {
    terminated(
        token(take_while1(|c: char| c.is_ascii_hexdigit())),
        keyword(":"),
    )(input)
}
