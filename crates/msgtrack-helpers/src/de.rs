use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

/// Values that switch a periodic job off.
const DISABLED: [&str; 3] = ["off", "never", "disabled"];

/// Accepts plain seconds or a humantime string (`30s`, `5m`, `1h 30m`).
/// Missing, empty, zero or `off` values disable the setting.
pub fn deserialize_optional_duration<'de, D>(
    deserializer: D
) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    let duration = match Option::<RawDuration>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawDuration::Seconds(secs)) => Duration::from_secs(secs),
        Some(RawDuration::Text(value)) => {
            let value = value.trim();
            if value.is_empty()
                || DISABLED.iter().any(|word| value.eq_ignore_ascii_case(word))
            {
                return Ok(None);
            }

            humantime::parse_duration(value).map_err(D::Error::custom)?
        }
    };

    Ok(Some(duration).filter(|duration| !duration.is_zero()))
}
