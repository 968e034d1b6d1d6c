use chrono::{DateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::from_value;
use subtle::ConstantTimeEq;

use std::fmt::{Display, Formatter, Result as FormatterResult};

/// Deserializes a field as `None` when it is present but has an unexpected type, instead of
/// failing the whole document.
pub(crate) fn deserialize_option_or_none<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match from_value::<Option<T>>(value) {
        Ok(val) => Ok(val),
        Err(_) => Ok(None),
    }
}

/// Deserializes an optional string, mapping the empty string to `None`.
pub(crate) fn deserialize_non_empty_string<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: From<String>,
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(T::from))
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum Timestamp {
    Seconds(serde_json::Number),
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        match self {
            Timestamp::Seconds(seconds) => Display::fmt(seconds, f),
        }
    }
}

pub(crate) fn timestamp_to_utc(timestamp: &Timestamp) -> Result<DateTime<Utc>, ()> {
    match timestamp {
        Timestamp::Seconds(seconds) => {
            let (secs, nsecs) = if seconds.is_i64() {
                (seconds.as_i64().ok_or(())?, 0u32)
            } else {
                let secs_f64 = seconds.as_f64().ok_or(())?;
                let secs = secs_f64.floor();
                (
                    secs as i64,
                    ((secs_f64 - secs) * 1_000_000_000.).floor() as u32,
                )
            };
            Utc.timestamp_opt(secs, nsecs).single().ok_or(())
        }
    }
}

pub(crate) fn utc_to_seconds(utc: &DateTime<Utc>) -> Timestamp {
    Timestamp::Seconds(utc.timestamp().into())
}

/// Converts a millisecond epoch value, as used throughout the REST API, into a UTC timestamp.
pub(crate) fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub mod serde_utc_seconds {
    use crate::helpers::{timestamp_to_utc, utc_to_seconds, Timestamp};

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds: Timestamp = Deserialize::deserialize(deserializer)?;
        timestamp_to_utc(&seconds).map_err(|_| {
            serde::de::Error::custom(format!(
                "failed to parse `{}` as UTC datetime (in seconds)",
                seconds
            ))
        })
    }

    pub fn serialize<S>(v: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        utc_to_seconds(v).serialize(serializer)
    }
}

/// Compares two strings without short-circuiting on the first differing byte.
pub(crate) fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
