use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};

/// Date format used in per-day file names and bucket keys
pub const DAY_FORMAT: &str = "%Y-%m-%d";
/// Hour bucket suffix of tick cache keys
pub const HOUR_BUCKET_FORMAT: &str = "%Y-%m-%d:%H";
/// Minute bucket suffix of sampler buffer keys
pub const MINUTE_BUCKET_FORMAT: &str = "%Y-%m-%d:%H:%M";

/// Truncates a timestamp to the start of its minute
#[inline]
pub fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::minutes(1)).unwrap_or(ts)
}

/// Rounds a timestamp up to the next minute boundary; exact boundaries map to themselves
#[inline]
pub fn ceil_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let floor = floor_minute(ts);
    if floor == ts {
        floor
    } else {
        floor + Duration::minutes(1)
    }
}

/// Formats a timestamp as RFC 3339 UTC with millisecond precision (`2024-01-01T10:00:59.500Z`)
#[inline]
pub fn format_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses any RFC 3339 timestamp and normalises it to UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw.trim()).map(|ts| ts.with_timezone(&Utc))
}

pub fn day_string(ts: &DateTime<Utc>) -> String {
    ts.format(DAY_FORMAT).to_string()
}

pub fn hour_bucket(ts: &DateTime<Utc>) -> String {
    ts.format(HOUR_BUCKET_FORMAT).to_string()
}

pub fn minute_bucket(ts: &DateTime<Utc>) -> String {
    ts.format(MINUTE_BUCKET_FORMAT).to_string()
}

/// Serde adapter for millisecond-precision RFC 3339 timestamps
pub mod millis {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_millis(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// Same as [`millis`] for optional fields; `null` maps to `None`
pub mod millis_option {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format_millis(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_timestamp(&raw).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
