// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp formatting: ISO-8601 serde helpers and trail-name stamps.

use chrono::{DateTime, Utc};

/// Serde module for `DateTime<Utc>` as ISO-8601 with millisecond precision.
///
/// Reads accept any RFC 3339 timestamp; writes always emit
/// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub mod iso_ms {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Serde module for `Option<DateTime<Utc>>` in the [`iso_ms`] format.
pub mod iso_ms_opt {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_some(&t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Format the elapsed time since `start` as a trail stamp: zero-padded
/// seconds, a dot, and milliseconds (`000012.345`).
///
/// Lexicographic order of stamps equals chronological order, which keeps
/// a directory listing of trail snapshots in mutation order. Negative
/// elapsed (clock skew) clamps to zero.
pub fn elapsed_stamp(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let ms = (now - start).num_milliseconds().max(0);
    format!("{:06}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
