//! Second-resolution UTC timestamps with a canonical `YYYY-MM-DDTHH:MM:SSZ` text form.
//! The text form sorts lexicographically in time order, which the open-workflows
//! index relies on.

use crate::ModelError;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};
use std::time::Duration;

pub const ZULU_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZuluDateTime(DateTime<Utc>);

impl ZuluDateTime {
    pub fn now() -> Self {
        ZuluDateTime::from_datetime(Utc::now())
    }

    /// Sub-second precision is dropped.
    pub fn from_datetime(date_time: DateTime<Utc>) -> Self {
        ZuluDateTime(date_time.trunc_subsecs(0))
    }

    pub fn parse(value: &str) -> Result<Self, ModelError> {
        NaiveDateTime::parse_from_str(value, ZULU_DATE_TIME_FORMAT)
            .map(|naive| ZuluDateTime(naive.and_utc()))
            .map_err(|err| ModelError::InvalidDateTime {
                value: value.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Display for ZuluDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(ZULU_DATE_TIME_FORMAT))
    }
}

impl From<DateTime<Utc>> for ZuluDateTime {
    fn from(value: DateTime<Utc>) -> Self {
        ZuluDateTime::from_datetime(value)
    }
}

// Saturates at the representable range instead of panicking.
impl Add<Duration> for ZuluDateTime {
    type Output = ZuluDateTime;

    fn add(self, rhs: Duration) -> Self::Output {
        let delta = chrono::Duration::from_std(rhs).unwrap_or(chrono::Duration::MAX);

        ZuluDateTime::from_datetime(
            self.0
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

impl Sub<Duration> for ZuluDateTime {
    type Output = ZuluDateTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        let delta = chrono::Duration::from_std(rhs).unwrap_or(chrono::Duration::MAX);

        ZuluDateTime::from_datetime(
            self.0
                .checked_sub_signed(delta)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }
}

impl Serialize for ZuluDateTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZuluDateTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value: String = String::deserialize(deserializer)?;

        ZuluDateTime::parse(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_in_canonical_zulu_form() {
        let date_time = Utc.with_ymd_and_hms(2023, 10, 15, 12, 45, 14).unwrap();

        assert_eq!(
            "2023-10-15T12:45:14Z",
            ZuluDateTime::from_datetime(date_time).to_string()
        );
    }

    #[test]
    fn parses_what_it_formats() {
        let parsed = ZuluDateTime::parse("2023-10-16T00:00:01Z").unwrap();

        assert_eq!("2023-10-16T00:00:01Z", parsed.to_string());
    }

    #[test]
    fn drops_sub_second_precision() {
        let date_time = Utc.timestamp_opt(1_697_373_914, 999_000_000).unwrap();

        assert_eq!(
            ZuluDateTime::parse("2023-10-15T12:45:14Z").unwrap(),
            ZuluDateTime::from_datetime(date_time)
        );
    }

    #[test]
    fn rejects_other_formats() {
        assert!(ZuluDateTime::parse("2023-10-15 12:45:14").is_err());
        assert!(ZuluDateTime::parse("2023-10-15T12:45:14.000Z").is_err());
        assert!(ZuluDateTime::parse("").is_err());
    }

    #[test]
    fn adds_and_subtracts_durations() {
        let start = ZuluDateTime::parse("2023-10-15T12:45:14Z").unwrap();

        assert_eq!(
            "2023-10-15T19:45:14Z",
            (start + Duration::from_secs(7 * 3600)).to_string()
        );
        assert_eq!(
            "2023-10-15T11:45:14Z",
            (start - Duration::from_secs(3600)).to_string()
        );
    }

    #[test]
    fn serializes_as_string() {
        let start = ZuluDateTime::parse("2023-10-15T12:45:14Z").unwrap();

        let json = serde_json::to_string(&start).unwrap();

        assert_eq!("\"2023-10-15T12:45:14Z\"", json);
        assert_eq!(start, serde_json::from_str::<ZuluDateTime>(&json).unwrap());
    }
}
