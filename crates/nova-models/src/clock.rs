//! Entitlement clock: stored-timestamp normalization and expiry stacking.
//!
//! Ledger documents written over the life of the service hold expiry
//! instants in several shapes: numeric epochs (seconds or milliseconds),
//! ISO-8601 strings, and structured `{seconds, nanoseconds}` pairs with
//! either canonical or underscore-prefixed keys. Everything in this module
//! is pure; readers normalize on every access instead of migrating data.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Numeric epoch magnitude at or above which a value is interpreted as
/// milliseconds rather than seconds.
pub const MILLIS_MAGNITUDE_THRESHOLD: f64 = 1e12;

/// A timestamp as it may appear in a stored document.
///
/// `to_datetime` canonicalizes; values it cannot represent are treated as
/// absent (never active), not as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredInstant {
    /// Epoch number, seconds or milliseconds by magnitude.
    Epoch(f64),
    /// ISO-8601 / RFC 3339 string.
    Iso(String),
    /// Structured pair from SDK serializations.
    Structured {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "nanos", alias = "_nanoseconds")]
        nanoseconds: u32,
    },
}

impl StoredInstant {
    /// Normalize to a canonical UTC instant.
    ///
    /// Returns `None` for unparseable or out-of-range values.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredInstant::Epoch(v) => epoch_to_datetime(*v),
            StoredInstant::Iso(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            StoredInstant::Structured { seconds, nanoseconds } => {
                Utc.timestamp_opt(*seconds, *nanoseconds).single()
            }
        }
    }
}

impl From<DateTime<Utc>> for StoredInstant {
    fn from(dt: DateTime<Utc>) -> Self {
        StoredInstant::Iso(dt.to_rfc3339())
    }
}

/// Interpret a raw epoch number as seconds or milliseconds by magnitude.
fn epoch_to_datetime(v: f64) -> Option<DateTime<Utc>> {
    if !v.is_finite() {
        return None;
    }
    let millis = if v.abs() >= MILLIS_MAGNITUDE_THRESHOLD {
        v
    } else {
        v * 1000.0
    };
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

/// True when `instant` is present and strictly in the future.
///
/// Expiry is a pure function of the stored instant versus the wall clock;
/// an entitlement whose instant has passed is inactive even if no sweep
/// has cleared the field yet.
pub fn is_active(instant: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match instant {
        Some(t) => t > now,
        None => false,
    }
}

/// Stacking extension rule shared by every discrete add-on.
///
/// The base is the existing expiry when it is still in the future,
/// otherwise `now`; the result is `base + days`. Buying the same add-on
/// twice back to back therefore accumulates instead of resetting.
pub fn extend(existing: Option<DateTime<Utc>>, days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = match existing {
        Some(t) if t > now => t,
        _ => now,
    };
    base + Duration::days(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_epoch_seconds() {
        let t = StoredInstant::Epoch(1_700_000_000.0).to_datetime().unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_epoch_millis_by_magnitude() {
        let t = StoredInstant::Epoch(1_700_000_000_000.0).to_datetime().unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_epoch_fractional_seconds() {
        let t = StoredInstant::Epoch(1_700_000_000.5).to_datetime().unwrap();
        assert_eq!(t.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_iso_string() {
        let t = StoredInstant::Iso("2024-06-01T12:00:00Z".to_string())
            .to_datetime()
            .unwrap();
        assert_eq!(t, dt("2024-06-01T12:00:00Z"));
    }

    #[test]
    fn test_iso_string_with_offset() {
        let t = StoredInstant::Iso("2024-06-01T14:00:00+02:00".to_string())
            .to_datetime()
            .unwrap();
        assert_eq!(t, dt("2024-06-01T12:00:00Z"));
    }

    #[test]
    fn test_structured_pair() {
        let t = StoredInstant::Structured { seconds: 1_700_000_000, nanoseconds: 500_000_000 }
            .to_datetime()
            .unwrap();
        assert_eq!(t.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_structured_underscore_keys_deserialize() {
        let raw = r#"{"_seconds": 1700000000, "_nanoseconds": 0}"#;
        let parsed: StoredInstant = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.to_datetime().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_unrepresentable_is_none() {
        assert_eq!(StoredInstant::Iso("not a date".to_string()).to_datetime(), None);
        assert_eq!(StoredInstant::Epoch(f64::NAN).to_datetime(), None);
        assert_eq!(StoredInstant::Epoch(f64::INFINITY).to_datetime(), None);
    }

    #[test]
    fn test_is_active() {
        let now = dt("2024-06-01T00:00:00Z");
        assert!(is_active(Some(dt("2024-06-02T00:00:00Z")), now));
        assert!(!is_active(Some(dt("2024-05-31T00:00:00Z")), now));
        assert!(!is_active(Some(now), now)); // exactly now is expired
        assert!(!is_active(None, now));
    }

    #[test]
    fn test_extend_from_now_when_absent() {
        let now = dt("2024-06-01T00:00:00Z");
        assert_eq!(extend(None, 7, now), dt("2024-06-08T00:00:00Z"));
    }

    #[test]
    fn test_extend_from_now_when_expired() {
        let now = dt("2024-06-01T00:00:00Z");
        let expired = Some(dt("2024-05-01T00:00:00Z"));
        assert_eq!(extend(expired, 7, now), dt("2024-06-08T00:00:00Z"));
    }

    #[test]
    fn test_extend_stacks_on_future_expiry() {
        let now = dt("2024-06-01T00:00:00Z");
        let future = Some(dt("2024-06-11T00:00:00Z"));
        assert_eq!(extend(future, 30, now), dt("2024-07-11T00:00:00Z"));
    }
}
