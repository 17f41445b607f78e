// /////////////////////////////////////////////////////////////////////////////
// Docflow Processing Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DateTime Serde Module
//!
//! RFC3339-compliant serialization and deserialization for `DateTime<Utc>`
//! fields across the docflow system. Checkpoints persist timestamps as
//! ISO-8601 UTC strings and restore them losslessly, so every serialized
//! datetime field in the domain goes through this module.
//!
//! ## Usage
//!
//! ```rust,ignore
//! #[derive(Serialize, Deserialize)]
//! struct Checkpoint {
//!     #[serde(with = "datetime_serde")]
//!     timestamp: DateTime<Utc>,
//!     #[serde(with = "datetime_serde::optional")]
//!     completed_at: Option<DateTime<Utc>>,
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Serializes a `DateTime<Utc>` to an RFC3339 string
pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

/// Deserializes an RFC3339 string to a `DateTime<Utc>`
///
/// Non-UTC offsets are accepted and normalized to UTC.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// RFC3339 serialization for `Option<DateTime<Utc>>` fields
///
/// `None` serializes to JSON null; absent or null fields deserialize to
/// `None`.
pub mod optional {
    use super::*;

    pub fn serialize<S>(opt_dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match opt_dt {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s: Option<String> = Option::deserialize(deserializer)?;
        match opt_s {
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super")]
        at: DateTime<Utc>,
        #[serde(with = "super::optional")]
        done_at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_round_trip_preserves_instant() {
        let original = Stamped {
            at: Utc::now(),
            done_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&original).unwrap();
        let restored: Stamped = serde_json::from_str(&json).unwrap();
        assert_eq!(original.at, restored.at);
        assert_eq!(original.done_at, restored.done_at);
    }

    #[test]
    fn test_none_round_trips_as_null() {
        let original = Stamped {
            at: Utc::now(),
            done_at: None,
        };
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("null"));
        let restored: Stamped = serde_json::from_str(&json).unwrap();
        assert!(restored.done_at.is_none());
    }

    #[test]
    fn test_offset_normalized_to_utc() {
        let json = r#"{"at":"2025-06-01T12:00:00+02:00","done_at":null}"#;
        let restored: Stamped = serde_json::from_str(json).unwrap();
        assert_eq!(restored.at.to_rfc3339(), "2025-06-01T10:00:00+00:00");
    }
}
