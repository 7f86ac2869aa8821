use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

lazy_static! {
    // Canonical form only: lowercase, hyphenated
    static ref CANONICAL_ID: Regex =
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap();
}

/// Opaque identifier for comparison tables and evaluation rows.
///
/// Backed by a UUIDv7, so ids allocated later sort after earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(Uuid);

impl Id {
    pub fn allocate() -> Self {
        Id(Uuid::now_v7())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if !CANONICAL_ID.is_match(raw) {
            return Err(Error::invalid(format!("malformed id: {:?}", raw)));
        }
        Uuid::parse_str(raw)
            .map(Id)
            .map_err(|e| Error::invalid(format!("malformed id {:?}: {}", raw, e)))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Id::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn allocated_ids_round_trip_through_their_string_form() {
        let id = Id::allocate();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(Id::parse(&text).unwrap(), id);
    }

    #[test]
    fn allocated_ids_are_unique_and_increasing() {
        let ids: Vec<Id> = (0..64).map(|_| Id::allocate()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn non_canonical_forms_are_rejected() {
        for raw in [
            "",
            "not-an-id",
            "64b5f2a0c0ffee0000000000",
            "0190F1C2-7A3B-7C4D-8E5F-0A1B2C3D4E5F",
            "{0190f1c2-7a3b-7c4d-8e5f-0a1b2c3d4e5f}",
            "0190f1c27a3b7c4d8e5f0a1b2c3d4e5f",
        ] {
            let err = Id::parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "accepted {:?}", raw);
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = Id::parse("0190f1c2-7a3b-7c4d-8e5f-0a1b2c3d4e5f").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0190f1c2-7a3b-7c4d-8e5f-0a1b2c3d4e5f\"");
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
