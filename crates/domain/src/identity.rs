//! User identity.
//!
//! Users are keyed by a 12-byte opaque identifier, rendered on the wire and
//! in config files as 24 lowercase hex characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Length of a [`UserId`] in bytes.
pub const USER_ID_LEN: usize = 12;

/// Opaque, immutable user identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId([u8; USER_ID_LEN]);

impl UserId {
    pub const fn from_bytes(bytes: [u8; USER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex rendering (24 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 24-character hex string.
    pub fn parse_hex(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.len() != USER_ID_LEN * 2 {
            return Err(Error::InvalidId(format!(
                "expected {} hex chars, got {}",
                USER_ID_LEN * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; USER_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::InvalidId(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.to_hex())
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_hex(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id: UserId = "507f1f77bcf86cd799439011".parse().unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(id.to_string(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn uppercase_input_normalizes() {
        let id: UserId = "507F1F77BCF86CD799439011".parse().unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!(matches!(
            "507f1f".parse::<UserId>(),
            Err(Error::InvalidId(_))
        ));
        assert!(matches!(
            "zz7f1f77bcf86cd799439011".parse::<UserId>(),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn serializes_as_json_string() {
        let id = UserId::from_bytes([0xab; USER_ID_LEN]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abababababababababababab\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
