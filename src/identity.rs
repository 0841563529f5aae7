//! Stable accessory identities.
//!
//! An identity token is derived from a device's unique key with UUID v5, so
//! the same key always yields the same token, across calls and restarts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Namespace for accessory identities. Changing it re-keys every accessory.
const IDENTITY_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

/// Identity of one accessory in the host cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(Uuid);

impl IdentityToken {
    /// Derive the identity for a device key.
    pub fn generate(key: &str) -> Self {
        Self(Uuid::new_v5(&IDENTITY_NAMESPACE, key.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for IdentityToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        let a = IdentityToken::generate("tempe-sensor-id");
        let b = IdentityToken::generate("tempe-sensor-id");
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_keys_distinct_tokens() {
        let a = IdentityToken::generate("tempe-sensor-id");
        let b = IdentityToken::generate("tempe-sensor-id/humidity");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_parses_back() {
        let token = IdentityToken::generate("kitchen");
        let parsed: IdentityToken = token.to_string().parse().unwrap();
        assert_eq!(parsed, token);
        assert_eq!(token.as_uuid().get_version_num(), 5);
    }

    #[test]
    fn test_stable_across_restarts() {
        // Cached accessories are keyed by this value; it must never drift.
        let token = IdentityToken::generate("tempe-sensor-id");
        assert_eq!(token.to_string(), "ccf38f01-79ee-5034-aaf4-e1c577ec3be0");
    }
}
