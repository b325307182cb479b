//! Strongly-typed identifiers for domain entities
//!
//! Generated identifiers are newtype wrappers around UUIDs. Clients and units
//! are addressed by the codes their administrators assign ("ACME-HOA",
//! "101-B"), so those are validated string newtypes instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

macro_rules! define_code {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a code, rejecting blank values and embedded separators
            pub fn new(code: impl Into<String>) -> Result<Self, CoreError> {
                let code = code.into().trim().to_string();
                if code.is_empty() {
                    return Err(CoreError::validation(concat!($label, " must not be empty")));
                }
                if code.contains('/') || code.contains(':') {
                    return Err(CoreError::validation(format!(
                        "{} '{}' must not contain '/' or ':'",
                        $label, code
                    )));
                }
                Ok(Self(code))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(code: $name) -> String {
                code.0
            }
        }
    };
}

// Property-management identifiers
define_code!(ClientId, "client id");
define_code!(UnitId, "unit id");

// Payment identifiers
define_id!(TransactionId, "TXN");
define_id!(CreditLedgerEntryId, "CRL");

/// A billing unit scoped to the client (association) that owns it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitRef {
    pub client_id: ClientId,
    pub unit_id: UnitId,
}

impl UnitRef {
    pub fn new(client_id: ClientId, unit_id: UnitId) -> Self {
        Self { client_id, unit_id }
    }

    /// Parses both parts from raw path segments
    pub fn parse(client_id: &str, unit_id: &str) -> Result<Self, CoreError> {
        Ok(Self {
            client_id: client_id.parse()?,
            unit_id: unit_id.parse()?,
        })
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_display() {
        let id = TransactionId::new();
        assert!(id.to_string().starts_with("TXN-"));
    }

    #[test]
    fn test_id_parsing() {
        let original = TransactionId::new_v7();
        let parsed: TransactionId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_unit_code_is_trimmed() {
        let unit = UnitId::new("  101-B ").unwrap();
        assert_eq!(unit.as_str(), "101-B");
    }

    #[test]
    fn test_blank_code_rejected() {
        assert!(ClientId::new("   ").is_err());
    }

    #[test]
    fn test_code_with_separator_rejected() {
        assert!(UnitId::new("dues:101").is_err());
    }

    #[test]
    fn test_unit_ref_display() {
        let unit = UnitRef::parse("ACME", "101").unwrap();
        assert_eq!(unit.to_string(), "ACME/101");
    }

    #[test]
    fn test_code_deserialization_validates() {
        let bad: Result<UnitId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
        let good: UnitId = serde_json::from_str("\"A-1\"").unwrap();
        assert_eq!(good.as_str(), "A-1");
    }
}
