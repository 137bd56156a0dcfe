use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::{Uuid, Variant};

use crate::ValidationError;

const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];
const UUID_TEXT_LEN: usize = 36;

/// Opaque caller identity carried in the `X-User-Id` header.
///
/// Only the canonical hyphenated v4 shape is accepted
/// (`xxxxxxxx-xxxx-4xxx-[89ab]xxx-xxxxxxxxxxxx`, case-insensitive). The
/// stored form is lowercase, so one identity spelled in either case owns
/// the same records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidUserId {
            value: input.to_owned(),
        };

        if input.len() != UUID_TEXT_LEN {
            return Err(invalid());
        }

        for (index, byte) in input.bytes().enumerate() {
            let valid = if HYPHEN_POSITIONS.contains(&index) {
                byte == b'-'
            } else {
                byte.is_ascii_hexdigit()
            };
            if !valid {
                return Err(invalid());
            }
        }

        let uuid = Uuid::parse_str(input).map_err(|_| invalid())?;
        if uuid.get_version_num() != 4 || uuid.get_variant() != Variant::RFC4122 {
            return Err(invalid());
        }

        Ok(Self(input.to_ascii_lowercase()))
    }

    /// Parses an optional header value, distinguishing "missing" from "malformed".
    pub fn from_header(value: Option<&str>) -> Result<Self, ValidationError> {
        match value {
            None => Err(ValidationError::MissingUserId),
            Some(value) if value.trim().is_empty() => Err(ValidationError::MissingUserId),
            Some(value) => Self::parse(value),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_v4_in_either_case() {
        assert!(UserId::parse("3f2b8c1e-9d4a-4b7e-8f01-2c3d4e5f6a7b").is_ok());
        assert!(UserId::parse("3F2B8C1E-9D4A-4B7E-AF01-2C3D4E5F6A7B").is_ok());
    }

    #[test]
    fn when_id_is_uppercase_then_it_equals_the_lowercase_id() {
        // Given
        let upper = UserId::parse("3F2B8C1E-9D4A-4B7E-AF01-2C3D4E5F6A7B").expect("upper");

        // When
        let lower = UserId::parse("3f2b8c1e-9d4a-4b7e-af01-2c3d4e5f6a7b").expect("lower");

        // Then
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "3f2b8c1e-9d4a-4b7e-af01-2c3d4e5f6a7b");
    }

    #[test]
    fn rejects_other_versions_and_variants() {
        // version nibble 1
        assert!(UserId::parse("3f2b8c1e-9d4a-1b7e-8f01-2c3d4e5f6a7b").is_err());
        // variant nibble c
        assert!(UserId::parse("3f2b8c1e-9d4a-4b7e-cf01-2c3d4e5f6a7b").is_err());
    }

    #[test]
    fn rejects_non_hyphenated_forms() {
        assert!(UserId::parse("3f2b8c1e9d4a4b7e8f012c3d4e5f6a7b").is_err());
        assert!(UserId::parse("{3f2b8c1e-9d4a-4b7e-8f01-2c3d4e5f6a7b}").is_err());
        assert!(UserId::parse("3f2b8c1e-9d4a-4b7e-8f01-2c3d4e5f6a7g").is_err());
    }

    #[test]
    fn missing_header_is_distinct_from_malformed() {
        assert_eq!(UserId::from_header(None), Err(ValidationError::MissingUserId));
        assert!(matches!(
            UserId::from_header(Some("nope")),
            Err(ValidationError::InvalidUserId { .. })
        ));
    }
}
