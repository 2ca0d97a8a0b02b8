//! Booking references.
//!
//! A reference is the handle guests use to look a booking up: `ROM-` followed by
//! eight characters from `A-Z0-9`, e.g. `ROM-7QK2M9ZD`. Lookups are
//! case-insensitive, so [`BookingReference::parse`] normalizes to upper case.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix shared by every reference.
pub const PREFIX: &str = "ROM-";

/// Number of random characters after the prefix.
pub const SUFFIX_LEN: usize = 8;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Error returned for a malformed reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid booking reference: {0}")]
pub struct InvalidReference(pub String);

/// A validated, upper-case booking reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingReference(String);

impl BookingReference {
    /// Draw a fresh random reference.
    ///
    /// Uniqueness is not guaranteed here; callers retry on collision.
    #[must_use]
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut out = String::with_capacity(PREFIX.len() + SUFFIX_LEN);
        out.push_str(PREFIX);
        for _ in 0..SUFFIX_LEN {
            let idx = rng.gen_range(0..CHARSET.len());
            out.push(char::from(CHARSET[idx]));
        }
        Self(out)
    }

    /// Parse user input, trimming whitespace and upper-casing.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReference`] unless the normalized input is `ROM-` plus
    /// exactly eight `A-Z0-9` characters.
    pub fn parse(input: &str) -> Result<Self, InvalidReference> {
        let normalized = input.trim().to_ascii_uppercase();
        let valid = normalized
            .strip_prefix(PREFIX)
            .is_some_and(|suffix| {
                suffix.len() == SUFFIX_LEN && suffix.bytes().all(|b| CHARSET.contains(&b))
            });

        if valid {
            Ok(Self(normalized))
        } else {
            Err(InvalidReference(input.to_string()))
        }
    }

    /// The reference text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BookingReference {
    type Error = InvalidReference;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BookingReference> for String {
    fn from(value: BookingReference) -> Self {
        value.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: test fails on malformed fixtures
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generated_reference_has_expected_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let reference = BookingReference::generate(&mut rng);

        assert!(reference.as_str().starts_with(PREFIX));
        assert_eq!(reference.as_str().len(), PREFIX.len() + SUFFIX_LEN);
        assert_eq!(BookingReference::parse(reference.as_str()).unwrap(), reference);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let reference = BookingReference::parse("  rom-ab12cd34 ").unwrap();
        assert_eq!(reference.as_str(), "ROM-AB12CD34");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(BookingReference::parse("ROM-ABC").is_err());
        assert!(BookingReference::parse("BK-AB12CD34").is_err());
        assert!(BookingReference::parse("ROM-AB12CD3!").is_err());
        assert!(BookingReference::parse("").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<BookingReference, _> = serde_json::from_str("\"rom-zzzz0000\"");
        assert_eq!(ok.unwrap().as_str(), "ROM-ZZZZ0000");

        let bad: Result<BookingReference, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_generate_always_parses(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let reference = BookingReference::generate(&mut rng);
            prop_assert_eq!(BookingReference::parse(reference.as_str()), Ok(reference.clone()));
        }
    }
}
