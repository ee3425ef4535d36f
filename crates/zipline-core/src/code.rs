use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::Display;

/// Codes are 4 to 16 characters long.
pub const MIN_LENGTH: usize = 4;
/// Codes are 4 to 16 characters long.
pub const MAX_LENGTH: usize = 16;

/// A validated short code: the opaque public handle for a URL.
///
/// Valid codes are 4-16 characters drawn from the base-62 alphabet
/// `[0-9A-Za-z]`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Code(SmolStr);

impl Code {
    /// Creates a new `Code` after validating the input.
    pub fn new(code: impl Into<String>) -> Result<Self, ServiceError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(SmolStr::new(code)))
    }

    /// Creates a `Code` without validation.
    ///
    /// Use this only for codes produced by trusted internal sources
    /// (the generator and the store both only ever hold valid codes).
    pub fn new_unchecked(code: impl AsRef<str>) -> Self {
        Self(SmolStr::new(code.as_ref()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    fn validate(code: &str) -> Result<(), ServiceError> {
        if code.len() < MIN_LENGTH || code.len() > MAX_LENGTH {
            return Err(ServiceError::InvalidCode(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                code.len()
            )));
        }

        if !crate::base62::is_base62(code) {
            return Err(ServiceError::InvalidCode(format!(
                "must contain only characters from [0-9A-Za-z]: '{code}'"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Code").field(&self.0).finish()
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = SmolStr::deserialize(deserializer)?;
        Code::new(s.as_str()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codes() {
        assert!(Code::new("abcd").is_ok());
        assert!(Code::new("Abc123xyz").is_ok());
        assert!(Code::new("a".repeat(16)).is_ok());
    }

    #[test]
    fn too_short() {
        assert!(Code::new("abc").is_err());
        assert!(Code::new("").is_err());
    }

    #[test]
    fn too_long() {
        assert!(Code::new("a".repeat(17)).is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(Code::new("abc def").is_err());
        assert!(Code::new("abc/def").is_err());
        assert!(Code::new("abc-def").is_err());
        assert!(Code::new("abc_def").is_err());
    }

    #[test]
    fn to_url_joins_with_single_slash() {
        let code = Code::new("abc123").unwrap();
        assert_eq!(code.to_url("https://z.ip"), "https://z.ip/abc123");
        assert_eq!(code.to_url("https://z.ip/"), "https://z.ip/abc123");
    }
}
