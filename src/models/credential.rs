use crate::error::StoreError;
use std::fmt;

/// A validated password-file key.
///
/// Non-empty, no surrounding whitespace, and free of `=`, line breaks and
/// other control characters so that it always round-trips through a
/// `username=hash` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() {
            return Err(StoreError::invalid_username("username cannot be empty"));
        }
        if raw.trim() != raw {
            return Err(StoreError::invalid_username(
                "leading or trailing whitespace not allowed",
            ));
        }
        if raw.contains('=') {
            return Err(StoreError::invalid_username("'=' not allowed"));
        }
        if raw.chars().any(char::is_control) {
            return Err(StoreError::invalid_username(
                "line breaks and control characters not allowed",
            ));
        }
        if raw.starts_with('#') || raw.starts_with('!') {
            return Err(StoreError::invalid_username(
                "cannot start with a comment marker ('#' or '!')",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One `username=hash` line of a password file.
///
/// The hash is kept as the stored text; it is parsed only when a password is
/// checked against it, so a corrupt value fails that check instead of
/// hiding the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub username: Username,
    pub hashed_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["alice", "bob.smith", "user@example.com", "J Doe", "ünï"] {
            assert_eq!(Username::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn test_rejects_separator_and_newlines() {
        assert!(Username::parse("").is_err());
        assert!(Username::parse("a=b").is_err());
        assert!(Username::parse("a\nb").is_err());
        assert!(Username::parse("a\rb").is_err());
        assert!(Username::parse(" alice").is_err());
        assert!(Username::parse("#alice").is_err());
        assert!(Username::parse("!alice").is_err());
    }

    #[test]
    fn test_error_does_not_echo_input() {
        let err = Username::parse("secret=value").unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }
}
