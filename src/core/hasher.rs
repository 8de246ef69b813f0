//! bcrypt hashing and verification of passwords.
//!
//! Stored hashes use the modular-crypt layout
//! `$<version>$<cost>$<22-char salt><31-char digest>`. A stored value is
//! parsed into [`HashedPassword`] once, and verification recomputes the
//! digest from the parsed version, cost and salt.

use crate::constants;
use crate::error::StoreError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::Engine;
use bcrypt::Version;
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::str::FromStr;

const BCRYPT_B64: GeneralPurpose = GeneralPurpose::new(&alphabet::BCRYPT, NO_PAD);

const SALT_LEN: usize = 16;
const ENCODED_SALT_LEN: usize = 22;
const ENCODED_DIGEST_LEN: usize = 31;

/// bcrypt revision marker found between the first two `$`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashVersion {
    TwoA,
    TwoB,
    TwoX,
    TwoY,
}

impl HashVersion {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "2a" => Some(Self::TwoA),
            "2b" => Some(Self::TwoB),
            "2x" => Some(Self::TwoX),
            "2y" => Some(Self::TwoY),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::TwoA => "2a",
            Self::TwoB => "2b",
            Self::TwoX => "2x",
            Self::TwoY => "2y",
        }
    }

    fn to_bcrypt(self) -> Version {
        match self {
            Self::TwoA => Version::TwoA,
            Self::TwoB => Version::TwoB,
            Self::TwoX => Version::TwoX,
            Self::TwoY => Version::TwoY,
        }
    }
}

/// Why a stored hash could not be parsed. Never shown with the hash itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedHash {
    #[error("expected $<version>$<cost>$<salt+digest>")]
    Layout,
    #[error("unsupported bcrypt version")]
    Version,
    #[error("cost is not a number in {}..={}", constants::MIN_HASH_COST, constants::MAX_HASH_COST)]
    Cost,
    #[error("salt and digest must be {} characters", ENCODED_SALT_LEN + ENCODED_DIGEST_LEN)]
    Length,
    #[error("salt is not valid bcrypt base64")]
    Salt,
    #[error("digest is not valid bcrypt base64")]
    Digest,
}

/// A parsed bcrypt hash.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    version: HashVersion,
    cost: u32,
    salt: [u8; SALT_LEN],
    digest: String,
}

impl HashedPassword {
    pub fn version(&self) -> HashVersion {
        self.version
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Recompute the digest for `password` with this hash's parameters and
    /// compare it in constant time.
    pub fn matches(&self, password: &str) -> bool {
        let recomputed = match bcrypt::hash_with_salt(password, self.cost, self.salt) {
            Ok(parts) => parts.format_for_version(self.version.to_bcrypt()),
            Err(_) => return false,
        };
        match recomputed.parse::<HashedPassword>() {
            Ok(candidate) => {
                constant_time_eq(candidate.digest.as_bytes(), self.digest.as_bytes())
            }
            Err(_) => false,
        }
    }
}

// Keeps salt and digest out of logs and panic messages.
impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedPassword")
            .field("version", &self.version)
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}${:02}${}{}",
            self.version.as_str(),
            self.cost,
            BCRYPT_B64.encode(self.salt),
            self.digest
        )
    }
}

impl FromStr for HashedPassword {
    type Err = MalformedHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('$');
        if parts.next() != Some("") {
            return Err(MalformedHash::Layout);
        }
        let (version, cost, rest) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(c), Some(r), None) => (v, c, r),
            _ => return Err(MalformedHash::Layout),
        };

        let version = HashVersion::parse(version).ok_or(MalformedHash::Version)?;

        if cost.len() != 2 || !cost.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MalformedHash::Cost);
        }
        let cost: u32 = cost.parse().map_err(|_| MalformedHash::Cost)?;
        if !(constants::MIN_HASH_COST..=constants::MAX_HASH_COST).contains(&cost) {
            return Err(MalformedHash::Cost);
        }

        if !rest.is_ascii() || rest.len() != ENCODED_SALT_LEN + ENCODED_DIGEST_LEN {
            return Err(MalformedHash::Length);
        }
        let (salt, digest) = rest.split_at(ENCODED_SALT_LEN);

        let salt: [u8; SALT_LEN] = BCRYPT_B64
            .decode(salt)
            .map_err(|_| MalformedHash::Salt)?
            .try_into()
            .map_err(|_| MalformedHash::Salt)?;

        if !digest.bytes().all(is_bcrypt_b64) {
            return Err(MalformedHash::Digest);
        }

        Ok(Self {
            version,
            cost,
            salt,
            digest: digest.to_string(),
        })
    }
}

/// Hash `password` with a fresh random salt at [`constants::HASH_COST`].
pub fn hash_password(password: &str) -> Result<HashedPassword, StoreError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let encoded = bcrypt::hash_with_salt(password, constants::HASH_COST, salt)
        .map_err(|e| StoreError::Hashing(e.to_string()))?
        .format_for_version(Version::TwoB);
    encoded
        .parse()
        .map_err(|e: MalformedHash| StoreError::Hashing(e.to_string()))
}

/// Check `password` against a stored hash string.
///
/// Fails closed: a malformed stored value yields `false`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.parse::<HashedPassword>() {
        Ok(hash) => hash.matches(password),
        Err(err) => {
            tracing::warn!(reason = %err, "stored password hash is malformed");
            false
        }
    }
}

fn is_bcrypt_b64(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'/'
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("secret123").unwrap();
        let stored = hash.to_string();
        assert!(verify_password("secret123", &stored));
        assert!(!verify_password("secret124", &stored));
    }

    #[test]
    fn test_hash_uses_fixed_cost_and_2b() {
        let hash = hash_password("pw").unwrap();
        assert_eq!(hash.cost(), constants::HASH_COST);
        assert_eq!(hash.version(), HashVersion::TwoB);
        assert!(hash.to_string().starts_with("$2b$10$"));
    }

    #[test]
    fn test_salt_differs_between_calls() {
        let a = hash_password("same").unwrap().to_string();
        let b = hash_password("same").unwrap().to_string();
        assert_ne!(a, b);
        assert_ne!(a, "same");
    }

    #[test]
    fn test_parse_display_preserves_text() {
        let stored = hash_password("x").unwrap().to_string();
        let parsed: HashedPassword = stored.parse().unwrap();
        assert_eq!(parsed.to_string(), stored);
    }

    #[test]
    fn test_verifies_hash_from_bcrypt_crate() {
        let stored = bcrypt::hash("hunter2", 4).unwrap();
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn test_verifies_2a_hash() {
        let stored = bcrypt::hash_with_salt("password", 4, [7u8; 16])
            .unwrap()
            .format_for_version(Version::TwoA);
        let parsed: HashedPassword = stored.parse().unwrap();
        assert_eq!(parsed.version(), HashVersion::TwoA);
        assert_eq!(parsed.cost(), 4);
        assert!(verify_password("password", &stored));
        assert!(!verify_password("Password", &stored));
    }

    #[test]
    fn test_malformed_hashes_fail_closed() {
        for stored in [
            "",
            "plaintext",
            "$2b$10$short",
            "$3z$10$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvwxyz12345",
            "$2b$xx$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvwxyz12345",
            "$2b$99$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvwxyz12345",
            "$2b$10$abcdefghijklmnopqrstuv!bcdefghijklmnopqrstuvwxyz1234",
        ] {
            assert!(!verify_password("anything", stored), "accepted {:?}", stored);
        }
    }

    #[test]
    fn test_parse_errors_are_specific() {
        assert_eq!("nope".parse::<HashedPassword>().unwrap_err(), MalformedHash::Layout);
        assert_eq!(
            "$9$10$x".parse::<HashedPassword>().unwrap_err(),
            MalformedHash::Version
        );
        assert_eq!(
            "$2b$3$x".parse::<HashedPassword>().unwrap_err(),
            MalformedHash::Cost
        );
        assert_eq!(
            "$2b$10$x".parse::<HashedPassword>().unwrap_err(),
            MalformedHash::Length
        );
    }

    #[test]
    fn test_debug_hides_salt_and_digest() {
        let hash = hash_password("pw").unwrap();
        let rendered = format!("{:?}", hash);
        assert!(!rendered.contains(&hash.digest));
        assert!(rendered.contains("cost"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
