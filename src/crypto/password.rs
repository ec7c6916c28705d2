//! Salted PBKDF2 password credentials.
//!
//! New credentials are always written as `hex(salt):hex(derived_key)`.
//! Bare SHA-256 hex digests from older accounts are still accepted on
//! verification but are never produced.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The number of PBKDF2 iterations.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// The salt size in bytes.
pub const SALT_SIZE: usize = 16;
/// The derived key size in bytes.
pub const KEY_SIZE: usize = 32;

/// A stored credential, classified once when parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential<'a> {
    /// Unsalted SHA-256 hex digest.
    Legacy { digest_hex: &'a str },
    /// PBKDF2-HMAC-SHA256 derived key with its salt.
    Salted { salt: Vec<u8>, key_hex: &'a str },
}

impl<'a> Credential<'a> {
    /// Parses a stored credential string.
    ///
    /// Returns `None` when the salted form is malformed: wrong segment
    /// count, empty segments, or a salt that is not valid hex.
    pub fn parse(stored: &'a str) -> Option<Self> {
        if !stored.contains(':') {
            return Some(Credential::Legacy { digest_hex: stored });
        }

        let mut parts = stored.split(':');
        let (salt_hex, key_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(salt), Some(key), None) => (salt, key),
            _ => return None,
        };

        if salt_hex.is_empty() || key_hex.is_empty() {
            return None;
        }

        let salt = hex::decode(salt_hex).ok()?;
        Some(Credential::Salted { salt, key_hex })
    }

    /// Whether a successful verification should be followed by a re-hash.
    pub fn needs_rehash(&self) -> bool {
        matches!(self, Credential::Legacy { .. })
    }

    /// Checks `password` against this credential in constant time.
    pub fn matches(&self, password: &str) -> bool {
        match self {
            Credential::Legacy { digest_hex } => {
                let candidate = hex::encode(Sha256::digest(password.as_bytes()));
                constant_time_str_eq(&candidate, digest_hex)
            }
            Credential::Salted { salt, key_hex } => {
                let key = derive_key(password, salt);
                let candidate = hex::encode(key.as_slice());
                constant_time_str_eq(&candidate, key_hex)
            }
        }
    }
}

/// Compares two strings without leaking where they first differ.
///
/// Unequal lengths return `false` immediately; the length of a hex digest
/// is not secret.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Byte-slice form of [`constant_time_str_eq`].
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// Hashes a password into the salted credential format.
///
/// # Arguments
///
/// * `password` - The password to hash.
///
/// # Returns
///
/// A `Result` containing `hex(salt):hex(derived_key)`.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| AppError::Internal(format!("Failed to generate salt: {}", e)))?;

    let key = derive_key(password, &salt);

    tracing::debug!("Password hashed with PBKDF2-SHA256");
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(key.as_slice())))
}

/// Verifies a password against a stored credential.
///
/// Malformed credentials verify as `false`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    Credential::parse(stored)
        .map(|credential| credential.matches(password))
        .unwrap_or(false)
}

/// Result of checking a login attempt against a stored credential.
#[derive(Debug, PartialEq, Eq)]
pub enum LoginCheck {
    /// The password does not match, or the credential is malformed.
    Rejected,
    /// The password matches a salted credential.
    Accepted,
    /// The password matches a legacy digest; store the replacement.
    Upgrade(String),
}

/// Verifies a login password and produces a salted replacement for
/// legacy digests.
pub fn check_login(password: &str, stored: &str) -> Result<LoginCheck> {
    let Some(credential) = Credential::parse(stored) else {
        return Ok(LoginCheck::Rejected);
    };

    if !credential.matches(password) {
        return Ok(LoginCheck::Rejected);
    }

    if credential.needs_rehash() {
        return Ok(LoginCheck::Upgrade(hash_password(password)?));
    }

    Ok(LoginCheck::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_accepts_same_password() {
        let stored = hash_password("rahasia-guru-123").unwrap();
        assert!(verify_password("rahasia-guru-123", &stored));
    }

    #[test]
    fn different_password_is_rejected() {
        let stored = hash_password("password-one").unwrap();
        assert!(!verify_password("password-two", &stored));
    }

    #[test]
    fn hashing_twice_uses_fresh_salts() {
        let first = hash_password("same").unwrap();
        let second = hash_password("same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn salted_format_has_expected_shape() {
        let stored = hash_password("shape").unwrap();
        let (salt, key) = stored.split_once(':').unwrap();
        assert_eq!(salt.len(), SALT_SIZE * 2);
        assert_eq!(key.len(), KEY_SIZE * 2);
        assert!(stored.chars().all(|c| c == ':' || matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn legacy_sha256_digest_verifies() {
        let legacy = hex::encode(Sha256::digest(b"admin123"));
        assert!(verify_password("admin123", &legacy));
        assert!(!verify_password("admin124", &legacy));
        assert!(Credential::parse(&legacy).unwrap().needs_rehash());
    }

    #[test]
    fn malformed_credentials_verify_false() {
        assert!(!verify_password("x", "zz:abcd"));
        assert!(!verify_password("x", "00:11:22"));
        assert!(!verify_password("x", ":"));
        assert!(!verify_password("x", "abcd:"));
        assert!(!verify_password("x", ""));
    }

    #[test]
    fn salted_credential_does_not_need_rehash() {
        let stored = hash_password("fresh").unwrap();
        assert!(!Credential::parse(&stored).unwrap().needs_rehash());
    }

    #[test]
    fn legacy_login_is_upgraded_to_salted_form() {
        let legacy = hex::encode(Sha256::digest(b"admin123"));

        let LoginCheck::Upgrade(upgraded) = check_login("admin123", &legacy).unwrap() else {
            panic!("legacy digest should be upgraded");
        };
        assert!(upgraded.contains(':'));
        assert!(!Credential::parse(&upgraded).unwrap().needs_rehash());

        // The next login runs against the replacement.
        assert_eq!(check_login("admin123", &upgraded).unwrap(), LoginCheck::Accepted);
        assert_eq!(check_login("admin124", &upgraded).unwrap(), LoginCheck::Rejected);
    }

    #[test]
    fn failed_legacy_login_is_not_upgraded() {
        let legacy = hex::encode(Sha256::digest(b"admin123"));
        assert_eq!(check_login("wrong", &legacy).unwrap(), LoginCheck::Rejected);
        assert_eq!(check_login("admin123", "zz:abcd").unwrap(), LoginCheck::Rejected);
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_str_eq("abc", "abc"));
        assert!(!constant_time_str_eq("abc", "abd"));
        assert!(!constant_time_str_eq("abc", "abcd"));
        assert!(constant_time_eq(b"caf\xc3\xa9", "café".as_bytes()));
    }
}
