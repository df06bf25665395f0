//! Multi-scheme credential hashing and verification.
//!
//! Three schemes coexist, distinguished by the stored hash's leading tag:
//!
//! - current:  Argon2id PHC strings (`$argon2id$...`)
//! - fallback: Argon2i PHC strings (`$argon2i$...`), the pre-migration set
//! - legacy:   `sha256$<salt>:<hex>` where hex = SHA-256(salt || password)
//!
//! Verification dispatches on the tag. A success against anything but the
//! current scheme reports `rehash_needed`, and the caller persists a fresh
//! current-scheme hash in the same transaction as the session it creates.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Newtype for plaintext passwords; Debug is redacted so the value can never
/// reach a log line through a formatting macro.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Newtype for stored, scheme-tagged password hashes.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash schemes in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    Current,
    Fallback,
    Legacy,
}

/// Result of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub ok: bool,
    pub rehash_needed: bool,
}

impl Verification {
    const FAILED: Verification = Verification {
        ok: false,
        rehash_needed: false,
    };
}

/// Identify the scheme of a stored hash. Unknown tags yield None and fail
/// verification closed.
pub fn scheme_of(stored: &str) -> Option<HashScheme> {
    if stored.starts_with("$argon2id$") {
        Some(HashScheme::Current)
    } else if stored.starts_with("$argon2i$") || stored.starts_with("$argon2d$") {
        Some(HashScheme::Fallback)
    } else if stored.starts_with("sha256$") {
        Some(HashScheme::Legacy)
    } else {
        None
    }
}

/// Hash a password with the current scheme (Argon2id, random salt).
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash of any supported scheme.
///
/// Never logs the plaintext or any digest; malformed hashes simply fail.
pub fn verify_password(password: &Password, stored: &PasswordHashString) -> Verification {
    match scheme_of(stored.as_str()) {
        Some(HashScheme::Current) => Verification {
            ok: verify_argon2(password, stored.as_str()),
            rehash_needed: false,
        },
        Some(HashScheme::Fallback) => {
            let ok = verify_argon2(password, stored.as_str());
            Verification {
                ok,
                rehash_needed: ok,
            }
        }
        Some(HashScheme::Legacy) => {
            let ok = verify_legacy(password, stored.as_str());
            Verification {
                ok,
                rehash_needed: ok,
            }
        }
        None => Verification::FAILED,
    }
}

fn verify_argon2(password: &Password, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed)
        .is_ok()
}

fn verify_legacy(password: &Password, stored: &str) -> bool {
    let Some(rest) = stored.strip_prefix("sha256$") else {
        return false;
    };
    let Some((salt, expected_hex)) = rest.split_once(':') else {
        return false;
    };
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };

    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_str().as_bytes());
    let computed = hasher.finalize();

    computed.as_slice().ct_eq(expected.as_slice()).into()
}

/// Produce a legacy-scheme hash. Only data migrations and tests need this;
/// new hashes always use [`hash_password`].
pub fn legacy_sha256_hash(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("sha256${}:{}", salt, hex::encode(hasher.finalize()))
}
