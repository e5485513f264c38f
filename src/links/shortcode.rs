//! Short code validation and allocation.

use anyhow::Result;
use async_trait::async_trait;
use rand::RngExt;
use thiserror::Error;

use crate::storage::TenantStore;

/// Base62 alphabet for generated and custom codes
pub const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Codes that collide with service routes; compared case-insensitively
pub const RESERVED_CODES: [&str; 7] = [
    "api",
    "admin",
    "dashboard",
    "login",
    "signup",
    "health",
    "metrics",
];

pub const MIN_CUSTOM_LENGTH: usize = 3;
pub const MAX_CUSTOM_LENGTH: usize = 12;
pub const GENERATED_LENGTH: usize = 7;
pub const MAX_GENERATION_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum ShortCodeError {
    #[error("short code must be {MIN_CUSTOM_LENGTH}-{MAX_CUSTOM_LENGTH} characters, got {0}")]
    InvalidLength(usize),
    #[error("short code contains invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("short code '{0}' is reserved")]
    Reserved(String),
    #[error("short code '{0}' is already taken")]
    Conflict(String),
    #[error("failed to generate unique short code")]
    Exhausted,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Answers whether a short code is already used within one tenant.
#[async_trait]
pub trait UniquenessChecker: Send + Sync {
    async fn is_taken(&self, code: &str) -> Result<bool>;
}

#[async_trait]
impl<S: TenantStore + ?Sized> UniquenessChecker for S {
    async fn is_taken(&self, code: &str) -> Result<bool> {
        self.exists_by_short_code(code).await
    }
}

/// Check length, alphabet and reserved words of a caller-chosen code.
pub fn validate_custom_code(code: &str) -> Result<(), ShortCodeError> {
    let len = code.chars().count();
    if !(MIN_CUSTOM_LENGTH..=MAX_CUSTOM_LENGTH).contains(&len) {
        return Err(ShortCodeError::InvalidLength(len));
    }

    if let Some(bad) = code
        .chars()
        .find(|c| !c.is_ascii() || !ALPHABET.contains(&(*c as u8)))
    {
        return Err(ShortCodeError::InvalidCharacter(bad));
    }

    if RESERVED_CODES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(code))
    {
        return Err(ShortCodeError::Reserved(code.to_string()));
    }

    Ok(())
}

/// Uniformly random base62 string of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Pick the short code for a new link.
///
/// A requested code is validated and must be free. Without one, up to
/// [`MAX_GENERATION_ATTEMPTS`] random 7-character codes are tried, then a
/// single 8-character code; if that also collides allocation fails.
pub async fn allocate<C>(requested: Option<&str>, checker: &C) -> Result<String, ShortCodeError>
where
    C: UniquenessChecker + ?Sized,
{
    if let Some(code) = requested.filter(|c| !c.is_empty()) {
        validate_custom_code(code)?;
        if checker.is_taken(code).await? {
            return Err(ShortCodeError::Conflict(code.to_string()));
        }
        return Ok(code.to_string());
    }

    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let code = generate_code(GENERATED_LENGTH);
        if !checker.is_taken(&code).await? {
            return Ok(code);
        }
    }

    let code = generate_code(GENERATED_LENGTH + 1);
    if checker.is_taken(&code).await? {
        return Err(ShortCodeError::Exhausted);
    }
    tracing::debug!(short_code = %code, "fell back to a longer generated short code");

    Ok(code)
}
