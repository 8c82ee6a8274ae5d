//! Password hashing and opaque token material.
//!
//! Passwords go through Argon2id. Refresh and reset tokens are high-entropy
//! random values, so they are stored as a plain SHA-256 digest used as a
//! lookup key.

use argon2::{
    password_hash::{Error as HashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::{rngs::OsRng, seq::SliceRandom, Rng, RngCore};
use sha2::{Digest, Sha256};

use super::error::AuthError;

const MIN_PASSWORD_LENGTH: usize = 8;
const TEMP_PASSWORD_LENGTH: usize = 12;
const TOKEN_BYTES: usize = 32;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy)]
pub struct HashParams {
    /// KiB
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024,
            iterations: 3,
            parallelism: 4,
            output_len: 32,
        }
    }
}

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> Result<Self, AuthError> {
        Self::with_params(HashParams::default())
    }

    /// Custom cost parameters. Lower costs are only meant for tests.
    pub fn with_params(params: HashParams) -> Result<Self, AuthError> {
        let params = Params::new(
            params.memory_cost,
            params.iterations,
            params.parallelism,
            Some(params.output_len),
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash with a fresh 16-byte salt; the PHC string embeds the parameters.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(hash)
    }

    /// `Ok(false)` on mismatch; errors only when the stored hash is unparseable.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(HashError::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e).into()),
        }
    }

    /// At least 8 characters with an uppercase letter, a lowercase letter and a digit.
    pub fn validate_password(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::PasswordWeak(
                "password must be at least 8 characters".to_string(),
            ));
        }

        let has_upper = password.chars().any(char::is_uppercase);
        let has_lower = password.chars().any(char::is_lowercase);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if !(has_upper && has_lower && has_digit) {
            return Err(AuthError::PasswordWeak(
                "password must contain at least one uppercase letter, one lowercase letter, and one number"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn generate_temporary_password(&self) -> String {
        let mut rng = OsRng;
        let all: Vec<u8> = [UPPER, LOWER, DIGITS].concat();

        let mut chars = Vec::with_capacity(TEMP_PASSWORD_LENGTH);
        chars.push(UPPER[rng.gen_range(0..UPPER.len())]);
        chars.push(LOWER[rng.gen_range(0..LOWER.len())]);
        chars.push(DIGITS[rng.gen_range(0..DIGITS.len())]);
        while chars.len() < TEMP_PASSWORD_LENGTH {
            chars.push(all[rng.gen_range(0..all.len())]);
        }
        chars.shuffle(&mut rng);

        chars.into_iter().map(char::from).collect()
    }

    /// Returns `(plain, digest)`. Only the digest may be persisted.
    pub fn generate_reset_token(&self) -> (String, String) {
        let plain = random_token();
        let digest = token_digest(&plain);
        (plain, digest)
    }

    pub fn hash_refresh_token(&self, plain: &str) -> String {
        token_digest(plain)
    }

    pub fn hash_reset_token(&self, plain: &str) -> String {
        token_digest(plain)
    }
}

/// 32 random bytes, URL-safe base64.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE.encode(bytes)
}

/// SHA-256 of an opaque token, URL-safe base64. Used as the storage lookup key.
pub fn token_digest(plain: &str) -> String {
    URL_SAFE.encode(Sha256::digest(plain.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        PasswordService::with_params(HashParams {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        })
        .unwrap()
    }

    #[test]
    fn test_same_password_hashes_differently_and_both_verify() {
        let svc = service();
        let a = svc.hash("Sup3rSecret").unwrap();
        let b = svc.hash("Sup3rSecret").unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(svc.verify("Sup3rSecret", &a).unwrap());
        assert!(svc.verify("Sup3rSecret", &b).unwrap());
    }

    #[test]
    fn test_wrong_password_is_false_not_error() {
        let svc = service();
        let hash = svc.hash("Sup3rSecret").unwrap();
        assert!(!svc.verify("wrong", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(service().verify("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_default_params_are_encoded_in_hash() {
        let svc = PasswordService::new().unwrap();
        let hash = svc.hash("Sup3rSecret").unwrap();
        assert!(hash.contains("m=65536,t=3,p=4"));
    }

    #[test]
    fn test_validate_password_rules() {
        let svc = service();
        assert!(svc.validate_password("Abcdefg1").is_ok());
        assert!(matches!(
            svc.validate_password("Abc1"),
            Err(AuthError::PasswordWeak(_))
        ));
        assert!(svc.validate_password("abcdefg1").is_err());
        assert!(svc.validate_password("ABCDEFG1").is_err());
        assert!(svc.validate_password("Abcdefgh").is_err());
    }

    #[test]
    fn test_temporary_passwords_always_validate() {
        let svc = service();
        for _ in 0..200 {
            let password = svc.generate_temporary_password();
            assert_eq!(password.len(), 12);
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
            svc.validate_password(&password).unwrap();
        }
    }

    #[test]
    fn test_reset_token_digest_matches_rehash() {
        let svc = service();
        let (plain, digest) = svc.generate_reset_token();

        assert_eq!(URL_SAFE.decode(&plain).unwrap().len(), 32);
        assert_ne!(plain, digest);
        assert_eq!(svc.hash_reset_token(&plain), digest);
        assert_eq!(svc.hash_refresh_token(&plain), digest);
    }

    #[test]
    fn test_random_tokens_are_unique() {
        assert_ne!(random_token(), random_token());
    }
}
