//! Salted password hashing (PBKDF2-HMAC-SHA256, PHC string format).

use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Derived key length in bytes.
const OUTPUT_BYTES: usize = 32;

/// Lowest accepted work factor.
const MIN_ROUNDS: u32 = 1_000;

/// Fixed work factor applied to every new password hash.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    rounds: u32,
}

impl PasswordPolicy {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(MIN_ROUNDS),
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// The returned PHC string embeds algorithm, rounds and salt, so
    /// [`verify_password`] needs nothing else.
    pub fn hash(&self, password: &str) -> Result<String, pbkdf2::password_hash::Error> {
        let salt_bytes: [u8; SALT_BYTES] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes)?;
        let params = Params {
            rounds: self.rounds,
            output_length: OUTPUT_BYTES,
        };
        let hash =
            Pbkdf2.hash_password_customized(password.as_bytes(), None, None, params, &salt)?;
        Ok(hash.to_string())
    }
}

/// Check `password` against a stored PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}
