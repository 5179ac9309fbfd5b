use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use super::errors::PasswordError;

const SALT_LENGTH: usize = 128 / 8;
const ITERATIONS: u32 = 10_000;
const KEY_LENGTH: usize = 256 / 8;

/// Password hashing implementation.
///
/// Derives a key with PBKDF2-HMAC-SHA256 and stores `base64(salt || key)`,
/// so the hash is a single opaque column value with the salt embedded.
pub struct PasswordHasher;

impl PasswordHasher {
    /// Create a new password hasher instance.
    pub fn new() -> Self {
        Self
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Arguments
    /// * `password` - Plaintext password to hash
    ///
    /// # Returns
    /// Base64 string of the concatenated salt and derived key
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Ok(Self::derive(password, &salt))
    }

    /// Verify a password against a stored hash.
    ///
    /// Re-derives the key with the salt embedded in the stored value and
    /// compares the full encoded outputs.
    ///
    /// # Arguments
    /// * `password` - Plaintext password to verify
    /// * `hash` - Stored `base64(salt || key)` value
    ///
    /// # Returns
    /// True if the password matches, false otherwise
    ///
    /// # Errors
    /// * `VerificationFailed` - Stored hash is not in the expected format
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let decoded = STANDARD.decode(hash).map_err(|e| {
            PasswordError::VerificationFailed(format!("Invalid password hash: {}", e))
        })?;

        if decoded.len() != SALT_LENGTH + KEY_LENGTH {
            return Err(PasswordError::VerificationFailed(format!(
                "Invalid password hash length: {}",
                decoded.len()
            )));
        }

        let salt = &decoded[..SALT_LENGTH];
        Ok(Self::derive(password, salt) == hash)
    }

    fn derive(password: &str, salt: &[u8]) -> String {
        let mut out = vec![0u8; SALT_LENGTH + KEY_LENGTH];
        out[..SALT_LENGTH].copy_from_slice(salt);
        pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            salt,
            ITERATIONS,
            &mut out[SALT_LENGTH..],
        );
        STANDARD.encode(out)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let password = "my_secure_password1";

        let hash = hasher.hash(password).expect("Failed to hash password");

        assert!(hasher
            .verify(password, &hash)
            .expect("Failed to verify password"));

        assert!(!hasher
            .verify("wrong_password", &hash)
            .expect("Failed to verify password"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let hasher = PasswordHasher::new();

        let first = hasher.hash("same_password1").unwrap();
        let second = hasher.hash("same_password1").unwrap();

        // Fresh salt per hash, so equal passwords produce distinct hashes
        assert_ne!(first, second);
        assert!(hasher.verify("same_password1", &first).unwrap());
        assert!(hasher.verify("same_password1", &second).unwrap());
    }

    #[test]
    fn test_stored_format() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("password1").unwrap();

        let decoded = STANDARD.decode(&hash).expect("hash is not base64");
        assert_eq!(decoded.len(), SALT_LENGTH + KEY_LENGTH);
    }

    #[test]
    fn test_verify_invalid_hash() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("password", "not-base64!!");
        assert!(result.is_err());
    }

    #[test]
    fn test_verify_truncated_hash() {
        let hasher = PasswordHasher::new();
        let result = hasher.verify("password", &STANDARD.encode([0u8; 8]));
        assert!(result.is_err());
    }
}
