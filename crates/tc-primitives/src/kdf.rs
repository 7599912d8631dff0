//! Password-based key derivation for the local key safe (C11). Ported
//! from the teacher's `dl_crypto::kdf`: Argon2id for the passphrase ->
//! vault-key step, HKDF-SHA256 for everything symmetric-key-to-symmetric-key.

use argon2::{Argon2, Params, Version};

use crate::error::PrimitiveError;
use crate::secret::UserSecret;

pub const SALT_SIZE: usize = 16;

/// Argon2id parameters for deriving the user secret from a passphrase.
/// Tuned for interactive (client-side) use, not server-side auth.
fn argon2_params() -> Params {
    Params::new(64 * 1024, 3, 1, Some(32)).expect("static Argon2 params are always valid")
}

/// Derive the 32-byte user secret from a passphrase and a 16-byte salt.
/// The salt is not secret and is stored alongside the encrypted safe.
pub fn user_secret_from_passphrase(passphrase: &[u8], salt: &[u8; SALT_SIZE]) -> Result<UserSecret, PrimitiveError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|_| PrimitiveError::KeyDerivation("argon2id hashing failed"))?;
    Ok(UserSecret::from_bytes(output))
}

/// Generate a fresh random salt for a new safe (call once, store with it).
pub fn generate_salt() -> [u8; SALT_SIZE] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_passphrase_and_salt_derive_the_same_secret() {
        let salt = [7u8; SALT_SIZE];
        let a = user_secret_from_passphrase(b"correct horse battery staple", &salt).unwrap();
        let b = user_secret_from_passphrase(b"correct horse battery staple", &salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_salt_derives_a_different_secret() {
        let a = user_secret_from_passphrase(b"same password", &[1u8; SALT_SIZE]).unwrap();
        let b = user_secret_from_passphrase(b"same password", &[2u8; SALT_SIZE]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
