//! XChaCha20-Poly1305 AEAD — used for resource encryption (C10) and the
//! local key-safe (C11). Ported from the teacher's `dl_crypto::aead`
//! helpers; wire format unchanged: `nonce(24) || ciphertext+tag`.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload};
use chacha20poly1305::XChaCha20Poly1305;
use zeroize::Zeroizing;

use crate::error::PrimitiveError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key`, prepending a random 24-byte nonce.
/// `aad` is authenticated but not encrypted.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| PrimitiveError::AeadEncrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| PrimitiveError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (`nonce || ciphertext+tag`).
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, PrimitiveError> {
    if data.len() < NONCE_SIZE {
        return Err(PrimitiveError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_SIZE);
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);

    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| PrimitiveError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| PrimitiveError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

/// Encrypt with an explicit nonce. Used by the streamed framing (C10),
/// where each chunk's nonce is derived from its sequence number rather
/// than drawn randomly.
pub fn encrypt_with_nonce(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, PrimitiveError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| PrimitiveError::AeadEncrypt)?;
    cipher
        .encrypt(
            chacha20poly1305::XNonce::from_slice(nonce),
            Payload { msg: plaintext, aad },
        )
        .map_err(|_| PrimitiveError::AeadEncrypt)
}

pub fn decrypt_with_nonce(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, PrimitiveError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| PrimitiveError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(
            chacha20poly1305::XNonce::from_slice(nonce),
            Payload { msg: ciphertext, aad },
        )
        .map_err(|_| PrimitiveError::AeadDecrypt)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [1u8; KEY_SIZE];
        let ct = encrypt(&key, b"plaintext", b"aad").unwrap();
        let pt = decrypt(&key, &ct, b"aad").unwrap();
        assert_eq!(&pt[..], b"plaintext");
    }

    #[test]
    fn decrypt_rejects_wrong_aad() {
        let key = [1u8; KEY_SIZE];
        let ct = encrypt(&key, b"plaintext", b"aad-a").unwrap();
        assert!(decrypt(&key, &ct, b"aad-b").is_err());
    }

    #[test]
    fn decrypt_rejects_truncated_input() {
        let key = [1u8; KEY_SIZE];
        assert!(decrypt(&key, &[0u8; 4], b"").is_err());
    }
}
