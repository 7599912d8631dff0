//! *Simple* and *Padded simple* resource framing (C10): the whole
//! plaintext sealed in one AEAD call.
//!
//! Wire format: `version(1) || resource_id(16) || nonce(24) ||
//! ciphertext+tag`. The resource id is the MAC itself — the trailing
//! 16 bytes of the Poly1305 tag — so it falls out of the encryption
//! call for free instead of needing a separate derivation.

use tc_primitives::aead;

use crate::error::ResourceError;
use crate::padding::{pad, unpad, PaddingStep};

pub const VERSION_SIMPLE: u8 = 3;
pub const VERSION_PADDED_SIMPLE: u8 = 6;

const RESOURCE_ID_SIZE: usize = 16;
const NONCE_SIZE: usize = aead::NONCE_SIZE;

/// Encrypt `plaintext` as *Simple* (unpadded) or *Padded simple*
/// framing depending on `step`. Returns the full framed ciphertext and
/// the 32-byte resource key used, so the caller can key-publish it.
pub fn encrypt(plaintext: &[u8], step: PaddingStep, resource_key: &[u8; 32]) -> Result<Vec<u8>, ResourceError> {
    let (version, body) = match step {
        PaddingStep::Off => (VERSION_SIMPLE, plaintext.to_vec()),
        _ => (VERSION_PADDED_SIMPLE, pad(plaintext, step)),
    };
    let sealed = aead::encrypt(resource_key, &body, &[version])?;
    // `sealed` is `nonce(24) || ciphertext+tag`; the resource id is the
    // tag's bytes, i.e. the last 16 bytes of `sealed`.
    let resource_id = &sealed[sealed.len() - RESOURCE_ID_SIZE..];

    let mut out = Vec::with_capacity(1 + RESOURCE_ID_SIZE + sealed.len());
    out.push(version);
    out.extend_from_slice(resource_id);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// The 16-byte resource id of a framed ciphertext, without decrypting
/// it — mirrors `getResourceId(data)` in the session surface.
pub fn resource_id(framed: &[u8]) -> Result<&[u8], ResourceError> {
    if framed.len() < 1 + RESOURCE_ID_SIZE {
        return Err(ResourceError::Truncated);
    }
    Ok(&framed[1..1 + RESOURCE_ID_SIZE])
}

pub fn decrypt(framed: &[u8], resource_key: &[u8; 32]) -> Result<Vec<u8>, ResourceError> {
    if framed.is_empty() {
        return Err(ResourceError::Truncated);
    }
    let version = framed[0];
    if version != VERSION_SIMPLE && version != VERSION_PADDED_SIMPLE {
        return Err(ResourceError::UpgradeRequired(version));
    }
    if framed.len() < 1 + RESOURCE_ID_SIZE + NONCE_SIZE {
        return Err(ResourceError::Truncated);
    }
    let sealed = &framed[1 + RESOURCE_ID_SIZE..];
    let body = aead::decrypt(resource_key, sealed, &[version]).map_err(|_| ResourceError::DecryptionFailed)?;
    if version == VERSION_PADDED_SIMPLE {
        Ok(unpad(&body)?.to_vec())
    } else {
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_roundtrips() {
        let key = [9u8; 32];
        let framed = encrypt(b"Rosebud", PaddingStep::Off, &key).unwrap();
        assert_eq!(framed[0], VERSION_SIMPLE);
        assert_eq!(decrypt(&framed, &key).unwrap(), b"Rosebud");
    }

    #[test]
    fn padded_roundtrips_and_hides_exact_length() {
        // 22 and 23 bytes both pad (with terminator) to a 24-byte body.
        let short = &b"my clear data is clear"[..]; // 22 bytes
        let long = &b"my clear data is clear!"[..]; // 23 bytes
        assert_eq!(short.len(), 22);
        assert_eq!(long.len(), 23);

        let key = [9u8; 32];
        let short_framed = encrypt(short, PaddingStep::Auto, &key).unwrap();
        let long_framed = encrypt(long, PaddingStep::Auto, &key).unwrap();
        assert_eq!(short_framed[0], VERSION_PADDED_SIMPLE);
        assert_eq!(short_framed.len(), long_framed.len());
        assert_eq!(decrypt(&short_framed, &key).unwrap(), short);
        assert_eq!(decrypt(&long_framed, &key).unwrap(), long);
    }

    #[test]
    fn decrypt_rejects_wrong_key() {
        let key = [1u8; 32];
        let other = [2u8; 32];
        let framed = encrypt(b"secret", PaddingStep::Off, &key).unwrap();
        assert!(matches!(decrypt(&framed, &other), Err(ResourceError::DecryptionFailed)));
    }

    #[test]
    fn decrypt_rejects_unknown_version() {
        let key = [1u8; 32];
        let mut framed = encrypt(b"secret", PaddingStep::Off, &key).unwrap();
        framed[0] = 99;
        assert!(matches!(decrypt(&framed, &key), Err(ResourceError::UpgradeRequired(99))));
    }

    #[test]
    fn resource_id_is_readable_without_the_key() {
        let key = [1u8; 32];
        let framed = encrypt(b"secret", PaddingStep::Off, &key).unwrap();
        assert_eq!(resource_id(&framed).unwrap().len(), 16);
    }
}
