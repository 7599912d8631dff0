//! *Transparent session* resource framing (C10, version bytes 9/11): a
//! session key is committed into the ciphertext preamble so a whole
//! batch of resources shares one session id for cheap lookup, while
//! each resource's individual key remains independently derivable by
//! its own resource id — decrypt tries the session-id path first and
//! falls back to the per-resource-id path, per spec.
//!
//! Wire format: `version(1) || session_id(16) || resource_id(16) ||
//! <Simple or Streamed body, minus its own version/resource_id
//! prefix>`. The per-resource key is `HKDF-SHA256(session_key,
//! info = resource_id)`.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::error::ResourceError;
use crate::simple;
use crate::stream;

pub const VERSION_TRANSPARENT_SIMPLE: u8 = 9;
pub const VERSION_TRANSPARENT_STREAM: u8 = 11;

const SESSION_ID_SIZE: usize = 16;
const RESOURCE_ID_SIZE: usize = 16;
const PREAMBLE_SIZE: usize = 1 + SESSION_ID_SIZE + RESOURCE_ID_SIZE;

const SESSION_INFO: &[u8] = b"trustchain-resource-session-v1";

/// A session key shared across every resource encrypted in one batch.
/// Never transmitted; only `session_id` (derived from it) travels on
/// the wire.
pub struct SessionKey {
    key: [u8; 32],
    pub session_id: [u8; SESSION_ID_SIZE],
}

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::from_key(key)
    }

    pub fn from_key(key: [u8; 32]) -> Self {
        let digest = tc_primitives::hash::hash_parts(&[&key, SESSION_INFO]);
        let mut session_id = [0u8; SESSION_ID_SIZE];
        session_id.copy_from_slice(&digest[..SESSION_ID_SIZE]);
        Self { key, session_id }
    }

    /// Derive the per-resource key committed to this session for
    /// `resource_id`. Two callers holding the same session key derive
    /// the same resource key for the same resource id.
    pub fn derive_resource_key(&self, resource_id: &[u8; RESOURCE_ID_SIZE]) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(&resource_id[..]), &self.key);
        let mut out = [0u8; 32];
        hk.expand(SESSION_INFO, &mut out).expect("32 bytes is a valid HKDF output length");
        out
    }
}

/// Encrypt `plaintext` as *Transparent simple* (version 9): same
/// framing as `simple::encrypt` underneath, wrapped in a preamble that
/// carries the session id alongside the resource id.
pub fn encrypt_simple(plaintext: &[u8], session: &SessionKey, resource_id: [u8; RESOURCE_ID_SIZE]) -> Result<Vec<u8>, ResourceError> {
    let resource_key = session.derive_resource_key(&resource_id);
    let body = simple::encrypt(plaintext, crate::padding::PaddingStep::Off, &resource_key)?;
    Ok(wrap(VERSION_TRANSPARENT_SIMPLE, &session.session_id, &resource_id, &body))
}

/// Decrypt a *Transparent simple* resource given the session key for
/// its `session_id` (the fast path described in §4.8).
pub fn decrypt_simple_by_session(framed: &[u8], session: &SessionKey) -> Result<Vec<u8>, ResourceError> {
    let (_session_id, resource_id, body) = unwrap(framed, VERSION_TRANSPARENT_SIMPLE)?;
    let resource_key = session.derive_resource_key(&resource_id);
    simple::decrypt(body, &resource_key)
}

/// Decrypt a *Transparent simple* resource given only its own resource
/// key (the fallback path described in §4.8, used when the session key
/// itself was never cached).
pub fn decrypt_simple_by_resource_key(framed: &[u8], resource_key: &[u8; 32]) -> Result<Vec<u8>, ResourceError> {
    let (_session_id, _resource_id, body) = unwrap(framed, VERSION_TRANSPARENT_SIMPLE)?;
    simple::decrypt(body, resource_key)
}

pub fn encrypt_stream(plaintext: &[u8], session: &SessionKey, resource_id: [u8; RESOURCE_ID_SIZE], max_chunk_size: u32) -> Result<Vec<u8>, ResourceError> {
    let resource_key = session.derive_resource_key(&resource_id);
    let body = stream::encrypt_buffer(plaintext, resource_key, stream::VERSION_STREAM_TRANSPARENT, max_chunk_size)?;
    Ok(wrap(VERSION_TRANSPARENT_STREAM, &session.session_id, &resource_id, &body))
}

pub fn decrypt_stream_by_session(framed: &[u8], session: &SessionKey) -> Result<Vec<u8>, ResourceError> {
    let (_session_id, resource_id, body) = unwrap(framed, VERSION_TRANSPARENT_STREAM)?;
    let resource_key = session.derive_resource_key(&resource_id);
    stream::decrypt_buffer(body, resource_key)
}

pub fn decrypt_stream_by_resource_key(framed: &[u8], resource_key: [u8; 32]) -> Result<Vec<u8>, ResourceError> {
    let (_session_id, _resource_id, body) = unwrap(framed, VERSION_TRANSPARENT_STREAM)?;
    stream::decrypt_buffer(body, resource_key)
}

/// The `(session_id, resource_id)` pair of a transparent-session
/// ciphertext, readable without any key.
pub fn ids(framed: &[u8]) -> Result<([u8; SESSION_ID_SIZE], [u8; RESOURCE_ID_SIZE]), ResourceError> {
    if framed.len() < PREAMBLE_SIZE {
        return Err(ResourceError::Truncated);
    }
    let mut session_id = [0u8; SESSION_ID_SIZE];
    session_id.copy_from_slice(&framed[1..1 + SESSION_ID_SIZE]);
    let mut resource_id = [0u8; RESOURCE_ID_SIZE];
    resource_id.copy_from_slice(&framed[1 + SESSION_ID_SIZE..PREAMBLE_SIZE]);
    Ok((session_id, resource_id))
}

fn wrap(version: u8, session_id: &[u8; SESSION_ID_SIZE], resource_id: &[u8; RESOURCE_ID_SIZE], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(PREAMBLE_SIZE + body.len());
    out.push(version);
    out.extend_from_slice(session_id);
    out.extend_from_slice(resource_id);
    out.extend_from_slice(body);
    out
}

fn unwrap(framed: &[u8], expected_version: u8) -> Result<([u8; SESSION_ID_SIZE], [u8; RESOURCE_ID_SIZE], &[u8]), ResourceError> {
    if framed.is_empty() {
        return Err(ResourceError::Truncated);
    }
    let version = framed[0];
    if version != expected_version {
        return Err(ResourceError::UpgradeRequired(version));
    }
    if framed.len() < PREAMBLE_SIZE {
        return Err(ResourceError::Truncated);
    }
    let (session_id, resource_id) = ids(framed)?;
    Ok((session_id, resource_id, &framed[PREAMBLE_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_simple_decrypts_by_session_or_by_key() {
        let session = SessionKey::generate();
        let resource_id = [5u8; RESOURCE_ID_SIZE];
        let framed = encrypt_simple(b"Stronger", &session, resource_id).unwrap();

        assert_eq!(decrypt_simple_by_session(&framed, &session).unwrap(), b"Stronger");

        let resource_key = session.derive_resource_key(&resource_id);
        assert_eq!(decrypt_simple_by_resource_key(&framed, &resource_key).unwrap(), b"Stronger");
    }

    #[test]
    fn transparent_stream_decrypts_by_session_or_by_key() {
        let session = SessionKey::generate();
        let resource_id = [6u8; RESOURCE_ID_SIZE];
        let plaintext = b"a transparent-session streamed payload spanning chunks";
        let framed = encrypt_stream(plaintext, &session, resource_id, 8).unwrap();

        assert_eq!(decrypt_stream_by_session(&framed, &session).unwrap(), plaintext);
        let resource_key = session.derive_resource_key(&resource_id);
        assert_eq!(decrypt_stream_by_resource_key(&framed, resource_key).unwrap(), plaintext);
    }

    #[test]
    fn session_id_is_stable_for_a_given_key() {
        let a = SessionKey::from_key([1u8; 32]);
        let b = SessionKey::from_key([1u8; 32]);
        assert_eq!(a.session_id, b.session_id);
    }

    #[test]
    fn wrong_session_key_fails_to_decrypt() {
        let session = SessionKey::generate();
        let other = SessionKey::generate();
        let resource_id = [7u8; RESOURCE_ID_SIZE];
        let framed = encrypt_simple(b"secret", &session, resource_id).unwrap();
        assert!(decrypt_simple_by_session(&framed, &other).is_err());
    }
}
