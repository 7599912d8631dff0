//! X25519 sealed-box — anonymous public-key encryption.
//!
//! Mirrors libsodium's `crypto_box_seal`: the sender generates a fresh
//! ephemeral X25519 key pair per call, derives a symmetric key from the
//! ephemeral/recipient DH output via HKDF, and XChaCha20-Poly1305-encrypts
//! the payload under it. The wire format is:
//!
//!   ephemeral_public_key (32) || nonce (24) || ciphertext + tag
//!
//! Unlike the teacher's X3DH handshake (which also derives a session key
//! from an X25519 DH output via HKDF, see `dl_crypto::x3dh`), a seal is a
//! one-shot, senderless-identity operation: the recipient cannot tell who
//! sealed the message, only that it was addressed to them.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::PrimitiveError;
use crate::hash;

pub const ENC_PUBLIC_KEY_SIZE: usize = 32;
pub const ENC_PRIVATE_KEY_SIZE: usize = 32;
/// Overhead added by `seal`: ephemeral public key (32) + AEAD tag (16).
/// The nonce is never transmitted — both sides derive it from
/// `hash(ephemeral_public_key || recipient_public_key)`, matching the
/// fixed 48-byte `sealed-*` field sizes in the wire format.
pub const SEAL_OVERHEAD: usize = 32 + 16;

const SEAL_INFO: &[u8] = b"trustchain-seal-v1";

/// 32-byte X25519 public encryption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncPublicKey(pub [u8; ENC_PUBLIC_KEY_SIZE]);

impl EncPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        let arr: [u8; ENC_PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("encryption public key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    fn dalek(&self) -> X25519Public {
        X25519Public::from(self.0)
    }
}

/// X25519 key pair used to unseal resource keys addressed to this identity.
#[derive(ZeroizeOnDrop)]
pub struct EncKeyPair {
    #[zeroize(skip)]
    public: EncPublicKey,
    secret_bytes: [u8; ENC_PRIVATE_KEY_SIZE],
}

impl EncKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self {
            public: EncPublicKey(public.to_bytes()),
            secret_bytes: secret.to_bytes(),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        let arr: [u8; ENC_PRIVATE_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("encryption secret must be 32 bytes"))?;
        let secret = StaticSecret::from(arr);
        let public = X25519Public::from(&secret);
        Ok(Self {
            public: EncPublicKey(public.to_bytes()),
            secret_bytes: arr,
        })
    }

    pub fn public(&self) -> EncPublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; ENC_PRIVATE_KEY_SIZE] {
        &self.secret_bytes
    }

    fn dalek_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret_bytes)
    }

    /// Unseal a payload produced by `seal` against this key pair's public half.
    pub fn unseal(&self, sealed: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(PrimitiveError::Unseal);
        }
        let (eph_pub_bytes, ct) = sealed.split_at(ENC_PUBLIC_KEY_SIZE);

        let eph_pub = X25519Public::from(<[u8; 32]>::try_from(eph_pub_bytes).unwrap());
        let dh = self.dalek_secret().diffie_hellman(&eph_pub);
        let key = derive_seal_key(dh.as_bytes(), eph_pub_bytes, &self.public.0);
        let nonce_bytes = seal_nonce(eph_pub_bytes, &self.public.0);

        let cipher =
            XChaCha20Poly1305::new_from_slice(&key).map_err(|_| PrimitiveError::Unseal)?;
        let nonce = XNonce::from_slice(&nonce_bytes);
        cipher
            .decrypt(nonce, Payload { msg: ct, aad: b"" })
            .map_err(|_| PrimitiveError::Unseal)
    }
}

/// Seal `plaintext` so only the holder of `recipient`'s private key can
/// recover it. Non-deterministic: a fresh ephemeral key pair is drawn on
/// every call, which also determines the (derived, never transmitted) nonce.
pub fn seal(recipient: &EncPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = X25519Public::from(&ephemeral);
    let dh = ephemeral.diffie_hellman(&recipient.dalek());
    let key = derive_seal_key(dh.as_bytes(), eph_pub.as_bytes(), &recipient.0);
    let nonce_bytes = seal_nonce(eph_pub.as_bytes(), &recipient.0);

    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|_| PrimitiveError::Seal)?;
    let nonce = XNonce::from_slice(&nonce_bytes);
    let ct = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: b"",
            },
        )
        .map_err(|_| PrimitiveError::Seal)?;

    let mut out = Vec::with_capacity(ENC_PUBLIC_KEY_SIZE + ct.len());
    out.extend_from_slice(eph_pub.as_bytes());
    out.extend_from_slice(&ct);
    Ok(out)
}

fn seal_nonce(eph_pub: &[u8], recipient_pub: &[u8]) -> [u8; 24] {
    let digest = hash::hash_parts(&[eph_pub, recipient_pub]);
    let mut nonce = [0u8; 24];
    nonce.copy_from_slice(&digest[..24]);
    nonce
}

/// Seal a fixed 32-byte resource key (the common case: key-publish payloads).
pub fn seal_key(recipient: &EncPublicKey, key_to_seal: &[u8; 32]) -> Result<Vec<u8>, PrimitiveError> {
    seal(recipient, key_to_seal)
}

fn derive_seal_key(dh_output: &[u8], eph_pub: &[u8], recipient_pub: &[u8]) -> [u8; 32] {
    use hkdf::Hkdf;
    use sha2::Sha256;
    let hk = Hkdf::<Sha256>::new(Some(eph_pub), dh_output);
    let mut key = [0u8; 32];
    // recipient_pub binds the key to this specific recipient so a sealed
    // blob cannot be replayed against a different public key sharing the
    // same ephemeral/DH accident.
    let mut info = Vec::with_capacity(SEAL_INFO.len() + recipient_pub.len());
    info.extend_from_slice(SEAL_INFO);
    info.extend_from_slice(recipient_pub);
    hk.expand(&info, &mut key).expect("32 bytes is a valid HKDF output length");
    key
}
