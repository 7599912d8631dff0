//! Ed25519 signing — wraps `ed25519-dalek` behind fixed-size newtypes so
//! callers can never pass a public key where a signature was expected.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand_core::OsRng;
use zeroize::ZeroizeOnDrop;

use crate::error::PrimitiveError;

pub const SIG_PUBLIC_KEY_SIZE: usize = 32;
pub const SIG_PRIVATE_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

/// 32-byte Ed25519 public signature key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigPublicKey(pub [u8; SIG_PUBLIC_KEY_SIZE]);

impl SigPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        let arr: [u8; SIG_PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("signature public key must be 32 bytes"))?;
        Ok(Self(arr))
    }

    /// Verify `sig` over `msg` under this public key.
    pub fn verify(&self, msg: &[u8], sig: &Signature64) -> Result<(), PrimitiveError> {
        let vk = VerifyingKey::from_bytes(&self.0)
            .map_err(|_| PrimitiveError::InvalidKey("malformed Ed25519 public key"))?;
        let signature = Signature::from_bytes(&sig.0);
        vk.verify(msg, &signature)
            .map_err(|_| PrimitiveError::SignatureVerification)
    }
}

/// 64-byte raw Ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature64(pub [u8; SIGNATURE_SIZE]);

impl Signature64 {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        let arr: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("signature must be 64 bytes"))?;
        Ok(Self(arr))
    }

    /// The all-zero signature carried by the trustchain root block.
    pub fn zero() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; SIGNATURE_SIZE]
    }
}

/// Ed25519 signing key pair. Zeroized on drop — the secret half never
/// outlives the process that generated or loaded it.
#[derive(ZeroizeOnDrop)]
pub struct SigKeyPair {
    #[zeroize(skip)]
    public: SigPublicKey,
    secret_bytes: [u8; SIG_PRIVATE_KEY_SIZE],
}

impl SigKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: SigPublicKey(signing_key.verifying_key().to_bytes()),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, PrimitiveError> {
        let arr: [u8; SIG_PRIVATE_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKey("signing secret must be 32 bytes"))?;
        let signing_key = SigningKey::from_bytes(&arr);
        Ok(Self {
            public: SigPublicKey(signing_key.verifying_key().to_bytes()),
            secret_bytes: arr,
        })
    }

    pub fn public(&self) -> SigPublicKey {
        self.public
    }

    pub fn secret_bytes(&self) -> &[u8; SIG_PRIVATE_KEY_SIZE] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    pub fn sign(&self, msg: &[u8]) -> Signature64 {
        Signature64(self.signing_key().sign(msg).to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = SigKeyPair::generate();
        let sig = kp.sign(b"hello trustchain");
        kp.public().verify(b"hello trustchain", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = SigKeyPair::generate();
        let sig = kp.sign(b"hello trustchain");
        assert!(kp.public().verify(b"hello trustchait", &sig).is_err());
    }

    #[test]
    fn root_block_signature_is_the_zero_signature() {
        let zero = Signature64::zero();
        assert!(zero.is_zero());
    }
}
