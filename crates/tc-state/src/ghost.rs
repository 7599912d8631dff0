//! The ghost device (C6 §4.6): a distinguished first device whose key
//! pair *is* the user's verification key. It authors every subsequent
//! device_creation of the same user and never decrypts recipient-side
//! traffic directly.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tc_primitives::seal::EncKeyPair;
use tc_primitives::sign::SigKeyPair;

use crate::error::StateError;

/// `base64(JSON { privateSignatureKey: b64(64B), privateEncryptionKey:
/// b64(32B) })`. The 64-byte signature secret is the libsodium
/// encoding (32-byte seed || 32-byte public key); only the seed half is
/// used to reconstruct the signing key.
#[derive(Debug, Serialize, Deserialize)]
struct VerificationKeyJson {
    #[serde(rename = "privateSignatureKey")]
    private_signature_key: String,
    #[serde(rename = "privateEncryptionKey")]
    private_encryption_key: String,
}

pub struct VerificationKey {
    pub signature_seed: [u8; 32],
    pub encryption_secret: [u8; 32],
}

impl VerificationKey {
    pub fn generate() -> (Self, GhostDevice) {
        let sig = SigKeyPair::generate();
        let enc = EncKeyPair::generate();
        let vk = VerificationKey {
            signature_seed: *sig.secret_bytes(),
            encryption_secret: *enc.secret_bytes(),
        };
        let ghost = GhostDevice { sig, enc };
        (vk, ghost)
    }

    pub fn to_base64(&self) -> String {
        let mut sig_bytes = Vec::with_capacity(64);
        sig_bytes.extend_from_slice(&self.signature_seed);
        // The libsodium convention appends the public key; callers that
        // only need the seed can ignore the trailing half.
        let sig = SigKeyPair::from_secret_bytes(&self.signature_seed).expect("seed is 32 bytes");
        sig_bytes.extend_from_slice(&sig.public().0);

        let json = VerificationKeyJson {
            private_signature_key: STANDARD.encode(sig_bytes),
            private_encryption_key: STANDARD.encode(self.encryption_secret),
        };
        let serialized = serde_json::to_vec(&json).expect("VerificationKeyJson always serializes");
        STANDARD.encode(serialized)
    }

    pub fn from_base64(s: &str) -> Result<Self, StateError> {
        let raw = STANDARD.decode(s).map_err(|_| StateError::InvalidVerification)?;
        let json: VerificationKeyJson = serde_json::from_slice(&raw).map_err(|_| StateError::InvalidVerification)?;

        let sig_bytes = STANDARD
            .decode(&json.private_signature_key)
            .map_err(|_| StateError::InvalidVerification)?;
        if sig_bytes.len() != 64 {
            return Err(StateError::InvalidVerification);
        }
        let mut signature_seed = [0u8; 32];
        signature_seed.copy_from_slice(&sig_bytes[..32]);

        let enc_bytes = STANDARD
            .decode(&json.private_encryption_key)
            .map_err(|_| StateError::InvalidVerification)?;
        let encryption_secret: [u8; 32] = enc_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StateError::InvalidVerification)?;

        Ok(Self {
            signature_seed,
            encryption_secret,
        })
    }

    pub fn reconstitute(&self) -> Result<GhostDevice, StateError> {
        let sig = SigKeyPair::from_secret_bytes(&self.signature_seed).map_err(|_| StateError::InvalidVerification)?;
        let enc = EncKeyPair::from_secret_bytes(&self.encryption_secret).map_err(|_| StateError::InvalidVerification)?;
        Ok(GhostDevice { sig, enc })
    }
}

/// The ghost device's live key pair, reconstructed from a verification
/// key whenever a new real device needs to be delegated into existence.
pub struct GhostDevice {
    sig: SigKeyPair,
    enc: EncKeyPair,
}

impl GhostDevice {
    pub fn signature_key(&self) -> &SigKeyPair {
        &self.sig
    }

    pub fn encryption_key(&self) -> &EncKeyPair {
        &self.enc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_key_roundtrips_through_base64() {
        let (vk, ghost) = VerificationKey::generate();
        let encoded = vk.to_base64();
        let decoded = VerificationKey::from_base64(&encoded).unwrap();
        let reconstituted = decoded.reconstitute().unwrap();
        assert_eq!(reconstituted.signature_key().public(), ghost.signature_key().public());
        assert_eq!(reconstituted.encryption_key().public(), ghost.encryption_key().public());
    }

    #[test]
    fn corrupted_verification_key_surfaces_as_invalid_verification() {
        let (vk, _ghost) = VerificationKey::generate();
        let mut encoded = vk.to_base64();
        encoded.push('!');
        assert!(matches!(
            VerificationKey::from_base64(&encoded),
            Err(StateError::InvalidVerification)
        ));
    }
}
