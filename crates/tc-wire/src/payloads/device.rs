//! device_creation and device_revocation payloads.

use tc_primitives::sign::{SigPublicKey, Signature64};

use crate::error::WireError;
use crate::fields::{EncPublicKey32, Hash32, Sealed, SigPublicKey32};
use crate::reader::Reader;
use crate::writer::Writer;

/// `(public, sealed_private)` — a user's encryption key pair as carried
/// in a device_creation payload, private half sealed to the new
/// device's public encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedUserKeyPair {
    pub public: EncPublicKey32,
    pub sealed_private: Sealed,
}

impl SealedUserKeyPair {
    fn write(&self, w: &mut Writer) {
        w.fixed(self.public.as_bytes());
        w.fixed(self.sealed_private.as_bytes());
    }

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        let public = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let sealed_private = Sealed::sealed_enc_private_key(r.fixed(80)?)?;
        Ok(Self { public, sealed_private })
    }
}

/// Legacy device_creation_v1 record. Decode-only: the writer never
/// emits this variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationV1 {
    pub ephemeral_public_signature_key: SigPublicKey32,
    pub user_id: Hash32,
    pub delegation_signature: [u8; 64],
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
}

impl DeviceCreationV1 {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = DeviceCreationV1 {
            ephemeral_public_signature_key: SigPublicKey32::from_slice(r.fixed(32)?)?,
            user_id: Hash32::from_slice(r.fixed(32)?)?,
            delegation_signature: r.fixed_array()?,
            public_signature_key: SigPublicKey32::from_slice(r.fixed(32)?)?,
            public_encryption_key: EncPublicKey32::from_slice(r.fixed(32)?)?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

/// Legacy device_creation_v2 record: adds the sealed user key pair but
/// not yet the ghost flag. Decode-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationV2 {
    pub ephemeral_public_signature_key: SigPublicKey32,
    pub user_id: Hash32,
    pub delegation_signature: [u8; 64],
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub user_key_pair: SealedUserKeyPair,
}

impl DeviceCreationV2 {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = DeviceCreationV2 {
            ephemeral_public_signature_key: SigPublicKey32::from_slice(r.fixed(32)?)?,
            user_id: Hash32::from_slice(r.fixed(32)?)?,
            delegation_signature: r.fixed_array()?,
            public_signature_key: SigPublicKey32::from_slice(r.fixed(32)?)?,
            public_encryption_key: EncPublicKey32::from_slice(r.fixed(32)?)?,
            user_key_pair: SealedUserKeyPair::read(&mut r)?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

/// Current device_creation record. The writer always emits this
/// variant; the reader also accepts v1/v2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationV3 {
    pub ephemeral_public_signature_key: SigPublicKey32,
    pub user_id: Hash32,
    /// Signed by the trustchain key (first device of a user) or by an
    /// existing non-revoked device of the same user, over
    /// `ephemeral_public_signature_key || user_id`.
    pub delegation_signature: [u8; 64],
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub user_key_pair: SealedUserKeyPair,
    pub is_ghost: bool,
    /// Self-signature over `sign_data()`, verifying under
    /// `public_signature_key`.
    pub self_signature: [u8; 64],
}

impl DeviceCreationV3 {
    /// Bytes covered by the self-signature: `ephemeral_public_signature_key
    /// || user_id || delegation_signature || public_signature_key ||
    /// public_encryption_key || user_key_pair.public ||
    /// user_key_pair.sealed_private || is_ghost_flag`.
    pub fn sign_data(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.ephemeral_public_signature_key.as_bytes());
        w.fixed(self.user_id.as_bytes());
        w.fixed(&self.delegation_signature);
        w.fixed(self.public_signature_key.as_bytes());
        w.fixed(self.public_encryption_key.as_bytes());
        self.user_key_pair.write(&mut w);
        w.fixed(&[self.is_ghost as u8]);
        w.into_bytes()
    }

    /// Bytes the delegation signature was produced over.
    pub fn delegation_data(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.ephemeral_public_signature_key.as_bytes());
        w.fixed(self.user_id.as_bytes());
        w.into_bytes()
    }

    pub fn verify_self_signature(&self) -> bool {
        let key = SigPublicKey(self.public_signature_key.0);
        key.verify(&self.sign_data(), &Signature64(self.self_signature)).is_ok()
    }

    pub fn verify_delegation(&self, delegator: &SigPublicKey) -> bool {
        delegator
            .verify(&self.delegation_data(), &Signature64(self.delegation_signature))
            .is_ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.ephemeral_public_signature_key.as_bytes());
        w.fixed(self.user_id.as_bytes());
        w.fixed(&self.delegation_signature);
        w.fixed(self.public_signature_key.as_bytes());
        w.fixed(self.public_encryption_key.as_bytes());
        self.user_key_pair.write(&mut w);
        w.fixed(&[self.is_ghost as u8]);
        w.fixed(&self.self_signature);
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let ephemeral_public_signature_key = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let user_id = Hash32::from_slice(r.fixed(32)?)?;
        let delegation_signature = r.fixed_array()?;
        let public_signature_key = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let public_encryption_key = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let user_key_pair = SealedUserKeyPair::read(&mut r)?;
        let ghost_byte = r.fixed(1)?[0];
        let is_ghost = match ghost_byte {
            0 => false,
            1 => true,
            _ => return Err(WireError::Malformed("is_ghost flag must be 0 or 1")),
        };
        let self_signature = r.fixed_array()?;
        r.expect_exhausted()?;
        Ok(Self {
            ephemeral_public_signature_key,
            user_id,
            delegation_signature,
            public_signature_key,
            public_encryption_key,
            user_key_pair,
            is_ghost,
            self_signature,
        })
    }
}

/// Legacy device_revocation_v1 record: only names the revoked device,
/// without the key-rotation fan-out. Decode-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocationV1 {
    pub revoked_device_id: Hash32,
}

impl DeviceRevocationV1 {
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = Self {
            revoked_device_id: Hash32::from_slice(r.fixed(32)?)?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

/// `(recipient_device_id, sealed_new_user_private_key)` fan-out entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedKeyForDevice {
    pub recipient_device_id: Hash32,
    pub sealed_new_user_private_key: Sealed,
}

/// Current device_revocation record: rotates the user's encryption key
/// pair and re-encrypts the new private half to every non-revoked
/// sibling device except the one being revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocationV2 {
    pub revoked_device_id: Hash32,
    pub previous_public_encryption_key: EncPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub sealed_keys_for_devices: Vec<RotatedKeyForDevice>,
}

impl DeviceRevocationV2 {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.revoked_device_id.as_bytes());
        w.fixed(self.previous_public_encryption_key.as_bytes());
        w.fixed(self.public_encryption_key.as_bytes());
        w.list(&self.sealed_keys_for_devices, |w, entry| {
            w.fixed(entry.recipient_device_id.as_bytes());
            w.fixed(entry.sealed_new_user_private_key.as_bytes());
        });
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let revoked_device_id = Hash32::from_slice(r.fixed(32)?)?;
        let previous_public_encryption_key = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let public_encryption_key = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let sealed_keys_for_devices = r.list(|r| {
            let recipient_device_id = Hash32::from_slice(r.fixed(32)?)?;
            let sealed_new_user_private_key = Sealed::sealed_enc_private_key(r.fixed(80)?)?;
            Ok(RotatedKeyForDevice {
                recipient_device_id,
                sealed_new_user_private_key,
            })
        })?;
        r.expect_exhausted()?;
        Ok(Self {
            revoked_device_id,
            previous_public_encryption_key,
            public_encryption_key,
            sealed_keys_for_devices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_primitives::sign::SigKeyPair;

    fn sample_v3(ghost: bool) -> DeviceCreationV3 {
        let device_key = SigKeyPair::generate();
        let mut record = DeviceCreationV3 {
            ephemeral_public_signature_key: SigPublicKey32::from_slice(&[1u8; 32]).unwrap(),
            user_id: Hash32::from_slice(&[2u8; 32]).unwrap(),
            delegation_signature: [3u8; 64],
            public_signature_key: SigPublicKey32(device_key.public().0),
            public_encryption_key: EncPublicKey32::from_slice(&[4u8; 32]).unwrap(),
            user_key_pair: SealedUserKeyPair {
                public: EncPublicKey32::from_slice(&[5u8; 32]).unwrap(),
                sealed_private: Sealed::sealed_enc_private_key(&[6u8; 80]).unwrap(),
            },
            is_ghost: ghost,
            self_signature: [0u8; 64],
        };
        let sig = device_key.sign(&record.sign_data());
        record.self_signature = sig.0;
        record
    }

    #[test]
    fn v3_roundtrips_and_self_signature_verifies() {
        let record = sample_v3(false);
        let encoded = record.encode();
        let decoded = DeviceCreationV3::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify_self_signature());
    }

    #[test]
    fn tampering_breaks_self_signature() {
        let mut record = sample_v3(true);
        record.is_ghost = false;
        assert!(!record.verify_self_signature());
    }

    #[test]
    fn revocation_v2_roundtrips() {
        let record = DeviceRevocationV2 {
            revoked_device_id: Hash32::from_slice(&[1u8; 32]).unwrap(),
            previous_public_encryption_key: EncPublicKey32::from_slice(&[2u8; 32]).unwrap(),
            public_encryption_key: EncPublicKey32::from_slice(&[3u8; 32]).unwrap(),
            sealed_keys_for_devices: vec![RotatedKeyForDevice {
                recipient_device_id: Hash32::from_slice(&[4u8; 32]).unwrap(),
                sealed_new_user_private_key: Sealed::sealed_enc_private_key(&[5u8; 80]).unwrap(),
            }],
        };
        let encoded = record.encode();
        let decoded = DeviceRevocationV2::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
