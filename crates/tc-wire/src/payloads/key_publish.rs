//! key_publish_to_{device,user,user_group,provisional_user} payloads.

use crate::error::WireError;
use crate::fields::{EncPublicKey32, Sealed, SigPublicKey32};
use crate::reader::Reader;
use crate::writer::Writer;

pub const RESOURCE_ID_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub [u8; RESOURCE_ID_SIZE]);

impl ResourceId {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
        crate::reader::expect_field_size("resource_id", bytes, RESOURCE_ID_SIZE)?;
        let mut arr = [0u8; RESOURCE_ID_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

/// Shared shape of key_publish_to_device / key_publish_to_user /
/// key_publish_to_user_group: a single-sealed resource key addressed
/// to one recipient public encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToRecipient {
    pub recipient_public_encryption_key: EncPublicKey32,
    pub resource_id: ResourceId,
    pub sealed_resource_key: Sealed,
}

impl KeyPublishToRecipient {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.recipient_public_encryption_key.as_bytes());
        w.fixed(&self.resource_id.0);
        w.fixed(self.sealed_resource_key.as_bytes());
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = Self {
            recipient_public_encryption_key: EncPublicKey32::from_slice(r.fixed(32)?)?,
            resource_id: ResourceId::from_slice(r.fixed(RESOURCE_ID_SIZE)?)?,
            sealed_resource_key: Sealed::sealed_enc_private_key(r.fixed(80)?)?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

/// key_publish_to_provisional_user: the resource key is sealed to
/// `app_enc_pub`, then the whole sealed blob is sealed again to
/// `tanker_enc_pub` — addressable before the provisional identity is
/// claimed by a real user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToProvisionalUser {
    pub app_sig_pub: SigPublicKey32,
    pub tanker_sig_pub: SigPublicKey32,
    pub resource_id: ResourceId,
    pub doubly_sealed_resource_key: Sealed,
}

impl KeyPublishToProvisionalUser {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.app_sig_pub.as_bytes());
        w.fixed(self.tanker_sig_pub.as_bytes());
        w.fixed(&self.resource_id.0);
        w.fixed(self.doubly_sealed_resource_key.as_bytes());
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = Self {
            app_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            tanker_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            resource_id: ResourceId::from_slice(r.fixed(RESOURCE_ID_SIZE)?)?,
            doubly_sealed_resource_key: Sealed::two_sealed_key(r.fixed(128)?)?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_publish_to_recipient_roundtrips() {
        let record = KeyPublishToRecipient {
            recipient_public_encryption_key: EncPublicKey32::from_slice(&[1u8; 32]).unwrap(),
            resource_id: ResourceId::from_slice(&[2u8; 16]).unwrap(),
            sealed_resource_key: Sealed::sealed_enc_private_key(&[3u8; 80]).unwrap(),
        };
        let decoded = KeyPublishToRecipient::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn key_publish_to_provisional_user_roundtrips() {
        let record = KeyPublishToProvisionalUser {
            app_sig_pub: SigPublicKey32::from_slice(&[4u8; 32]).unwrap(),
            tanker_sig_pub: SigPublicKey32::from_slice(&[5u8; 32]).unwrap(),
            resource_id: ResourceId::from_slice(&[6u8; 16]).unwrap(),
            doubly_sealed_resource_key: Sealed::two_sealed_key(&[7u8; 128]).unwrap(),
        };
        let decoded = KeyPublishToProvisionalUser::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }
}
