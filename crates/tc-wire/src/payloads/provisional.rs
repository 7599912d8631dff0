//! provisional_identity_claim payload: attaches a provisional identity
//! (app_sig/app_enc/tanker_sig/tanker_enc key quartet) to a real user,
//! proving control of both provisional signature keys and handing the
//! claiming user a copy of both provisional encryption private keys.

use tc_primitives::sign::{SigPublicKey, Signature64};

use crate::error::WireError;
use crate::fields::{EncPublicKey32, Hash32, Sealed, SigPublicKey32};
use crate::reader::Reader;
use crate::writer::Writer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalIdentityClaim {
    pub user_id: Hash32,
    pub app_sig_pub: SigPublicKey32,
    pub tanker_sig_pub: SigPublicKey32,
    /// Proves control of the app provisional signature key: signs
    /// `user_id` under `app_sig_pub`.
    pub author_signature_by_app_key: [u8; 64],
    /// Proves control of the tanker provisional signature key: signs
    /// `user_id` under `tanker_sig_pub`.
    pub author_signature_by_tanker_key: [u8; 64],
    pub recipient_user_public_encryption_key: EncPublicKey32,
    /// `app_enc_priv || tanker_enc_priv` (64 bytes), sealed to
    /// `recipient_user_public_encryption_key`.
    pub encrypted_private_encryption_keys: Sealed,
}

const ENCRYPTED_PRIVATE_ENCRYPTION_KEYS_SIZE: usize = 112;

impl ProvisionalIdentityClaim {
    pub fn claim_data(&self) -> Vec<u8> {
        self.user_id.as_bytes().to_vec()
    }

    pub fn verify_ownership_signatures(&self) -> bool {
        let data = self.claim_data();
        let app_key = SigPublicKey(self.app_sig_pub.0);
        let tanker_key = SigPublicKey(self.tanker_sig_pub.0);
        app_key.verify(&data, &Signature64(self.author_signature_by_app_key)).is_ok()
            && tanker_key
                .verify(&data, &Signature64(self.author_signature_by_tanker_key))
                .is_ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.user_id.as_bytes());
        w.fixed(self.app_sig_pub.as_bytes());
        w.fixed(self.tanker_sig_pub.as_bytes());
        w.fixed(&self.author_signature_by_app_key);
        w.fixed(&self.author_signature_by_tanker_key);
        w.fixed(self.recipient_user_public_encryption_key.as_bytes());
        w.fixed(self.encrypted_private_encryption_keys.as_bytes());
        w.into_bytes()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let record = Self {
            user_id: Hash32::from_slice(r.fixed(32)?)?,
            app_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            tanker_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            author_signature_by_app_key: r.fixed_array()?,
            author_signature_by_tanker_key: r.fixed_array()?,
            recipient_user_public_encryption_key: EncPublicKey32::from_slice(r.fixed(32)?)?,
            encrypted_private_encryption_keys: Sealed::from_slice(
                "encrypted_private_encryption_keys",
                r.fixed(ENCRYPTED_PRIVATE_ENCRYPTION_KEYS_SIZE)?,
                ENCRYPTED_PRIVATE_ENCRYPTION_KEYS_SIZE,
            )?,
        };
        r.expect_exhausted()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_primitives::sign::SigKeyPair;

    #[test]
    fn claim_roundtrips_and_ownership_signatures_verify() {
        let app_key = SigKeyPair::generate();
        let tanker_key = SigKeyPair::generate();
        let user_id = Hash32::from_slice(&[7u8; 32]).unwrap();

        let mut record = ProvisionalIdentityClaim {
            user_id: user_id.clone(),
            app_sig_pub: SigPublicKey32(app_key.public().0),
            tanker_sig_pub: SigPublicKey32(tanker_key.public().0),
            author_signature_by_app_key: [0u8; 64],
            author_signature_by_tanker_key: [0u8; 64],
            recipient_user_public_encryption_key: EncPublicKey32::from_slice(&[8u8; 32]).unwrap(),
            encrypted_private_encryption_keys: Sealed::from_slice(
                "encrypted_private_encryption_keys",
                &[9u8; 112],
                112,
            )
            .unwrap(),
        };
        let data = record.claim_data();
        record.author_signature_by_app_key = app_key.sign(&data).0;
        record.author_signature_by_tanker_key = tanker_key.sign(&data).0;

        let decoded = ProvisionalIdentityClaim::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify_ownership_signatures());
    }
}
