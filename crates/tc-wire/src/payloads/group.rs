//! user_group_creation, user_group_addition and user_group_update
//! payloads. Creation and addition share a structural shape across
//! their version families: v1 carries only real-member entries, v2+
//! adds a parallel list of provisional-member entries.

use tc_primitives::sign::{SigPublicKey, Signature64};

use crate::error::WireError;
use crate::fields::{EncPublicKey32, Hash32, Sealed, SigPublicKey32};
use crate::reader::Reader;
use crate::writer::Writer;

/// A group's private encryption key, sealed to one member's public
/// encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUserEntry {
    pub user_id: Hash32,
    pub user_public_encryption_key: EncPublicKey32,
    pub sealed_group_private_encryption_key: Sealed,
}

impl GroupUserEntry {
    fn write(&self, w: &mut Writer) {
        w.fixed(self.user_id.as_bytes());
        w.fixed(self.user_public_encryption_key.as_bytes());
        w.fixed(self.sealed_group_private_encryption_key.as_bytes());
    }

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            user_id: Hash32::from_slice(r.fixed(32)?)?,
            user_public_encryption_key: EncPublicKey32::from_slice(r.fixed(32)?)?,
            sealed_group_private_encryption_key: Sealed::sealed_enc_private_key(r.fixed(80)?)?,
        })
    }
}

/// A group's private encryption key, doubly sealed to an unclaimed
/// provisional identity's app and tanker encryption keys, addressable
/// before that identity is attached to a real user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupProvisionalEntry {
    pub app_sig_pub: SigPublicKey32,
    pub app_enc_pub: EncPublicKey32,
    pub tanker_sig_pub: SigPublicKey32,
    pub tanker_enc_pub: EncPublicKey32,
    pub doubly_sealed_group_private_encryption_key: Sealed,
}

impl GroupProvisionalEntry {
    fn write(&self, w: &mut Writer) {
        w.fixed(self.app_sig_pub.as_bytes());
        w.fixed(self.app_enc_pub.as_bytes());
        w.fixed(self.tanker_sig_pub.as_bytes());
        w.fixed(self.tanker_enc_pub.as_bytes());
        w.fixed(self.doubly_sealed_group_private_encryption_key.as_bytes());
    }

    fn read(r: &mut Reader) -> Result<Self, WireError> {
        Ok(Self {
            app_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            app_enc_pub: EncPublicKey32::from_slice(r.fixed(32)?)?,
            tanker_sig_pub: SigPublicKey32::from_slice(r.fixed(32)?)?,
            tanker_enc_pub: EncPublicKey32::from_slice(r.fixed(32)?)?,
            doubly_sealed_group_private_encryption_key: Sealed::two_sealed_key(r.fixed(128)?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreation {
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub sealed_private_signature_key: Sealed,
    pub members: Vec<GroupUserEntry>,
    /// `None` for v1, `Some` (possibly empty) from v2 onward.
    pub provisional_members: Option<Vec<GroupProvisionalEntry>>,
    /// Verifies under `public_signature_key`.
    pub self_signature: [u8; 64],
}

impl UserGroupCreation {
    pub fn sign_data(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.public_signature_key.as_bytes());
        w.fixed(self.public_encryption_key.as_bytes());
        w.fixed(self.sealed_private_signature_key.as_bytes());
        w.list(&self.members, |w, m| m.write(w));
        if let Some(provisional) = &self.provisional_members {
            w.list(provisional, |w, p| p.write(w));
        }
        w.into_bytes()
    }

    pub fn verify_self_signature(&self) -> bool {
        let key = SigPublicKey(self.public_signature_key.0);
        key.verify(&self.sign_data(), &Signature64(self.self_signature)).is_ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.sign_data();
        bytes.extend_from_slice(&self.self_signature);
        bytes
    }

    pub fn decode(payload: &[u8], has_provisional: bool) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let public_signature_key = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let public_encryption_key = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let sealed_private_signature_key = Sealed::sealed_sig_private_key(r.fixed(112)?)?;
        let members = r.list(|r| GroupUserEntry::read(r))?;
        let provisional_members = if has_provisional {
            Some(r.list(|r| GroupProvisionalEntry::read(r))?)
        } else {
            None
        };
        let self_signature = r.fixed_array()?;
        r.expect_exhausted()?;
        Ok(Self {
            public_signature_key,
            public_encryption_key,
            sealed_private_signature_key,
            members,
            provisional_members,
            self_signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAddition {
    pub group_id: SigPublicKey32,
    pub previous_group_block: Hash32,
    pub members: Vec<GroupUserEntry>,
    pub provisional_members: Option<Vec<GroupProvisionalEntry>>,
    /// Verifies under the group's *current* signature key at write time.
    pub self_signature: [u8; 64],
}

impl UserGroupAddition {
    pub fn sign_data(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.group_id.as_bytes());
        w.fixed(self.previous_group_block.as_bytes());
        w.list(&self.members, |w, m| m.write(w));
        if let Some(provisional) = &self.provisional_members {
            w.list(provisional, |w, p| p.write(w));
        }
        w.into_bytes()
    }

    pub fn verify_self_signature(&self, current_group_key: &SigPublicKey32) -> bool {
        let key = SigPublicKey(current_group_key.0);
        key.verify(&self.sign_data(), &Signature64(self.self_signature)).is_ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.sign_data();
        bytes.extend_from_slice(&self.self_signature);
        bytes
    }

    pub fn decode(payload: &[u8], has_provisional: bool) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let group_id = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let previous_group_block = Hash32::from_slice(r.fixed(32)?)?;
        let members = r.list(|r| GroupUserEntry::read(r))?;
        let provisional_members = if has_provisional {
            Some(r.list(|r| GroupProvisionalEntry::read(r))?)
        } else {
            None
        };
        let self_signature = r.fixed_array()?;
        r.expect_exhausted()?;
        Ok(Self {
            group_id,
            previous_group_block,
            members,
            provisional_members,
            self_signature,
        })
    }
}

/// Rotates a group's key pair. Carries two signatures: one under the
/// new group signature key, one under the previous one, so the
/// verifier can confirm both continuity and the new key's authority in
/// one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupUpdate {
    pub group_id: SigPublicKey32,
    pub previous_key_rotation_block: Hash32,
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub sealed_private_signature_key: Sealed,
    /// The group's previous private encryption key, sealed to the new
    /// group public encryption key, so members holding the new key can
    /// still decrypt resources shared before the rotation.
    pub encrypted_previous_group_private_encryption_key: Sealed,
    pub self_signature_new: [u8; 64],
    pub self_signature_previous: [u8; 64],
}

impl UserGroupUpdate {
    pub fn sign_data(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.fixed(self.group_id.as_bytes());
        w.fixed(self.previous_key_rotation_block.as_bytes());
        w.fixed(self.public_signature_key.as_bytes());
        w.fixed(self.public_encryption_key.as_bytes());
        w.fixed(self.sealed_private_signature_key.as_bytes());
        w.fixed(self.encrypted_previous_group_private_encryption_key.as_bytes());
        w.into_bytes()
    }

    pub fn verify_signatures(&self, previous_group_key: &SigPublicKey32) -> bool {
        let data = self.sign_data();
        let new_key = SigPublicKey(self.public_signature_key.0);
        let prev_key = SigPublicKey(previous_group_key.0);
        new_key.verify(&data, &Signature64(self.self_signature_new)).is_ok()
            && prev_key.verify(&data, &Signature64(self.self_signature_previous)).is_ok()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.sign_data();
        bytes.extend_from_slice(&self.self_signature_new);
        bytes.extend_from_slice(&self.self_signature_previous);
        bytes
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let group_id = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let previous_key_rotation_block = Hash32::from_slice(r.fixed(32)?)?;
        let public_signature_key = SigPublicKey32::from_slice(r.fixed(32)?)?;
        let public_encryption_key = EncPublicKey32::from_slice(r.fixed(32)?)?;
        let sealed_private_signature_key = Sealed::sealed_sig_private_key(r.fixed(112)?)?;
        let encrypted_previous_group_private_encryption_key = Sealed::sealed_enc_private_key(r.fixed(80)?)?;
        let self_signature_new = r.fixed_array()?;
        let self_signature_previous = r.fixed_array()?;
        r.expect_exhausted()?;
        Ok(Self {
            group_id,
            previous_key_rotation_block,
            public_signature_key,
            public_encryption_key,
            sealed_private_signature_key,
            encrypted_previous_group_private_encryption_key,
            self_signature_new,
            self_signature_previous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_primitives::sign::SigKeyPair;

    fn member(n: u8) -> GroupUserEntry {
        GroupUserEntry {
            user_id: Hash32::from_slice(&[n; 32]).unwrap(),
            user_public_encryption_key: EncPublicKey32::from_slice(&[n; 32]).unwrap(),
            sealed_group_private_encryption_key: Sealed::sealed_enc_private_key(&[n; 80]).unwrap(),
        }
    }

    #[test]
    fn creation_v1_has_no_provisional_list_and_self_signature_verifies() {
        let group_key = SigKeyPair::generate();
        let mut record = UserGroupCreation {
            public_signature_key: SigPublicKey32(group_key.public().0),
            public_encryption_key: EncPublicKey32::from_slice(&[9u8; 32]).unwrap(),
            sealed_private_signature_key: Sealed::sealed_sig_private_key(&[1u8; 112]).unwrap(),
            members: vec![member(1), member(2)],
            provisional_members: None,
            self_signature: [0u8; 64],
        };
        record.self_signature = group_key.sign(&record.sign_data()).0;

        let decoded = UserGroupCreation::decode(&record.encode(), false).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify_self_signature());
    }

    #[test]
    fn creation_v2_roundtrips_with_empty_provisional_list() {
        let group_key = SigKeyPair::generate();
        let mut record = UserGroupCreation {
            public_signature_key: SigPublicKey32(group_key.public().0),
            public_encryption_key: EncPublicKey32::from_slice(&[9u8; 32]).unwrap(),
            sealed_private_signature_key: Sealed::sealed_sig_private_key(&[1u8; 112]).unwrap(),
            members: vec![member(3)],
            provisional_members: Some(vec![]),
            self_signature: [0u8; 64],
        };
        record.self_signature = group_key.sign(&record.sign_data()).0;

        let decoded = UserGroupCreation::decode(&record.encode(), true).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.verify_self_signature());
    }

    #[test]
    fn update_requires_both_signatures() {
        let new_key = SigKeyPair::generate();
        let prev_key = SigKeyPair::generate();
        let mut record = UserGroupUpdate {
            group_id: SigPublicKey32(prev_key.public().0),
            previous_key_rotation_block: Hash32::from_slice(&[1u8; 32]).unwrap(),
            public_signature_key: SigPublicKey32(new_key.public().0),
            public_encryption_key: EncPublicKey32::from_slice(&[2u8; 32]).unwrap(),
            sealed_private_signature_key: Sealed::sealed_sig_private_key(&[3u8; 112]).unwrap(),
            encrypted_previous_group_private_encryption_key: Sealed::sealed_enc_private_key(&[4u8; 80]).unwrap(),
            self_signature_new: [0u8; 64],
            self_signature_previous: [0u8; 64],
        };
        let data = record.sign_data();
        record.self_signature_new = new_key.sign(&data).0;
        record.self_signature_previous = prev_key.sign(&data).0;

        let decoded = UserGroupUpdate::decode(&record.encode()).unwrap();
        assert!(decoded.verify_signatures(&SigPublicKey32(prev_key.public().0)));
    }
}
