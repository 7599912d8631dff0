//! Block-by-block verification (C9): folds a stream of blocks into
//! derived state, rejecting any block that violates a chain invariant
//! without advancing state past it. Verification is deterministic and
//! order-sensitive — blocks must be replayed in the order the
//! trustchain server assigned them.

use std::collections::HashSet;

use tc_primitives::sign::SigPublicKey;
use tc_state::group::{GroupState, MemberKey, ProvisionalGroupKey};
use tc_state::user::{DeviceInfo, UserState};
use tc_state::{GroupRegistry, UserRegistry};
use tc_wire::block::Block;
use tc_wire::fields::{Hash32, SigPublicKey32};
use tc_wire::nature::Nature;
use tc_wire::payloads::{self, device, group, Payload};

use crate::error::{invalid, VerifierError};

/// Either a real device's signing key or the trustchain's own signing
/// key, standing in for the pseudo-device that authors a user's ghost
/// device creation.
enum Authority {
    Trustchain(SigPublicKey),
    Device { user_id: Hash32, key: SigPublicKey },
}

impl Authority {
    fn public_key(&self) -> &SigPublicKey {
        match self {
            Authority::Trustchain(key) => key,
            Authority::Device { key, .. } => key,
        }
    }
}

pub struct Verifier {
    trustchain_id: Option<Hash32>,
    trustchain_public_key: Option<SigPublicKey>,
    pub users: UserRegistry,
    pub groups: GroupRegistry,
    claimed_provisionals: HashSet<(SigPublicKey32, SigPublicKey32)>,
    next_index: u64,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            trustchain_id: None,
            trustchain_public_key: None,
            users: UserRegistry::new(),
            groups: GroupRegistry::new(),
            claimed_provisionals: HashSet::new(),
            next_index: 0,
        }
    }

    pub fn trustchain_id(&self) -> Option<&Hash32> {
        self.trustchain_id.as_ref()
    }

    pub fn is_provisional_claimed(&self, identity: &(SigPublicKey32, SigPublicKey32)) -> bool {
        self.claimed_provisionals.contains(identity)
    }

    /// Verify `block` against current state and, if it passes, fold it
    /// in. On failure state is left exactly as it was before the call —
    /// a rejected block never partially applies.
    pub fn apply(&mut self, block: &Block) -> Result<(), VerifierError> {
        let index = self.next_index;
        self.verify_and_apply(block, index)?;
        self.next_index += 1;
        Ok(())
    }

    fn verify_and_apply(&mut self, block: &Block, index: u64) -> Result<(), VerifierError> {
        let hash = block.hash();
        let payload = payloads::decode(block.nature, &block.payload)?;

        if block.is_root() {
            return self.apply_root(block, hash, payload);
        }

        if self.trustchain_id.as_ref() != Some(&block.trustchain_id) {
            return Err(invalid(hash, block.nature, "trustchain_id_mismatch"));
        }

        let authority = self.resolve_authority(block, hash, index)?;
        if !block.verify_signature(authority.public_key()) {
            return Err(invalid(hash, block.nature, "outer_signature"));
        }

        match payload {
            Payload::TrustchainCreation(_) => Err(invalid(hash, block.nature, "duplicate_root")),
            Payload::DeviceCreationV3(record) => self.apply_device_creation_v3(block, hash, index, authority, record),
            Payload::DeviceCreationV2(record) => self.apply_device_creation_v2(block, hash, index, authority, record),
            Payload::DeviceCreationV1(record) => self.apply_device_creation_v1(block, hash, index, authority, record),
            Payload::DeviceRevocationV2(record) => self.apply_device_revocation_v2(block, hash, index, authority, record),
            Payload::DeviceRevocationV1(record) => self.apply_device_revocation_v1(hash, authority, record),
            Payload::KeyPublishToDevice(record) => self.check_key_publish_to_device(hash, block.nature, record),
            Payload::KeyPublishToUser(record) => self.check_key_publish_to_user(hash, block.nature, record),
            Payload::KeyPublishToUserGroup(record) => self.check_key_publish_to_group(hash, block.nature, record),
            Payload::KeyPublishToProvisionalUser(_) => Ok(()),
            Payload::UserGroupCreation(record) => self.apply_group_creation(hash, block.nature, record),
            Payload::UserGroupAddition(record) => self.apply_group_addition(hash, block.nature, record),
            Payload::UserGroupUpdate(record) => self.apply_group_update(hash, block.nature, record),
            Payload::ProvisionalIdentityClaim(record) => {
                self.apply_provisional_claim(hash, block.nature, authority, record)
            }
        }
    }

    fn apply_root(&mut self, block: &Block, hash: [u8; 32], payload: Payload) -> Result<(), VerifierError> {
        let key = match payload {
            Payload::TrustchainCreation(record) => record.trustchain_public_signature_key,
            _ => return Err(invalid(hash, block.nature, "root_nature")),
        };
        if block.trustchain_id.as_bytes() != &hash {
            return Err(invalid(hash, block.nature, "root_self_hash"));
        }
        self.trustchain_id = Some(block.trustchain_id.clone());
        self.trustchain_public_key = Some(SigPublicKey(key.0));
        Ok(())
    }

    /// `author == trustchain_id` marks the trustchain itself as the
    /// author — the convention used only by a user's ghost device
    /// creation. Every other block's author must be an existing,
    /// (if non-ghost) non-revoked device.
    fn resolve_authority(&self, block: &Block, hash: [u8; 32], index: u64) -> Result<Authority, VerifierError> {
        if Some(&block.author) == self.trustchain_id.as_ref() {
            let key = self
                .trustchain_public_key
                .clone()
                .ok_or_else(|| invalid(hash, block.nature, "trustchain_not_initialized"))?;
            return Ok(Authority::Trustchain(key));
        }

        let device = self
            .users
            .device(&block.author)
            .ok_or_else(|| invalid(hash, block.nature, "unknown_author_device"))?;
        if !device.is_ghost && device.is_revoked_at(index) {
            return Err(invalid(hash, block.nature, "author_device_revoked"));
        }
        Ok(Authority::Device {
            user_id: device.user_id.clone(),
            key: SigPublicKey(device.public_signature_key.0),
        })
    }

    fn apply_device_creation_v3(
        &mut self,
        block: &Block,
        hash: [u8; 32],
        index: u64,
        authority: Authority,
        record: device::DeviceCreationV3,
    ) -> Result<(), VerifierError> {
        if !record.verify_self_signature() {
            return Err(invalid(hash, block.nature, "self_signature"));
        }
        if !record.verify_delegation(authority.public_key()) {
            return Err(invalid(hash, block.nature, "delegation_signature"));
        }
        self.insert_device(
            block,
            hash,
            index,
            record.user_id,
            record.public_signature_key,
            record.public_encryption_key,
            record.user_key_pair.public,
            record.is_ghost,
        )
    }

    fn apply_device_creation_v2(
        &mut self,
        block: &Block,
        hash: [u8; 32],
        index: u64,
        authority: Authority,
        record: device::DeviceCreationV2,
    ) -> Result<(), VerifierError> {
        let delegation_data = delegation_data(&record.ephemeral_public_signature_key, &record.user_id);
        if authority
            .public_key()
            .verify(&delegation_data, &tc_primitives::sign::Signature64(record.delegation_signature))
            .is_err()
        {
            return Err(invalid(hash, block.nature, "delegation_signature"));
        }
        self.insert_device(
            block,
            hash,
            index,
            record.user_id,
            record.public_signature_key,
            record.public_encryption_key,
            record.user_key_pair.public,
            false,
        )
    }

    fn apply_device_creation_v1(
        &mut self,
        block: &Block,
        hash: [u8; 32],
        index: u64,
        authority: Authority,
        record: device::DeviceCreationV1,
    ) -> Result<(), VerifierError> {
        let delegation_data = delegation_data(&record.ephemeral_public_signature_key, &record.user_id);
        if authority
            .public_key()
            .verify(&delegation_data, &tc_primitives::sign::Signature64(record.delegation_signature))
            .is_err()
        {
            return Err(invalid(hash, block.nature, "delegation_signature"));
        }
        // v1 predates per-device user-key wrapping: it can only add a
        // device to a user that already has a live encryption key.
        let user = self
            .users
            .user(&record.user_id)
            .ok_or_else(|| invalid(hash, block.nature, "v1_requires_existing_user"))?;
        let live_key = user.live_public_encryption_key();
        self.insert_device(
            block,
            hash,
            index,
            record.user_id,
            record.public_signature_key,
            record.public_encryption_key,
            live_key,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_device(
        &mut self,
        block: &Block,
        hash: [u8; 32],
        index: u64,
        user_id: Hash32,
        public_signature_key: SigPublicKey32,
        public_encryption_key: tc_wire::fields::EncPublicKey32,
        user_key_pair_public: tc_wire::fields::EncPublicKey32,
        is_ghost: bool,
    ) -> Result<(), VerifierError> {
        match self.users.user(&user_id) {
            Some(user) => {
                if user.live_public_encryption_key() != user_key_pair_public {
                    return Err(invalid(hash, block.nature, "user_key_mismatch"));
                }
            }
            None => {
                self.users.insert_user(UserState::new(user_id.clone(), user_key_pair_public, index));
            }
        }

        let device_id = Hash32::from_slice(&hash).expect("block hash is 32 bytes");
        let device_user_id = user_id.clone();
        self.users
            .register_device(
                user_id,
                DeviceInfo {
                    device_id,
                    user_id: device_user_id,
                    public_signature_key,
                    public_encryption_key,
                    is_ghost,
                    revoked_at: None,
                },
            )
            .map_err(VerifierError::from)
    }

    fn apply_device_revocation_v2(
        &mut self,
        block: &Block,
        hash: [u8; 32],
        index: u64,
        authority: Authority,
        record: device::DeviceRevocationV2,
    ) -> Result<(), VerifierError> {
        let author_user_id = match &authority {
            Authority::Device { user_id, .. } => user_id.clone(),
            Authority::Trustchain(_) => return Err(invalid(hash, block.nature, "trustchain_cannot_revoke")),
        };
        let revoked_owner = self
            .users
            .owner_of(&record.revoked_device_id)
            .cloned()
            .ok_or_else(|| invalid(hash, block.nature, "unknown_revoked_device"))?;
        if revoked_owner != author_user_id {
            return Err(invalid(hash, block.nature, "author_not_sibling"));
        }

        let user = self
            .users
            .user(&author_user_id)
            .ok_or_else(|| invalid(hash, block.nature, "unknown_user"))?;
        let missing_recipient = user
            .non_revoked_devices(index)
            .filter(|d| d.device_id != record.revoked_device_id)
            .any(|d| {
                !record
                    .sealed_keys_for_devices
                    .iter()
                    .any(|entry| entry.recipient_device_id == d.device_id)
            });
        if missing_recipient {
            return Err(invalid(hash, block.nature, "missing_sibling_key"));
        }

        let user = self.users.user_mut(&author_user_id).expect("checked above");
        user.revoke_device(&record.revoked_device_id, index)?;
        user.rotate_public_encryption_key(record.public_encryption_key, index);
        Ok(())
    }

    fn apply_device_revocation_v1(
        &mut self,
        hash: [u8; 32],
        authority: Authority,
        record: device::DeviceRevocationV1,
    ) -> Result<(), VerifierError> {
        let author_user_id = match &authority {
            Authority::Device { user_id, .. } => user_id.clone(),
            Authority::Trustchain(_) => return Err(invalid(hash, Nature::DeviceRevocationV1, "trustchain_cannot_revoke")),
        };
        let revoked_owner = self
            .users
            .owner_of(&record.revoked_device_id)
            .cloned()
            .ok_or_else(|| invalid(hash, Nature::DeviceRevocationV1, "unknown_revoked_device"))?;
        if revoked_owner != author_user_id {
            return Err(invalid(hash, Nature::DeviceRevocationV1, "author_not_sibling"));
        }
        let user = self.users.user_mut(&author_user_id).expect("checked above");
        user.revoke_device(&record.revoked_device_id, self.next_index)?;
        Ok(())
    }

    fn check_key_publish_to_user(
        &self,
        hash: [u8; 32],
        nature: Nature,
        record: tc_wire::payloads::key_publish::KeyPublishToRecipient,
    ) -> Result<(), VerifierError> {
        let exists = self
            .users
            .all_states()
            .any(|u| u.live_public_encryption_key() == record.recipient_public_encryption_key);
        if !exists {
            return Err(invalid(hash, nature, "unknown_recipient_user"));
        }
        Ok(())
    }

    fn check_key_publish_to_device(
        &self,
        hash: [u8; 32],
        nature: Nature,
        record: tc_wire::payloads::key_publish::KeyPublishToRecipient,
    ) -> Result<(), VerifierError> {
        let exists = self
            .users
            .all_states()
            .flat_map(|u| u.devices())
            .any(|d| d.public_encryption_key == record.recipient_public_encryption_key);
        if !exists {
            return Err(invalid(hash, nature, "unknown_recipient_device"));
        }
        Ok(())
    }

    fn check_key_publish_to_group(
        &self,
        hash: [u8; 32],
        nature: Nature,
        record: tc_wire::payloads::key_publish::KeyPublishToRecipient,
    ) -> Result<(), VerifierError> {
        let exists = self
            .groups
            .all_states()
            .any(|g| g.encryption_public_key == record.recipient_public_encryption_key);
        if !exists {
            return Err(invalid(hash, nature, "unknown_recipient_group"));
        }
        Ok(())
    }

    fn apply_group_creation(
        &mut self,
        hash: [u8; 32],
        nature: Nature,
        record: group::UserGroupCreation,
    ) -> Result<(), VerifierError> {
        if !record.verify_self_signature() {
            return Err(invalid(hash, nature, "self_signature"));
        }
        for member in &record.members {
            let user = self
                .users
                .user(&member.user_id)
                .ok_or_else(|| invalid(hash, nature, "unknown_member_user"))?;
            if user.live_public_encryption_key() != member.user_public_encryption_key {
                return Err(invalid(hash, nature, "member_key_mismatch"));
            }
        }

        let group_id = record.public_signature_key.clone();
        let creation_hash = Hash32::from_slice(&hash).expect("block hash is 32 bytes");
        let mut state = GroupState::new(group_id.clone(), record.public_encryption_key, creation_hash);
        for member in record.members {
            state.add_member(
                member.user_id,
                MemberKey {
                    user_public_encryption_key: member.user_public_encryption_key,
                    sealed_group_private_encryption_key: member.sealed_group_private_encryption_key,
                },
            );
        }
        if let Some(provisional) = record.provisional_members {
            for entry in provisional {
                let identity = (entry.app_sig_pub.clone(), entry.tanker_sig_pub.clone());
                state.add_provisional(ProvisionalGroupKey {
                    app_sig_pub: entry.app_sig_pub,
                    tanker_sig_pub: entry.tanker_sig_pub,
                    doubly_sealed_group_private_encryption_key: entry.doubly_sealed_group_private_encryption_key,
                });
                self.groups.index_provisional(identity, group_id.clone());
            }
        }
        self.groups.insert(state);
        Ok(())
    }

    fn apply_group_addition(
        &mut self,
        hash: [u8; 32],
        nature: Nature,
        record: group::UserGroupAddition,
    ) -> Result<(), VerifierError> {
        let current_key = {
            let group = self
                .groups
                .get(&record.group_id)
                .ok_or_else(|| invalid(hash, nature, "unknown_group"))?;
            group.signature_public_key.clone()
        };
        if !record.verify_self_signature(&current_key) {
            return Err(invalid(hash, nature, "self_signature"));
        }
        for member in &record.members {
            let user = self
                .users
                .user(&member.user_id)
                .ok_or_else(|| invalid(hash, nature, "unknown_member_user"))?;
            if user.live_public_encryption_key() != member.user_public_encryption_key {
                return Err(invalid(hash, nature, "member_key_mismatch"));
            }
        }

        let new_block_hash = Hash32::from_slice(&hash).expect("block hash is 32 bytes");
        let group_id = record.group_id.clone();
        {
            let group = self.groups.get_mut(&record.group_id).expect("checked above");
            group
                .apply_addition(&record.previous_group_block, new_block_hash)
                .map_err(|_| invalid(hash, nature, "previous_group_block"))?;
            for member in &record.members {
                group.add_member(
                    member.user_id.clone(),
                    MemberKey {
                        user_public_encryption_key: member.user_public_encryption_key.clone(),
                        sealed_group_private_encryption_key: member.sealed_group_private_encryption_key.clone(),
                    },
                );
            }
            if let Some(provisional) = &record.provisional_members {
                for entry in provisional {
                    group.add_provisional(ProvisionalGroupKey {
                        app_sig_pub: entry.app_sig_pub.clone(),
                        tanker_sig_pub: entry.tanker_sig_pub.clone(),
                        doubly_sealed_group_private_encryption_key: entry.doubly_sealed_group_private_encryption_key.clone(),
                    });
                }
            }
        }
        if let Some(provisional) = record.provisional_members {
            for entry in provisional {
                let identity = (entry.app_sig_pub, entry.tanker_sig_pub);
                self.groups.index_provisional(identity, group_id.clone());
            }
        }
        Ok(())
    }

    fn apply_group_update(
        &mut self,
        hash: [u8; 32],
        nature: Nature,
        record: group::UserGroupUpdate,
    ) -> Result<(), VerifierError> {
        let previous_key = {
            let group = self
                .groups
                .get(&record.group_id)
                .ok_or_else(|| invalid(hash, nature, "unknown_group"))?;
            group.signature_public_key.clone()
        };
        if !record.verify_signatures(&previous_key) {
            return Err(invalid(hash, nature, "self_signature"));
        }
        let new_block_hash = Hash32::from_slice(&hash).expect("block hash is 32 bytes");
        let group = self.groups.get_mut(&record.group_id).expect("checked above");
        group
            .apply_rotation(
                &record.previous_key_rotation_block,
                record.public_signature_key,
                record.public_encryption_key,
                new_block_hash,
            )
            .map_err(|_| invalid(hash, nature, "previous_key_rotation_block"))
    }

    fn apply_provisional_claim(
        &mut self,
        hash: [u8; 32],
        nature: Nature,
        authority: Authority,
        record: tc_wire::payloads::provisional::ProvisionalIdentityClaim,
    ) -> Result<(), VerifierError> {
        let identity = (record.app_sig_pub.clone(), record.tanker_sig_pub.clone());
        if self.claimed_provisionals.contains(&identity) {
            return Err(invalid(hash, nature, "already_claimed"));
        }
        let author_user_id = match &authority {
            Authority::Device { user_id, .. } => user_id,
            Authority::Trustchain(_) => return Err(invalid(hash, nature, "trustchain_cannot_claim")),
        };
        if author_user_id != &record.user_id {
            return Err(invalid(hash, nature, "author_not_owner"));
        }
        if !record.verify_ownership_signatures() {
            return Err(invalid(hash, nature, "ownership_signature"));
        }
        self.claimed_provisionals.insert(identity);
        Ok(())
    }
}

fn delegation_data(ephemeral_public_signature_key: &SigPublicKey32, user_id: &Hash32) -> Vec<u8> {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(ephemeral_public_signature_key.as_bytes());
    data.extend_from_slice(user_id.as_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_primitives::seal::{seal_key, EncKeyPair};
    use tc_primitives::sign::SigKeyPair;
    use tc_state::VerificationKey;
    use tc_wire::block::create_block;
    use tc_wire::fields::{EncPublicKey32, Sealed};
    use tc_wire::payloads::device::SealedUserKeyPair;
    use tc_wire::payloads::key_publish::{KeyPublishToRecipient, ResourceId};

    struct Chain {
        trustchain_key: SigKeyPair,
        tcid: Hash32,
        verifier: Verifier,
    }

    fn bootstrap() -> Chain {
        let trustchain_key = SigKeyPair::generate();
        let root = tc_wire::block::create_root_block(&trustchain_key.public());
        let tcid = Hash32::from_slice(&root.hash).unwrap();
        let mut verifier = Verifier::new();
        let block = Block::deserialize_base64(&root.serialized_base64).unwrap();
        verifier.apply(&block).unwrap();
        Chain {
            trustchain_key,
            tcid,
            verifier,
        }
    }

    fn make_device_creation(
        ephemeral: &SigKeyPair,
        user_id: &Hash32,
        delegator: &SigKeyPair,
        device_key: &SigKeyPair,
        device_enc: &EncKeyPair,
        user_key_public: EncPublicKey32,
        user_key_secret: &[u8; 32],
        is_ghost: bool,
    ) -> device::DeviceCreationV3 {
        let delegation_data = delegation_data(&SigPublicKey32(ephemeral.public().0), user_id);
        let delegation_signature = delegator.sign(&delegation_data).0;
        let sealed_private = seal_key(&device_enc.public(), user_key_secret).unwrap();

        let mut record = device::DeviceCreationV3 {
            ephemeral_public_signature_key: SigPublicKey32(ephemeral.public().0),
            user_id: user_id.clone(),
            delegation_signature,
            public_signature_key: SigPublicKey32(device_key.public().0),
            public_encryption_key: EncPublicKey32(device_enc.public().0),
            user_key_pair: SealedUserKeyPair {
                public: user_key_public,
                sealed_private: Sealed::sealed_enc_private_key(&sealed_private).unwrap(),
            },
            is_ghost,
            self_signature: [0u8; 64],
        };
        record.self_signature = device_key.sign(&record.sign_data()).0;
        record
    }

    #[test]
    fn registers_user_via_ghost_then_real_device() {
        let mut chain = bootstrap();
        let user_id = Hash32::from_slice(&[42u8; 32]).unwrap();

        let (_vk, ghost) = VerificationKey::generate();
        let ghost_ephemeral = SigKeyPair::generate();
        let user_enc = EncKeyPair::generate();

        let ghost_record = make_device_creation(
            &ghost_ephemeral,
            &user_id,
            &chain.trustchain_key,
            ghost.signature_key(),
            ghost.encryption_key(),
            EncPublicKey32(user_enc.public().0),
            user_enc.secret_bytes(),
            true,
        );
        let ghost_block = create_block(
            ghost_record.encode(),
            Nature::DeviceCreationV3,
            chain.tcid.clone(),
            chain.tcid.clone(),
            &chain.trustchain_key,
        );
        let decoded = Block::deserialize_base64(&ghost_block.serialized_base64).unwrap();
        chain.verifier.apply(&decoded).unwrap();

        let ghost_device_id = Hash32::from_slice(&ghost_block.hash).unwrap();
        let device_key = SigKeyPair::generate();
        let device_enc = EncKeyPair::generate();
        let device_ephemeral = SigKeyPair::generate();

        let device_record = make_device_creation(
            &device_ephemeral,
            &user_id,
            ghost.signature_key(),
            &device_key,
            &device_enc,
            EncPublicKey32(user_enc.public().0),
            user_enc.secret_bytes(),
            false,
        );
        let device_block = create_block(
            device_record.encode(),
            Nature::DeviceCreationV3,
            chain.tcid.clone(),
            ghost_device_id,
            ghost.signature_key(),
        );
        let decoded = Block::deserialize_base64(&device_block.serialized_base64).unwrap();
        chain.verifier.apply(&decoded).unwrap();

        let user = chain.verifier.users.user(&user_id).unwrap();
        assert_eq!(user.live_public_encryption_key(), EncPublicKey32(user_enc.public().0));
        assert_eq!(user.devices().count(), 2);

        // A key-publish addressed to this user's live key must verify.
        let resource_key = [5u8; 32];
        let sealed = seal_key(&user_enc.public(), &resource_key).unwrap();
        let publish = KeyPublishToRecipient {
            recipient_public_encryption_key: EncPublicKey32(user_enc.public().0),
            resource_id: ResourceId::from_slice(&[1u8; 16]).unwrap(),
            sealed_resource_key: Sealed::sealed_enc_private_key(&sealed).unwrap(),
        };
        let publish_block = create_block(
            publish.encode(),
            Nature::KeyPublishToUser,
            chain.tcid.clone(),
            Hash32::from_slice(&device_block.hash).unwrap(),
            &device_key,
        );
        let decoded = Block::deserialize_base64(&publish_block.serialized_base64).unwrap();
        chain.verifier.apply(&decoded).unwrap();
    }

    #[test]
    fn tampered_delegation_signature_is_rejected() {
        let mut chain = bootstrap();
        let user_id = Hash32::from_slice(&[7u8; 32]).unwrap();
        let (_vk, ghost) = VerificationKey::generate();
        let ghost_ephemeral = SigKeyPair::generate();
        let user_enc = EncKeyPair::generate();
        let impostor_key = SigKeyPair::generate();

        // Signed by an unrelated key instead of the trustchain key.
        let mut record = make_device_creation(
            &ghost_ephemeral,
            &user_id,
            &impostor_key,
            ghost.signature_key(),
            ghost.encryption_key(),
            EncPublicKey32(user_enc.public().0),
            user_enc.secret_bytes(),
            true,
        );
        record.self_signature = ghost.signature_key().sign(&record.sign_data()).0;

        let block = create_block(
            record.encode(),
            Nature::DeviceCreationV3,
            chain.tcid.clone(),
            chain.tcid.clone(),
            &chain.trustchain_key,
        );
        let decoded = Block::deserialize_base64(&block.serialized_base64).unwrap();
        assert!(chain.verifier.apply(&decoded).is_err());
    }
}
