//! Group state (C7): a reducer folding user_group_creation / addition /
//! update blocks into current membership and key material.

use std::collections::HashMap;

use tc_wire::fields::{EncPublicKey32, Hash32, Sealed, SigPublicKey32};

use crate::error::StateError;

/// A group member's copy of the group's private encryption key, sealed
/// to that member's current user public encryption key.
#[derive(Debug, Clone)]
pub struct MemberKey {
    pub user_public_encryption_key: EncPublicKey32,
    pub sealed_group_private_encryption_key: Sealed,
}

/// An unclaimed provisional identity's copy of the group's private
/// encryption key, sealed twice (app-enc, then tanker-enc).
#[derive(Debug, Clone)]
pub struct ProvisionalGroupKey {
    pub app_sig_pub: SigPublicKey32,
    pub tanker_sig_pub: SigPublicKey32,
    pub doubly_sealed_group_private_encryption_key: Sealed,
}

/// `(app_sig_pub, tanker_sig_pub)` — the secondary-index key shared by
/// every group a not-yet-claimed provisional belongs to.
pub type ProvisionalIdentityKey = (SigPublicKey32, SigPublicKey32);

#[derive(Debug, Clone)]
pub struct GroupState {
    /// The group's initial public signature key — its permanent
    /// identifier, even across key rotations.
    pub group_id: SigPublicKey32,
    pub signature_public_key: SigPublicKey32,
    pub encryption_public_key: EncPublicKey32,
    /// Hash of the most recently applied group block (creation,
    /// addition or update) — `previous_group_block` in the next
    /// addition must match this.
    pub last_group_block: Hash32,
    /// Hash of the most recently applied *update* (key-rotation) block,
    /// or the creation block if no rotation has happened yet.
    pub last_key_rotation_block: Hash32,
    members: HashMap<Hash32, MemberKey>,
    provisional: HashMap<ProvisionalIdentityKey, ProvisionalGroupKey>,
}

impl GroupState {
    pub fn new(
        group_id: SigPublicKey32,
        encryption_public_key: EncPublicKey32,
        creation_block: Hash32,
    ) -> Self {
        Self {
            signature_public_key: group_id.clone(),
            group_id,
            encryption_public_key,
            last_group_block: creation_block.clone(),
            last_key_rotation_block: creation_block,
            members: HashMap::new(),
            provisional: HashMap::new(),
        }
    }

    pub fn add_member(&mut self, user_id: Hash32, key: MemberKey) {
        self.members.insert(user_id, key);
    }

    pub fn member(&self, user_id: &Hash32) -> Option<&MemberKey> {
        self.members.get(user_id)
    }

    pub fn is_member(&self, user_id: &Hash32) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Hash32> {
        self.members.keys()
    }

    pub fn add_provisional(&mut self, key: ProvisionalGroupKey) {
        let index = (key.app_sig_pub.clone(), key.tanker_sig_pub.clone());
        self.provisional.insert(index, key);
    }

    /// Called when a provisional identity is claimed: moves its group
    /// key into real membership and removes the provisional entry, per
    /// group. The caller unseals the doubly-sealed key with the
    /// provisional's private material and reseals it to the claiming
    /// user before calling this.
    pub fn claim_provisional(&mut self, identity: &ProvisionalIdentityKey, user_id: Hash32, key: MemberKey) {
        self.provisional.remove(identity);
        self.members.insert(user_id, key);
    }

    pub fn provisional_entries_for(&self, identity: &ProvisionalIdentityKey) -> Option<&ProvisionalGroupKey> {
        self.provisional.get(identity)
    }

    pub fn apply_addition(&mut self, previous_group_block: &Hash32, new_block_hash: Hash32) -> Result<(), StateError> {
        if previous_group_block != &self.last_group_block {
            return Err(StateError::UnknownGroup);
        }
        self.last_group_block = new_block_hash;
        Ok(())
    }

    pub fn apply_rotation(
        &mut self,
        previous_key_rotation_block: &Hash32,
        new_signature_public_key: SigPublicKey32,
        new_encryption_public_key: EncPublicKey32,
        new_block_hash: Hash32,
    ) -> Result<(), StateError> {
        if previous_key_rotation_block != &self.last_key_rotation_block {
            return Err(StateError::UnknownGroup);
        }
        self.signature_public_key = new_signature_public_key;
        self.encryption_public_key = new_encryption_public_key;
        self.last_group_block = new_block_hash.clone();
        self.last_key_rotation_block = new_block_hash;
        Ok(())
    }
}

/// All groups known to this session, keyed by `group_id`. A secondary
/// index over provisional identity keys lets the claim flow find every
/// group that needs rewiring in one lookup instead of scanning all
/// groups.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    groups: HashMap<SigPublicKey32, GroupState>,
    provisional_index: HashMap<ProvisionalIdentityKey, Vec<SigPublicKey32>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: GroupState) {
        self.groups.insert(group.group_id.clone(), group);
    }

    pub fn get(&self, group_id: &SigPublicKey32) -> Option<&GroupState> {
        self.groups.get(group_id)
    }

    pub fn get_mut(&mut self, group_id: &SigPublicKey32) -> Option<&mut GroupState> {
        self.groups.get_mut(group_id)
    }

    pub fn index_provisional(&mut self, identity: ProvisionalIdentityKey, group_id: SigPublicKey32) {
        self.provisional_index.entry(identity).or_default().push(group_id);
    }

    /// Every group holding a provisional entry for `identity`, used to
    /// rewire all of them when that identity is claimed.
    pub fn groups_for_provisional(&self, identity: &ProvisionalIdentityKey) -> &[SigPublicKey32] {
        self.provisional_index
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all_states(&self) -> impl Iterator<Item = &GroupState> {
        self.groups.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig_key(b: u8) -> SigPublicKey32 {
        SigPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    fn enc_key(b: u8) -> EncPublicKey32 {
        EncPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    fn hash(b: u8) -> Hash32 {
        Hash32::from_slice(&[b; 32]).unwrap()
    }

    #[test]
    fn addition_requires_matching_previous_block() {
        let mut group = GroupState::new(sig_key(1), enc_key(2), hash(3));
        assert!(group.apply_addition(&hash(99), hash(4)).is_err());
        group.apply_addition(&hash(3), hash(4)).unwrap();
        assert_eq!(group.last_group_block, hash(4));
    }

    #[test]
    fn rotation_updates_keys_and_rotation_head() {
        let mut group = GroupState::new(sig_key(1), enc_key(2), hash(3));
        group
            .apply_rotation(&hash(3), sig_key(10), enc_key(11), hash(20))
            .unwrap();
        assert_eq!(group.signature_public_key, sig_key(10));
        assert_eq!(group.encryption_public_key, enc_key(11));
        assert_eq!(group.last_key_rotation_block, hash(20));
        // group_id never changes across rotations
        assert_eq!(group.group_id, sig_key(1));
    }

    #[test]
    fn claiming_provisional_moves_entry_to_membership() {
        let mut group = GroupState::new(sig_key(1), enc_key(2), hash(3));
        let identity = (sig_key(5), sig_key(6));
        group.add_provisional(ProvisionalGroupKey {
            app_sig_pub: identity.0.clone(),
            tanker_sig_pub: identity.1.clone(),
            doubly_sealed_group_private_encryption_key: Sealed(vec![0u8; 128]),
        });
        assert!(group.provisional_entries_for(&identity).is_some());

        group.claim_provisional(
            &identity,
            hash(42),
            MemberKey {
                user_public_encryption_key: enc_key(7),
                sealed_group_private_encryption_key: Sealed(vec![0u8; 80]),
            },
        );
        assert!(group.provisional_entries_for(&identity).is_none());
        assert!(group.is_member(&hash(42)));
    }
}
