//! Local user state (C6): the device tree and the sequence of user
//! encryption key rotations. Populated by replaying device_creation and
//! device_revocation blocks through the verifier; this module only
//! folds already-validated blocks into state, it does not itself
//! validate cross-block consistency (that's `tc-verifier`'s job).

use std::collections::HashMap;

use tc_wire::fields::{EncPublicKey32, Hash32, SigPublicKey32};

use crate::error::StateError;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: Hash32,
    pub user_id: Hash32,
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub is_ghost: bool,
    /// Index (in block-application order) at which this device was
    /// revoked, if ever.
    pub revoked_at: Option<u64>,
}

impl DeviceInfo {
    pub fn is_revoked_at(&self, index: u64) -> bool {
        matches!(self.revoked_at, Some(at) if at <= index)
    }
}

/// One entry in a user's key-rotation history: the user public
/// encryption key live as of `index`, one appended on user creation and
/// one on every device_revocation_v2 (key rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserKeyEntry {
    pub index: u64,
    pub public_encryption_key: EncPublicKey32,
}

#[derive(Debug, Clone)]
pub struct UserState {
    pub user_id: Hash32,
    key_history: Vec<UserKeyEntry>,
    devices: HashMap<Hash32, DeviceInfo>,
}

impl UserState {
    pub fn new(user_id: Hash32, first_public_encryption_key: EncPublicKey32, created_at: u64) -> Self {
        Self {
            user_id,
            key_history: vec![UserKeyEntry {
                index: created_at,
                public_encryption_key: first_public_encryption_key,
            }],
            devices: HashMap::new(),
        }
    }

    /// The currently live user public encryption key — the last entry
    /// of the rotation history.
    pub fn live_public_encryption_key(&self) -> EncPublicKey32 {
        self.key_history
            .last()
            .expect("key_history always has at least the creation entry")
            .public_encryption_key
            .clone()
    }

    pub fn rotate_public_encryption_key(&mut self, new_key: EncPublicKey32, at_index: u64) {
        self.key_history.push(UserKeyEntry {
            index: at_index,
            public_encryption_key: new_key,
        });
    }

    pub fn key_history(&self) -> &[UserKeyEntry] {
        &self.key_history
    }

    pub fn add_device(&mut self, device: DeviceInfo) -> Result<(), StateError> {
        if self.devices.contains_key(&device.device_id) {
            return Err(StateError::DuplicateDevice);
        }
        self.devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    pub fn device(&self, device_id: &Hash32) -> Option<&DeviceInfo> {
        self.devices.get(device_id)
    }

    pub fn device_mut(&mut self, device_id: &Hash32) -> Option<&mut DeviceInfo> {
        self.devices.get_mut(device_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.values()
    }

    pub fn revoke_device(&mut self, device_id: &Hash32, at_index: u64) -> Result<(), StateError> {
        let device = self
            .devices
            .get_mut(device_id)
            .ok_or_else(|| StateError::UnknownDevice(hex::encode(device_id.as_bytes())))?;
        if device.revoked_at.is_some() {
            return Err(StateError::AlreadyRevoked);
        }
        device.revoked_at = Some(at_index);
        Ok(())
    }

    pub fn non_revoked_devices(&self, at_index: u64) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.values().filter(move |d| !d.is_revoked_at(at_index))
    }

    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }
}

/// All users known to this session, keyed by user id. Devices are also
/// indexed by device id so the verifier can resolve `author` directly
/// without knowing the owning user up front.
#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: HashMap<Hash32, UserState>,
    device_owner: HashMap<Hash32, Hash32>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&mut self, state: UserState) {
        self.users.insert(state.user_id.clone(), state);
    }

    pub fn user(&self, user_id: &Hash32) -> Option<&UserState> {
        self.users.get(user_id)
    }

    pub fn user_mut(&mut self, user_id: &Hash32) -> Option<&mut UserState> {
        self.users.get_mut(user_id)
    }

    pub fn register_device(&mut self, user_id: Hash32, device: DeviceInfo) -> Result<(), StateError> {
        self.device_owner.insert(device.device_id.clone(), user_id.clone());
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StateError::UnknownUser(hex::encode(user_id.as_bytes())))?;
        user.add_device(device)
    }

    pub fn device(&self, device_id: &Hash32) -> Option<&DeviceInfo> {
        let owner = self.device_owner.get(device_id)?;
        self.users.get(owner)?.device(device_id)
    }

    pub fn owner_of(&self, device_id: &Hash32) -> Option<&Hash32> {
        self.device_owner.get(device_id)
    }

    pub fn all_states(&self) -> impl Iterator<Item = &UserState> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> Hash32 {
        Hash32::from_slice(&[byte; 32]).unwrap()
    }

    fn enc_key(byte: u8) -> EncPublicKey32 {
        EncPublicKey32::from_slice(&[byte; 32]).unwrap()
    }

    fn sig_key(byte: u8) -> SigPublicKey32 {
        SigPublicKey32::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn key_rotation_updates_live_key() {
        let mut user = UserState::new(hash(1), enc_key(2), 0);
        assert_eq!(user.live_public_encryption_key(), enc_key(2));
        user.rotate_public_encryption_key(enc_key(3), 5);
        assert_eq!(user.live_public_encryption_key(), enc_key(3));
        assert_eq!(user.key_history().len(), 2);
    }

    #[test]
    fn revoking_twice_fails() {
        let mut user = UserState::new(hash(1), enc_key(2), 0);
        let device = DeviceInfo {
            device_id: hash(9),
            user_id: hash(1),
            public_signature_key: sig_key(4),
            public_encryption_key: enc_key(5),
            is_ghost: false,
            revoked_at: None,
        };
        user.add_device(device).unwrap();
        user.revoke_device(&hash(9), 10).unwrap();
        assert!(matches!(user.revoke_device(&hash(9), 11), Err(StateError::AlreadyRevoked)));
        assert!(user.device(&hash(9)).unwrap().is_revoked_at(10));
        assert!(!user.device(&hash(9)).unwrap().is_revoked_at(9));
    }

    #[test]
    fn registry_resolves_device_owner() {
        let mut registry = UserRegistry::new();
        registry.insert_user(UserState::new(hash(1), enc_key(2), 0));
        registry
            .register_device(
                hash(1),
                DeviceInfo {
                    device_id: hash(9),
                    user_id: hash(1),
                    public_signature_key: sig_key(4),
                    public_encryption_key: enc_key(5),
                    is_ghost: false,
                    revoked_at: None,
                },
            )
            .unwrap();
        assert_eq!(registry.owner_of(&hash(9)), Some(&hash(1)));
        assert!(registry.device(&hash(9)).is_some());
    }
}
