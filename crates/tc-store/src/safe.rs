//! The key safe: the only thing in this crate that knows what's inside
//! a row. Every private key is AEAD-encrypted under the *user secret*
//! with associated data binding the record's identity, so a replayed
//! or rolled-back ciphertext can't be substituted for a different
//! record even though the backend itself has no notion of integrity
//! across rows.
//!
//! Writes are idempotent per §4.9: re-saving an identical key pair is a
//! no-op, and a public-only write never downgrades a row that already
//! holds a full pair.

use tc_primitives::aead;
use tc_primitives::secret::UserSecret;
use tc_wire::fields::{EncPublicKey32, Hash32, SigPublicKey32};

use crate::backend::KeyValueBackend;
use crate::error::StoreError;

pub const TABLE_DEVICE_KEYS: &str = "device_keys";
pub const TABLE_USER_KEYS: &str = "user_keys";
pub const TABLE_GROUP_ENCRYPTION_KEY_PAIRS: &str = "group_encryption_key_pairs";
pub const TABLE_GROUPS_PENDING_ENCRYPTION_KEYS: &str = "groups_pending_encryption_keys";
pub const TABLE_PROVISIONAL_USER_KEYS: &str = "provisional_user_keys";
pub const TABLE_RESOURCE_KEYS: &str = "resource_keys";

const PRIVATE_SIGNATURE_KEY_SIZE: usize = 64;
const PRIVATE_ENCRYPTION_KEY_SIZE: usize = 32;

/// Record kind tag for `group_encryption_key_pairs`: a row can hold
/// just the group's current public key (before this device has seen a
/// key_publish addressed to it) or the full pair. A public write must
/// never clobber an existing full row.
const GROUP_RECORD_PUBLIC_ONLY: u8 = 0;
const GROUP_RECORD_FULL: u8 = 1;
/// A full record that additionally carries the group's private
/// signature key — held only by the member who created the group or
/// who received it via a rotation this device authored. `put_group_full`
/// (no signature key) must never downgrade one of these.
const GROUP_RECORD_FULL_WITH_SIG: u8 = 2;

/// Key under `device_keys` reserved for [`KeySafe::put_self_device_id`] —
/// not a valid hex-encoded device id, so it can never collide with one.
const SELF_DEVICE_MARKER_KEY: &str = "__self__";

pub struct KeySafe<B: KeyValueBackend> {
    backend: B,
    user_secret: UserSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceKeyPair {
    pub public_signature_key: SigPublicKey32,
    pub public_encryption_key: EncPublicKey32,
    pub private_signature_key: [u8; PRIVATE_SIGNATURE_KEY_SIZE],
    pub private_encryption_key: [u8; PRIVATE_ENCRYPTION_KEY_SIZE],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKeyRecord {
    PublicOnly(EncPublicKey32),
    Full {
        public: EncPublicKey32,
        private: [u8; PRIVATE_ENCRYPTION_KEY_SIZE],
        /// Present only for a member who also holds the group's
        /// private signature key (the creator, or a member who was
        /// handed it directly) — needed to author `user_group_update`.
        signature_private: Option<[u8; PRIVATE_SIGNATURE_KEY_SIZE]>,
    },
}

impl GroupKeyRecord {
    fn public(&self) -> &EncPublicKey32 {
        match self {
            GroupKeyRecord::PublicOnly(public) => public,
            GroupKeyRecord::Full { public, .. } => public,
        }
    }
}

impl<B: KeyValueBackend> KeySafe<B> {
    pub fn new(backend: B, user_secret: UserSecret) -> Self {
        Self { backend, user_secret }
    }

    fn seal_record(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        Ok(aead::encrypt(self.user_secret.as_bytes(), plaintext, aad)?)
    }

    fn open_record(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, StoreError> {
        Ok(aead::decrypt(self.user_secret.as_bytes(), sealed, aad)?.to_vec())
    }

    // ---- device_keys --------------------------------------------------

    /// Idempotent: a device's key pair never changes once generated, so
    /// a second write for the same `device_id` is a no-op.
    pub async fn put_device_key_pair(&self, device_id: &Hash32, pair: &DeviceKeyPair) -> Result<(), StoreError> {
        let key = hex::encode(device_id.as_bytes());
        if self.backend.get(TABLE_DEVICE_KEYS, &key).await?.is_some() {
            return Ok(());
        }
        let mut plaintext = Vec::with_capacity(PRIVATE_SIGNATURE_KEY_SIZE + PRIVATE_ENCRYPTION_KEY_SIZE);
        plaintext.extend_from_slice(&pair.private_signature_key);
        plaintext.extend_from_slice(&pair.private_encryption_key);

        let aad = device_key_aad(device_id, &pair.public_signature_key, &pair.public_encryption_key);
        let sealed = self.seal_record(&aad, &plaintext)?;

        let mut row = Vec::with_capacity(64 + sealed.len());
        row.extend_from_slice(pair.public_signature_key.as_bytes());
        row.extend_from_slice(pair.public_encryption_key.as_bytes());
        row.extend_from_slice(&sealed);
        self.backend.put(TABLE_DEVICE_KEYS, &key, row).await
    }

    pub async fn get_device_key_pair(&self, device_id: &Hash32) -> Result<Option<DeviceKeyPair>, StoreError> {
        let key = hex::encode(device_id.as_bytes());
        let Some(row) = self.backend.get(TABLE_DEVICE_KEYS, &key).await? else {
            return Ok(None);
        };
        if row.len() < 64 {
            return Err(StoreError::Corrupt("device_keys row shorter than its public-key prefix"));
        }
        let public_signature_key = SigPublicKey32::from_slice(&row[0..32])?;
        let public_encryption_key = EncPublicKey32::from_slice(&row[32..64])?;
        let aad = device_key_aad(device_id, &public_signature_key, &public_encryption_key);
        let plaintext = self.open_record(&aad, &row[64..])?;
        if plaintext.len() != PRIVATE_SIGNATURE_KEY_SIZE + PRIVATE_ENCRYPTION_KEY_SIZE {
            return Err(StoreError::Corrupt("device_keys plaintext has the wrong length"));
        }
        let mut private_signature_key = [0u8; PRIVATE_SIGNATURE_KEY_SIZE];
        private_signature_key.copy_from_slice(&plaintext[..PRIVATE_SIGNATURE_KEY_SIZE]);
        let mut private_encryption_key = [0u8; PRIVATE_ENCRYPTION_KEY_SIZE];
        private_encryption_key.copy_from_slice(&plaintext[PRIVATE_SIGNATURE_KEY_SIZE..]);

        Ok(Some(DeviceKeyPair {
            public_signature_key,
            public_encryption_key,
            private_signature_key,
            private_encryption_key,
        }))
    }

    // ---- user_keys (rotation history) ----------------------------------

    /// User key rotations are append-only, keyed by their index in the
    /// rotation history; writing the same index twice with the same key
    /// is idempotent (last writer wins, but always the same bytes).
    pub async fn put_user_key(&self, user_id: &Hash32, index: u64, public: &EncPublicKey32, private: &[u8; 32]) -> Result<(), StoreError> {
        let key = format!("{}:{index}", hex::encode(user_id.as_bytes()));
        let aad = user_key_aad(user_id, index, public);
        let sealed = self.seal_record(&aad, private)?;
        let mut row = Vec::with_capacity(32 + sealed.len());
        row.extend_from_slice(public.as_bytes());
        row.extend_from_slice(&sealed);
        self.backend.put(TABLE_USER_KEYS, &key, row).await
    }

    pub async fn get_user_key(&self, user_id: &Hash32, index: u64) -> Result<Option<(EncPublicKey32, [u8; 32])>, StoreError> {
        let key = format!("{}:{index}", hex::encode(user_id.as_bytes()));
        let Some(row) = self.backend.get(TABLE_USER_KEYS, &key).await? else {
            return Ok(None);
        };
        if row.len() < 32 {
            return Err(StoreError::Corrupt("user_keys row shorter than its public-key prefix"));
        }
        let public = EncPublicKey32::from_slice(&row[..32])?;
        let aad = user_key_aad(user_id, index, &public);
        let plaintext = self.open_record(&aad, &row[32..])?;
        let mut private = [0u8; 32];
        private.copy_from_slice(
            plaintext
                .get(..32)
                .ok_or(StoreError::Corrupt("user_keys plaintext has the wrong length"))?,
        );
        Ok(Some((public, private)))
    }

    // ---- group_encryption_key_pairs (no-downgrade) ----------------------

    /// Store the group's current public key. A no-op if a full pair is
    /// already on file — a public-only write must never erase the
    /// private half this device already holds.
    pub async fn put_group_public(&self, group_id: &SigPublicKey32, public: &EncPublicKey32) -> Result<(), StoreError> {
        if let Some(existing) = self.get_group_key(group_id).await? {
            if matches!(existing, GroupKeyRecord::Full { .. }) {
                return Ok(());
            }
        }
        self.store_group_record(group_id, &GroupKeyRecord::PublicOnly(public.clone())).await
    }

    /// Store the group's full key pair, always overwriting any prior
    /// public-only record. A previously stored signature private key is
    /// read back and preserved — this is also the path non-admin
    /// members take when they unseal a group via a key_publish, and it
    /// must never erase the creator's admin key.
    pub async fn put_group_full(&self, group_id: &SigPublicKey32, public: &EncPublicKey32, private: &[u8; 32]) -> Result<(), StoreError> {
        let signature_private = match self.get_group_key(group_id).await? {
            Some(GroupKeyRecord::Full { signature_private, .. }) => signature_private,
            _ => None,
        };
        self.store_group_record(
            group_id,
            &GroupKeyRecord::Full {
                public: public.clone(),
                private: *private,
                signature_private,
            },
        )
        .await
    }

    /// Store the group's full encryption pair together with its private
    /// signature key — the shape a group's creator (or the recipient of
    /// a direct admin handoff) holds, needed to author
    /// `updateGroupMembers`.
    pub async fn put_group_full_with_signature_key(
        &self,
        group_id: &SigPublicKey32,
        public: &EncPublicKey32,
        private: &[u8; 32],
        signature_private: &[u8; PRIVATE_SIGNATURE_KEY_SIZE],
    ) -> Result<(), StoreError> {
        self.store_group_record(
            group_id,
            &GroupKeyRecord::Full {
                public: public.clone(),
                private: *private,
                signature_private: Some(*signature_private),
            },
        )
        .await
    }

    async fn store_group_record(&self, group_id: &SigPublicKey32, record: &GroupKeyRecord) -> Result<(), StoreError> {
        let key = hex::encode(group_id.as_bytes());
        let public = record.public();
        let row = match record {
            GroupKeyRecord::PublicOnly(public) => {
                let mut row = vec![GROUP_RECORD_PUBLIC_ONLY];
                row.extend_from_slice(public.as_bytes());
                row
            }
            GroupKeyRecord::Full {
                public,
                private,
                signature_private: None,
            } => {
                let aad = group_key_aad(group_id, public);
                let sealed = self.seal_record(&aad, private)?;
                let mut row = vec![GROUP_RECORD_FULL];
                row.extend_from_slice(public.as_bytes());
                row.extend_from_slice(&sealed);
                row
            }
            GroupKeyRecord::Full {
                public,
                private,
                signature_private: Some(signature_private),
            } => {
                let aad = group_key_aad(group_id, public);
                let mut plaintext = Vec::with_capacity(PRIVATE_ENCRYPTION_KEY_SIZE + PRIVATE_SIGNATURE_KEY_SIZE);
                plaintext.extend_from_slice(private);
                plaintext.extend_from_slice(signature_private);
                let sealed = self.seal_record(&aad, &plaintext)?;
                let mut row = vec![GROUP_RECORD_FULL_WITH_SIG];
                row.extend_from_slice(public.as_bytes());
                row.extend_from_slice(&sealed);
                row
            }
        };
        let _ = public;
        self.backend.put(TABLE_GROUP_ENCRYPTION_KEY_PAIRS, &key, row).await
    }

    pub async fn get_group_key(&self, group_id: &SigPublicKey32) -> Result<Option<GroupKeyRecord>, StoreError> {
        let key = hex::encode(group_id.as_bytes());
        let Some(row) = self.backend.get(TABLE_GROUP_ENCRYPTION_KEY_PAIRS, &key).await? else {
            return Ok(None);
        };
        if row.is_empty() {
            return Err(StoreError::Corrupt("group_encryption_key_pairs row is empty"));
        }
        let tag = row[0];
        let public = EncPublicKey32::from_slice(row.get(1..33).ok_or(StoreError::Corrupt("group_encryption_key_pairs row truncated"))?)?;
        match tag {
            GROUP_RECORD_PUBLIC_ONLY => Ok(Some(GroupKeyRecord::PublicOnly(public))),
            GROUP_RECORD_FULL => {
                let aad = group_key_aad(group_id, &public);
                let plaintext = self.open_record(&aad, &row[33..])?;
                let mut private = [0u8; 32];
                private.copy_from_slice(
                    plaintext
                        .get(..32)
                        .ok_or(StoreError::Corrupt("group_encryption_key_pairs plaintext has the wrong length"))?,
                );
                Ok(Some(GroupKeyRecord::Full {
                    public,
                    private,
                    signature_private: None,
                }))
            }
            GROUP_RECORD_FULL_WITH_SIG => {
                let aad = group_key_aad(group_id, &public);
                let plaintext = self.open_record(&aad, &row[33..])?;
                if plaintext.len() != PRIVATE_ENCRYPTION_KEY_SIZE + PRIVATE_SIGNATURE_KEY_SIZE {
                    return Err(StoreError::Corrupt("group_encryption_key_pairs plaintext has the wrong length"));
                }
                let mut private = [0u8; 32];
                private.copy_from_slice(&plaintext[..PRIVATE_ENCRYPTION_KEY_SIZE]);
                let mut signature_private = [0u8; PRIVATE_SIGNATURE_KEY_SIZE];
                signature_private.copy_from_slice(&plaintext[PRIVATE_ENCRYPTION_KEY_SIZE..]);
                Ok(Some(GroupKeyRecord::Full {
                    public,
                    private,
                    signature_private: Some(signature_private),
                }))
            }
            _ => Err(StoreError::Corrupt("unknown group_encryption_key_pairs record tag")),
        }
    }

    // ---- resource_keys ---------------------------------------------------

    /// Idempotent: saving the same resource id's key twice is a no-op.
    pub async fn put_resource_key(&self, resource_id: &[u8; 16], key: &[u8; 32]) -> Result<(), StoreError> {
        let row_key = hex::encode(resource_id);
        if self.backend.get(TABLE_RESOURCE_KEYS, &row_key).await?.is_some() {
            return Ok(());
        }
        let aad = resource_key_aad(resource_id);
        let sealed = self.seal_record(&aad, key)?;
        self.backend.put(TABLE_RESOURCE_KEYS, &row_key, sealed).await
    }

    pub async fn get_resource_key(&self, resource_id: &[u8; 16]) -> Result<Option<[u8; 32]>, StoreError> {
        let row_key = hex::encode(resource_id);
        let Some(sealed) = self.backend.get(TABLE_RESOURCE_KEYS, &row_key).await? else {
            return Ok(None);
        };
        let aad = resource_key_aad(resource_id);
        let plaintext = self.open_record(&aad, &sealed)?;
        let mut key = [0u8; 32];
        key.copy_from_slice(
            plaintext
                .get(..32)
                .ok_or(StoreError::Corrupt("resource_keys plaintext has the wrong length"))?,
        );
        Ok(Some(key))
    }

    // ---- provisional_user_keys -------------------------------------------

    pub async fn put_provisional_user_key(
        &self,
        app_sig_pub: &SigPublicKey32,
        tanker_sig_pub: &SigPublicKey32,
        app_enc_priv: &[u8; 32],
        tanker_enc_priv: &[u8; 32],
    ) -> Result<(), StoreError> {
        let row_key = provisional_key(app_sig_pub, tanker_sig_pub);
        let aad = provisional_key_aad(app_sig_pub, tanker_sig_pub);
        let mut plaintext = Vec::with_capacity(64);
        plaintext.extend_from_slice(app_enc_priv);
        plaintext.extend_from_slice(tanker_enc_priv);
        let sealed = self.seal_record(&aad, &plaintext)?;
        self.backend.put(TABLE_PROVISIONAL_USER_KEYS, &row_key, sealed).await
    }

    pub async fn get_provisional_user_key(
        &self,
        app_sig_pub: &SigPublicKey32,
        tanker_sig_pub: &SigPublicKey32,
    ) -> Result<Option<([u8; 32], [u8; 32])>, StoreError> {
        let row_key = provisional_key(app_sig_pub, tanker_sig_pub);
        let Some(sealed) = self.backend.get(TABLE_PROVISIONAL_USER_KEYS, &row_key).await? else {
            return Ok(None);
        };
        let aad = provisional_key_aad(app_sig_pub, tanker_sig_pub);
        let plaintext = self.open_record(&aad, &sealed)?;
        if plaintext.len() != 64 {
            return Err(StoreError::Corrupt("provisional_user_keys plaintext has the wrong length"));
        }
        let mut app = [0u8; 32];
        let mut tanker = [0u8; 32];
        app.copy_from_slice(&plaintext[..32]);
        tanker.copy_from_slice(&plaintext[32..]);
        Ok(Some((app, tanker)))
    }

    // ---- local bookkeeping -------------------------------------------------

    /// Not one of §4.9's six tables: a single marker row, private to
    /// this store, recording which `device_keys` entry is *this*
    /// device. Plaintext — a device id carries no secret.
    pub async fn put_self_device_id(&self, device_id: &Hash32) -> Result<(), StoreError> {
        self.backend.put(TABLE_DEVICE_KEYS, SELF_DEVICE_MARKER_KEY, device_id.as_bytes().to_vec()).await
    }

    pub async fn get_self_device_id(&self) -> Result<Option<Hash32>, StoreError> {
        let Some(bytes) = self.backend.get(TABLE_DEVICE_KEYS, SELF_DEVICE_MARKER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(Hash32::from_slice(&bytes)?))
    }

    pub async fn put_self_user_id(&self, user_id: &Hash32) -> Result<(), StoreError> {
        self.backend.put(TABLE_USER_KEYS, SELF_DEVICE_MARKER_KEY, user_id.as_bytes().to_vec()).await
    }

    pub async fn get_self_user_id(&self) -> Result<Option<Hash32>, StoreError> {
        let Some(bytes) = self.backend.get(TABLE_USER_KEYS, SELF_DEVICE_MARKER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(Hash32::from_slice(&bytes)?))
    }

    /// Read the self-device marker through a bare backend reference,
    /// without a user secret. Both marker rows are plaintext (see
    /// above), so this lets a caller (the session orchestrator) learn
    /// whether a device has already registered locally before it has
    /// derived the user secret needed to unlock everything else.
    pub async fn peek_self_device_id(backend: &B) -> Result<Option<Hash32>, StoreError> {
        let Some(bytes) = backend.get(TABLE_DEVICE_KEYS, SELF_DEVICE_MARKER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(Hash32::from_slice(&bytes)?))
    }

    pub async fn peek_self_user_id(backend: &B) -> Result<Option<Hash32>, StoreError> {
        let Some(bytes) = backend.get(TABLE_USER_KEYS, SELF_DEVICE_MARKER_KEY).await? else {
            return Ok(None);
        };
        Ok(Some(Hash32::from_slice(&bytes)?))
    }

    // ---- groups_pending_encryption_keys -----------------------------------

    /// A group key rotation this device hasn't yet seen a key_publish
    /// for: the old public key it should keep decrypting against until
    /// the rotation's key_publish arrives.
    pub async fn put_pending_group_key(&self, group_id: &SigPublicKey32, public: &EncPublicKey32, private: &[u8; 32]) -> Result<(), StoreError> {
        let key = hex::encode(group_id.as_bytes());
        let aad = group_key_aad(group_id, public);
        let sealed = self.seal_record(&aad, private)?;
        let mut row = Vec::with_capacity(32 + sealed.len());
        row.extend_from_slice(public.as_bytes());
        row.extend_from_slice(&sealed);
        self.backend.put(TABLE_GROUPS_PENDING_ENCRYPTION_KEYS, &key, row).await
    }

    pub async fn take_pending_group_key(&self, group_id: &SigPublicKey32) -> Result<Option<(EncPublicKey32, [u8; 32])>, StoreError> {
        let key = hex::encode(group_id.as_bytes());
        let Some(row) = self.backend.get(TABLE_GROUPS_PENDING_ENCRYPTION_KEYS, &key).await? else {
            return Ok(None);
        };
        if row.len() < 32 {
            return Err(StoreError::Corrupt("groups_pending_encryption_keys row truncated"));
        }
        let public = EncPublicKey32::from_slice(&row[..32])?;
        let aad = group_key_aad(group_id, &public);
        let plaintext = self.open_record(&aad, &row[32..])?;
        let mut private = [0u8; 32];
        private.copy_from_slice(
            plaintext
                .get(..32)
                .ok_or(StoreError::Corrupt("groups_pending_encryption_keys plaintext has the wrong length"))?,
        );
        self.backend.delete(TABLE_GROUPS_PENDING_ENCRYPTION_KEYS, &key).await?;
        Ok(Some((public, private)))
    }
}

fn device_key_aad(device_id: &Hash32, public_signature_key: &SigPublicKey32, public_encryption_key: &EncPublicKey32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(TABLE_DEVICE_KEYS.len() + 96);
    aad.extend_from_slice(TABLE_DEVICE_KEYS.as_bytes());
    aad.extend_from_slice(device_id.as_bytes());
    aad.extend_from_slice(public_signature_key.as_bytes());
    aad.extend_from_slice(public_encryption_key.as_bytes());
    aad
}

fn user_key_aad(user_id: &Hash32, index: u64, public: &EncPublicKey32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(TABLE_USER_KEYS.len() + 32 + 8 + 32);
    aad.extend_from_slice(TABLE_USER_KEYS.as_bytes());
    aad.extend_from_slice(user_id.as_bytes());
    aad.extend_from_slice(&index.to_le_bytes());
    aad.extend_from_slice(public.as_bytes());
    aad
}

fn group_key_aad(group_id: &SigPublicKey32, public: &EncPublicKey32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(TABLE_GROUP_ENCRYPTION_KEY_PAIRS.len() + 64);
    aad.extend_from_slice(TABLE_GROUP_ENCRYPTION_KEY_PAIRS.as_bytes());
    aad.extend_from_slice(group_id.as_bytes());
    aad.extend_from_slice(public.as_bytes());
    aad
}

fn resource_key_aad(resource_id: &[u8; 16]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(TABLE_RESOURCE_KEYS.len() + 16);
    aad.extend_from_slice(TABLE_RESOURCE_KEYS.as_bytes());
    aad.extend_from_slice(resource_id);
    aad
}

fn provisional_key(app_sig_pub: &SigPublicKey32, tanker_sig_pub: &SigPublicKey32) -> String {
    format!("{}:{}", hex::encode(app_sig_pub.as_bytes()), hex::encode(tanker_sig_pub.as_bytes()))
}

fn provisional_key_aad(app_sig_pub: &SigPublicKey32, tanker_sig_pub: &SigPublicKey32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(TABLE_PROVISIONAL_USER_KEYS.len() + 64);
    aad.extend_from_slice(TABLE_PROVISIONAL_USER_KEYS.as_bytes());
    aad.extend_from_slice(app_sig_pub.as_bytes());
    aad.extend_from_slice(tanker_sig_pub.as_bytes());
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn safe() -> KeySafe<MemoryBackend> {
        KeySafe::new(MemoryBackend::new(), UserSecret::from_bytes([9u8; 32]))
    }

    fn hash(b: u8) -> Hash32 {
        Hash32::from_slice(&[b; 32]).unwrap()
    }

    fn sig_pub(b: u8) -> SigPublicKey32 {
        SigPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    fn enc_pub(b: u8) -> EncPublicKey32 {
        EncPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    #[tokio::test]
    async fn device_key_pair_roundtrips_and_is_idempotent() {
        let safe = safe();
        let device_id = hash(1);
        let pair = DeviceKeyPair {
            public_signature_key: sig_pub(2),
            public_encryption_key: enc_pub(3),
            private_signature_key: [4u8; 64],
            private_encryption_key: [5u8; 32],
        };
        safe.put_device_key_pair(&device_id, &pair).await.unwrap();
        safe.put_device_key_pair(&device_id, &pair).await.unwrap(); // idempotent

        let loaded = safe.get_device_key_pair(&device_id).await.unwrap().unwrap();
        assert_eq!(loaded, pair);
    }

    #[tokio::test]
    async fn group_public_write_never_downgrades_a_full_record() {
        let safe = safe();
        let group_id = sig_pub(10);
        safe.put_group_full(&group_id, &enc_pub(11), &[1u8; 32]).await.unwrap();
        safe.put_group_public(&group_id, &enc_pub(99)).await.unwrap(); // must be a no-op

        let record = safe.get_group_key(&group_id).await.unwrap().unwrap();
        assert_eq!(
            record,
            GroupKeyRecord::Full {
                public: enc_pub(11),
                private: [1u8; 32],
                signature_private: None,
            }
        );
    }

    #[tokio::test]
    async fn group_public_only_is_stored_when_nothing_prior_exists() {
        let safe = safe();
        let group_id = sig_pub(20);
        safe.put_group_public(&group_id, &enc_pub(21)).await.unwrap();
        assert_eq!(safe.get_group_key(&group_id).await.unwrap().unwrap(), GroupKeyRecord::PublicOnly(enc_pub(21)));
    }

    #[tokio::test]
    async fn put_group_full_preserves_an_existing_signature_key() {
        let safe = safe();
        let group_id = sig_pub(12);
        safe.put_group_full_with_signature_key(&group_id, &enc_pub(13), &[1u8; 32], &[2u8; 64])
            .await
            .unwrap();

        // A later rotation-driven put_group_full (no signature key in hand)
        // must not erase the admin key already on file.
        safe.put_group_full(&group_id, &enc_pub(14), &[3u8; 32]).await.unwrap();

        let record = safe.get_group_key(&group_id).await.unwrap().unwrap();
        assert_eq!(
            record,
            GroupKeyRecord::Full {
                public: enc_pub(14),
                private: [3u8; 32],
                signature_private: Some([2u8; 64]),
            }
        );
    }

    #[tokio::test]
    async fn resource_key_roundtrips_and_is_idempotent() {
        let safe = safe();
        let resource_id = [7u8; 16];
        let key = [8u8; 32];
        safe.put_resource_key(&resource_id, &key).await.unwrap();
        safe.put_resource_key(&resource_id, &[0u8; 32]).await.unwrap(); // no-op, first write wins
        assert_eq!(safe.get_resource_key(&resource_id).await.unwrap().unwrap(), key);
    }

    #[tokio::test]
    async fn provisional_user_key_roundtrips() {
        let safe = safe();
        let app = sig_pub(30);
        let tanker = sig_pub(31);
        safe.put_provisional_user_key(&app, &tanker, &[1u8; 32], &[2u8; 32]).await.unwrap();
        let (app_priv, tanker_priv) = safe.get_provisional_user_key(&app, &tanker).await.unwrap().unwrap();
        assert_eq!(app_priv, [1u8; 32]);
        assert_eq!(tanker_priv, [2u8; 32]);
    }

    #[tokio::test]
    async fn pending_group_key_is_consumed_once() {
        let safe = safe();
        let group_id = sig_pub(40);
        safe.put_pending_group_key(&group_id, &enc_pub(41), &[6u8; 32]).await.unwrap();
        let (public, private) = safe.take_pending_group_key(&group_id).await.unwrap().unwrap();
        assert_eq!(public, enc_pub(41));
        assert_eq!(private, [6u8; 32]);
        assert!(safe.take_pending_group_key(&group_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_sealed_under_one_device_id_rejects_being_read_as_another() {
        let safe = safe();
        let pair = DeviceKeyPair {
            public_signature_key: sig_pub(2),
            public_encryption_key: enc_pub(3),
            private_signature_key: [4u8; 64],
            private_encryption_key: [5u8; 32],
        };
        safe.put_device_key_pair(&hash(1), &pair).await.unwrap();

        // Splice the row under a different device id: AAD no longer matches.
        let row = safe.backend.get(TABLE_DEVICE_KEYS, &hex::encode(hash(1).as_bytes())).await.unwrap().unwrap();
        safe.backend.put(TABLE_DEVICE_KEYS, &hex::encode(hash(2).as_bytes()), row).await.unwrap();
        assert!(safe.get_device_key_pair(&hash(2)).await.is_err());
    }
}
