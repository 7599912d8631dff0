//! Resource key issuance and sharing (C8): turning a freshly-generated
//! resource key into signed-block-ready key_publish payloads, and
//! unwinding the doubly-sealed provisional path on claim.

use std::collections::HashSet;

use tc_primitives::seal::{self, EncKeyPair, EncPublicKey};
use tc_state::{GroupRegistry, UserRegistry};
use tc_wire::fields::{Hash32, Sealed, SigPublicKey32};
use tc_wire::nature::Nature;
use tc_wire::payloads::key_publish::{KeyPublishToProvisionalUser, KeyPublishToRecipient, ResourceId};

use crate::error::ResourceError;

/// At most this many recipients may be addressed in one `share` call;
/// more fails fast with `InvalidArgument` (here `TooManyRecipients`)
/// rather than splitting into multiple pushes implicitly.
pub const MAX_RECIPIENTS_PER_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    User(Hash32),
    Group(SigPublicKey32),
    Provisional(SigPublicKey32, SigPublicKey32),
}

/// One key_publish payload ready to be wrapped in a signed block by the
/// caller, who owns the trustchain id, author and signing key.
pub struct KeyPublishPayload {
    pub nature: Nature,
    pub encoded: Vec<u8>,
}

/// Build one key_publish payload per (deduplicated) recipient, sealing
/// `resource_key` to each recipient's current public key. Fails with
/// `TooManyRecipients` before sealing anything if, after dedup, more
/// than `MAX_RECIPIENTS_PER_BATCH` recipients were requested.
pub fn share(
    resource_id: ResourceId,
    resource_key: &[u8; 32],
    recipients: &[Recipient],
    users: &UserRegistry,
    groups: &GroupRegistry,
) -> Result<Vec<KeyPublishPayload>, ResourceError> {
    let deduped: Vec<&Recipient> = {
        let mut seen = HashSet::new();
        recipients.iter().filter(|r| seen.insert(*r)).collect()
    };
    if deduped.len() > MAX_RECIPIENTS_PER_BATCH {
        return Err(ResourceError::TooManyRecipients);
    }

    deduped
        .into_iter()
        .map(|recipient| build_one(resource_id, resource_key, recipient, users, groups))
        .collect()
}

fn build_one(
    resource_id: ResourceId,
    resource_key: &[u8; 32],
    recipient: &Recipient,
    users: &UserRegistry,
    groups: &GroupRegistry,
) -> Result<KeyPublishPayload, ResourceError> {
    match recipient {
        Recipient::User(user_id) => {
            let user = users.user(user_id).ok_or(ResourceError::UnknownRecipient)?;
            let public_key = user.live_public_encryption_key();
            let sealed = seal::seal_key(&EncPublicKey(public_key.0), resource_key)?;
            let payload = KeyPublishToRecipient {
                recipient_public_encryption_key: public_key,
                resource_id,
                sealed_resource_key: Sealed::sealed_enc_private_key(&sealed)?,
            };
            Ok(KeyPublishPayload {
                nature: Nature::KeyPublishToUser,
                encoded: payload.encode(),
            })
        }
        Recipient::Group(group_id) => {
            let group = groups.get(group_id).ok_or(ResourceError::UnknownRecipient)?;
            let public_key = group.encryption_public_key.clone();
            let sealed = seal::seal_key(&EncPublicKey(public_key.0), resource_key)?;
            let payload = KeyPublishToRecipient {
                recipient_public_encryption_key: public_key,
                resource_id,
                sealed_resource_key: Sealed::sealed_enc_private_key(&sealed)?,
            };
            Ok(KeyPublishPayload {
                nature: Nature::KeyPublishToUserGroup,
                encoded: payload.encode(),
            })
        }
        Recipient::Provisional(app_sig_pub, tanker_sig_pub) => {
            // Provisional identities carry no encryption key of their
            // own in this registry slice; the caller resolves
            // `app_enc_pub`/`tanker_enc_pub` from the provisional
            // identity descriptor (out of this crate's scope) and
            // calls `share_provisional` directly instead.
            let _ = (app_sig_pub, tanker_sig_pub);
            Err(ResourceError::UnknownRecipient)
        }
    }
}

/// Build a key_publish_to_provisional_user payload: `resource_key`
/// sealed to `app_enc_pub`, then the result sealed again to
/// `tanker_enc_pub` (spec order: inner = app, outer = tanker).
pub fn share_provisional(
    resource_id: ResourceId,
    resource_key: &[u8; 32],
    app_sig_pub: SigPublicKey32,
    tanker_sig_pub: SigPublicKey32,
    app_enc_pub: &EncPublicKey,
    tanker_enc_pub: &EncPublicKey,
) -> Result<KeyPublishPayload, ResourceError> {
    let doubly_sealed = doubly_seal(app_enc_pub, tanker_enc_pub, resource_key)?;
    let payload = KeyPublishToProvisionalUser {
        app_sig_pub,
        tanker_sig_pub,
        resource_id,
        doubly_sealed_resource_key: doubly_sealed,
    };
    Ok(KeyPublishPayload {
        nature: Nature::KeyPublishToProvisionalUser,
        encoded: payload.encode(),
    })
}

pub fn doubly_seal(app_pub: &EncPublicKey, tanker_pub: &EncPublicKey, resource_key: &[u8; 32]) -> Result<Sealed, ResourceError> {
    let inner = seal::seal_key(app_pub, resource_key)?;
    let outer = seal::seal(tanker_pub, &inner)?;
    Ok(Sealed::two_sealed_key(&outer)?)
}

/// Reverse `doubly_seal` once the provisional identity is claimed: open
/// the outer (tanker) layer first, then the inner (app) layer.
pub fn doubly_unseal(app: &EncKeyPair, tanker: &EncKeyPair, doubly_sealed: &Sealed) -> Result<[u8; 32], ResourceError> {
    let inner = tanker.unseal(doubly_sealed.as_bytes())?;
    let resource_key = app.unseal(&inner)?;
    resource_key
        .as_slice()
        .try_into()
        .map(|arr: [u8; 32]| arr)
        .map_err(|_| ResourceError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_state::{GroupState, UserState};
    use tc_wire::fields::EncPublicKey32;

    fn enc_pub(b: u8) -> EncPublicKey32 {
        EncPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    fn hash(b: u8) -> Hash32 {
        Hash32::from_slice(&[b; 32]).unwrap()
    }

    fn sig_pub(b: u8) -> SigPublicKey32 {
        SigPublicKey32::from_slice(&[b; 32]).unwrap()
    }

    #[test]
    fn shares_with_user_and_group_and_dedups_identities() {
        let mut users = UserRegistry::new();
        users.insert_user(UserState::new(hash(1), enc_pub(11), 0));

        let mut groups = GroupRegistry::new();
        groups.insert(GroupState::new(sig_pub(9), enc_pub(12), hash(50)));

        let resource_id = ResourceId::from_slice(&[1u8; 16]).unwrap();
        let resource_key = [42u8; 32];
        let recipients = vec![
            Recipient::User(hash(1)),
            Recipient::User(hash(1)), // duplicate, collapses to one payload
            Recipient::Group(sig_pub(9)),
        ];

        let payloads = share(resource_id, &resource_key, &recipients, &users, &groups).unwrap();
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().any(|p| p.nature == Nature::KeyPublishToUser));
        assert!(payloads.iter().any(|p| p.nature == Nature::KeyPublishToUserGroup));
    }

    #[test]
    fn rejects_more_than_100_recipients() {
        let users = UserRegistry::new();
        let groups = GroupRegistry::new();
        let resource_id = ResourceId::from_slice(&[1u8; 16]).unwrap();
        let recipients: Vec<Recipient> = (0..101).map(|i| Recipient::User(hash((i % 255) as u8))).collect();
        assert!(matches!(
            share(resource_id, &[0u8; 32], &recipients, &users, &groups),
            Err(ResourceError::TooManyRecipients)
        ));
    }

    #[test]
    fn unknown_user_recipient_fails() {
        let users = UserRegistry::new();
        let groups = GroupRegistry::new();
        let resource_id = ResourceId::from_slice(&[1u8; 16]).unwrap();
        let recipients = vec![Recipient::User(hash(99))];
        assert!(matches!(
            share(resource_id, &[0u8; 32], &recipients, &users, &groups),
            Err(ResourceError::UnknownRecipient)
        ));
    }

    #[test]
    fn provisional_doubly_sealed_roundtrips() {
        let app = EncKeyPair::generate();
        let tanker = EncKeyPair::generate();
        let resource_key = [7u8; 32];

        let sealed = doubly_seal(&app.public(), &tanker.public(), &resource_key).unwrap();
        let recovered = doubly_unseal(&app, &tanker, &sealed).unwrap();
        assert_eq!(recovered, resource_key);
    }

    #[test]
    fn provisional_share_payload_round_trips_through_wire_encoding() {
        let app = EncKeyPair::generate();
        let tanker = EncKeyPair::generate();
        let resource_id = ResourceId::from_slice(&[3u8; 16]).unwrap();
        let resource_key = [8u8; 32];

        let payload = share_provisional(
            resource_id,
            &resource_key,
            sig_pub(21),
            sig_pub(22),
            &app.public(),
            &tanker.public(),
        )
        .unwrap();
        assert_eq!(payload.nature, Nature::KeyPublishToProvisionalUser);

        let decoded = KeyPublishToProvisionalUser::decode(&payload.encoded).unwrap();
        let recovered = doubly_unseal(&app, &tanker, &decoded.doubly_sealed_resource_key).unwrap();
        assert_eq!(recovered, resource_key);
    }
}
