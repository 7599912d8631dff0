//! Per-nature payload codecs (C5). Each module owns format correctness
//! and self-signature scope for one family of natures; cross-block
//! consistency is the verifier's job, not this layer's.

pub mod device;
pub mod group;
pub mod key_publish;
pub mod provisional;
pub mod trustchain;

use crate::error::WireError;
use crate::nature::Nature;

/// Decoded payload dispatched by nature. The writer always produces the
/// preferred variant of each kind; the reader accepts every one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    TrustchainCreation(trustchain::TrustchainCreation),
    DeviceCreationV1(device::DeviceCreationV1),
    DeviceCreationV2(device::DeviceCreationV2),
    DeviceCreationV3(device::DeviceCreationV3),
    DeviceRevocationV1(device::DeviceRevocationV1),
    DeviceRevocationV2(device::DeviceRevocationV2),
    KeyPublishToDevice(key_publish::KeyPublishToRecipient),
    KeyPublishToUser(key_publish::KeyPublishToRecipient),
    KeyPublishToUserGroup(key_publish::KeyPublishToRecipient),
    KeyPublishToProvisionalUser(key_publish::KeyPublishToProvisionalUser),
    UserGroupCreation(group::UserGroupCreation),
    UserGroupAddition(group::UserGroupAddition),
    UserGroupUpdate(group::UserGroupUpdate),
    ProvisionalIdentityClaim(provisional::ProvisionalIdentityClaim),
}

/// Decode `payload` according to the nature carried by its enclosing
/// block.
pub fn decode(nature: Nature, payload: &[u8]) -> Result<Payload, WireError> {
    use Nature::*;
    Ok(match nature {
        TrustchainCreation => Payload::TrustchainCreation(trustchain::TrustchainCreation::decode(payload)?),
        Nature::DeviceCreationV1 => Payload::DeviceCreationV1(device::DeviceCreationV1::decode(payload)?),
        Nature::DeviceCreationV2 => Payload::DeviceCreationV2(device::DeviceCreationV2::decode(payload)?),
        Nature::DeviceCreationV3 => Payload::DeviceCreationV3(device::DeviceCreationV3::decode(payload)?),
        Nature::DeviceRevocationV1 => Payload::DeviceRevocationV1(device::DeviceRevocationV1::decode(payload)?),
        Nature::DeviceRevocationV2 => Payload::DeviceRevocationV2(device::DeviceRevocationV2::decode(payload)?),
        Nature::KeyPublishToDevice => Payload::KeyPublishToDevice(key_publish::KeyPublishToRecipient::decode(payload)?),
        Nature::KeyPublishToUser => Payload::KeyPublishToUser(key_publish::KeyPublishToRecipient::decode(payload)?),
        Nature::KeyPublishToUserGroup => {
            Payload::KeyPublishToUserGroup(key_publish::KeyPublishToRecipient::decode(payload)?)
        }
        Nature::KeyPublishToProvisionalUser => {
            Payload::KeyPublishToProvisionalUser(key_publish::KeyPublishToProvisionalUser::decode(payload)?)
        }
        Nature::UserGroupCreationV1 => Payload::UserGroupCreation(group::UserGroupCreation::decode(payload, false)?),
        Nature::UserGroupCreationV2 | Nature::UserGroupCreationV3 => {
            Payload::UserGroupCreation(group::UserGroupCreation::decode(payload, true)?)
        }
        Nature::UserGroupAdditionV1 => Payload::UserGroupAddition(group::UserGroupAddition::decode(payload, false)?),
        Nature::UserGroupAdditionV2 | Nature::UserGroupAdditionV3 => {
            Payload::UserGroupAddition(group::UserGroupAddition::decode(payload, true)?)
        }
        Nature::UserGroupUpdate => Payload::UserGroupUpdate(group::UserGroupUpdate::decode(payload)?),
        Nature::ProvisionalIdentityClaim => {
            Payload::ProvisionalIdentityClaim(provisional::ProvisionalIdentityClaim::decode(payload)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::SigPublicKey32;

    #[test]
    fn dispatches_trustchain_creation() {
        let payload = [1u8; 32];
        match decode(Nature::TrustchainCreation, &payload).unwrap() {
            Payload::TrustchainCreation(record) => {
                assert_eq!(record.trustchain_public_signature_key, SigPublicKey32([1u8; 32]));
            }
            _ => panic!("wrong variant"),
        }
    }
}
