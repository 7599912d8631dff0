//! The nature catalog (C4): a closed enumeration of block operation
//! kinds, organized by kind and version family. Reader and writer are
//! generated from the same table below so they can never drift apart.

use crate::error::WireError;

/// One entry per wire nature. `kind` groups version families together;
/// `preferred` marks the highest version of each kind that the writer
/// emits. The reader accepts every entry regardless of `preferred`.
macro_rules! nature_catalog {
    ($(($variant:ident, $code:expr, $kind:expr, $preferred:expr)),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Nature {
            $($variant),+,
        }

        impl Nature {
            pub const ALL: &'static [Nature] = &[$(Nature::$variant),+];

            pub fn code(self) -> u64 {
                match self {
                    $(Nature::$variant => $code),+,
                }
            }

            pub fn from_code(code: u64) -> Result<Self, WireError> {
                match code {
                    $($code => Ok(Nature::$variant),)+
                    _ => Err(WireError::UpgradeRequired),
                }
            }

            /// The kind this nature belongs to, ignoring version suffix.
            pub fn kind(self) -> &'static str {
                match self {
                    $(Nature::$variant => $kind),+,
                }
            }

            /// Whether this is the highest version of its kind that the
            /// writer knows how to emit.
            pub fn is_preferred(self) -> bool {
                match self {
                    $(Nature::$variant => $preferred),+,
                }
            }
        }
    };
}

nature_catalog! {
    (TrustchainCreation,              1,  "trustchain_creation",                true),

    (DeviceCreationV1,                2,  "device_creation",                    false),
    (DeviceCreationV2,                3,  "device_creation",                    false),
    (DeviceCreationV3,                8,  "device_creation",                    true),

    (KeyPublishToDevice,              4,  "key_publish_to_device",              true),
    (KeyPublishToUser,                7,  "key_publish_to_user",                true),
    (KeyPublishToUserGroup,           11, "key_publish_to_user_group",          true),
    (KeyPublishToProvisionalUser,     17, "key_publish_to_provisional_user",    true),

    (DeviceRevocationV1,              5,  "device_revocation",                  false),
    (DeviceRevocationV2,              13, "device_revocation",                  true),

    (UserGroupCreationV1,             9,  "user_group_creation",                false),
    (UserGroupCreationV2,             15, "user_group_creation",                false),
    (UserGroupCreationV3,             18, "user_group_creation",                true),

    (UserGroupAdditionV1,             10, "user_group_addition",                false),
    (UserGroupAdditionV2,             16, "user_group_addition",                false),
    (UserGroupAdditionV3,             19, "user_group_addition",                true),

    (UserGroupUpdate,                 20, "user_group_update",                  true),

    (ProvisionalIdentityClaim,        14, "provisional_identity_claim",         true),
}

impl Nature {
    /// The highest version of `kind` that the writer emits. Returns
    /// `None` for an unknown kind string.
    pub fn preferred(kind: &str) -> Option<Nature> {
        Self::ALL.iter().copied().find(|n| n.kind() == kind && n.is_preferred())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_code() {
        for &n in Nature::ALL {
            assert_eq!(Nature::from_code(n.code()).unwrap(), n);
        }
    }

    #[test]
    fn unknown_code_requires_upgrade() {
        assert_eq!(Nature::from_code(255), Err(WireError::UpgradeRequired));
    }

    #[test]
    fn preferred_picks_highest_version() {
        assert_eq!(Nature::preferred("device_creation"), Some(Nature::DeviceCreationV3));
        assert_eq!(Nature::preferred("user_group_creation"), Some(Nature::UserGroupCreationV3));
        assert_eq!(Nature::preferred("nonexistent_kind"), None);
    }

    #[test]
    fn exactly_one_preferred_per_kind() {
        use std::collections::HashMap;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &n in Nature::ALL {
            if n.is_preferred() {
                *counts.entry(n.kind()).or_insert(0) += 1;
            }
        }
        assert!(counts.values().all(|&c| c == 1));
    }
}
