//! Top-level error type (§7/§7.1): every kind the session surface can
//! raise, with lower-crate errors folded in via `#[from]` — mirrors the
//! teacher's `dl_crypto::CryptoError` → `dl_store::StoreError` layering,
//! generalized one layer further across this crate's larger subsystem
//! count.

use thiserror::Error;
use tc_verifier::error::InvalidBlock;
use tc_wire::fields::Hash32;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("operation not valid in the current session state: {0}")]
    PreconditionFailed(&'static str),

    #[error("invalid verification")]
    InvalidVerification,

    #[error("invalid passphrase")]
    InvalidPassphrase,

    #[error("invalid verification code")]
    InvalidVerificationCode,

    #[error("verification code expired")]
    ExpiredVerificationCode,

    #[error("maximum verification attempts reached")]
    MaxVerificationAttemptsReached,

    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),

    #[error("provisional identity already attached by another user")]
    IdentityAlreadyAttached,

    #[error("invalid block {block_hash}: {subkind}")]
    InvalidBlock { subkind: &'static str, block_hash: Hash32 },

    #[error("unknown block version or nature; upgrade required")]
    UpgradeRequired,

    #[error("decryption failed (authentication tag mismatch)")]
    DecryptionFailed,

    #[error("resource key not found locally or on the server")]
    ResourceNotFound,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("this device has been revoked; the session must be wiped and stopped")]
    DeviceRevoked,

    #[error("internal invariant violation: {0}")]
    InternalError(&'static str),

    #[error("operation aborted: session is stopping")]
    Aborted,

    #[error(transparent)]
    Crypto(#[from] tc_primitives::PrimitiveError),

    #[error(transparent)]
    Codec(#[from] tc_wire::WireError),

    #[error(transparent)]
    Resource(#[from] tc_resources::ResourceError),

    #[error(transparent)]
    Store(#[from] tc_store::StoreError),

    #[error(transparent)]
    State(#[from] tc_state::StateError),
}

impl From<InvalidBlock> for SdkError {
    fn from(err: InvalidBlock) -> Self {
        let block_hash = Hash32::from_slice(&hex::decode(&err.block_hash).unwrap_or_else(|_| vec![0u8; 32]))
            .unwrap_or_else(|_| Hash32::zero());
        SdkError::InvalidBlock {
            subkind: err.subkind,
            block_hash,
        }
    }
}

/// `VerifierError` isn't wrapped with a blanket `#[from]`: its
/// `InvalidBlock` case needs flattening into `SdkError`'s own
/// structured variant rather than nesting behind a `Verify(..)` shell.
impl From<tc_verifier::error::VerifierError> for SdkError {
    fn from(err: tc_verifier::error::VerifierError) -> Self {
        use tc_verifier::error::VerifierError as V;
        match err {
            V::InvalidBlock(inner) => inner.into(),
            V::UpgradeRequired => SdkError::UpgradeRequired,
            V::Wire(e) => SdkError::Codec(e),
            V::State(e) => SdkError::State(e),
        }
    }
}

pub fn invalid_argument(message: impl Into<String>) -> SdkError {
    SdkError::InvalidArgument { message: message.into() }
}
