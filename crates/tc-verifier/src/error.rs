use thiserror::Error;
use tc_wire::nature::Nature;

/// One rule violation, carrying enough context to act as a diagnostic
/// without needing to re-walk the chain: the offending block's hash,
/// its nature, and which specific rule failed.
#[derive(Debug, Error)]
#[error("invalid block {block_hash} (nature {nature:?}): {subkind}")]
pub struct InvalidBlock {
    pub block_hash: String,
    pub nature: Nature,
    pub subkind: &'static str,
}

impl InvalidBlock {
    pub fn new(block_hash: [u8; 32], nature: Nature, subkind: &'static str) -> Self {
        Self {
            block_hash: hex::encode(block_hash),
            nature,
            subkind,
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error(transparent)]
    InvalidBlock(#[from] InvalidBlock),

    #[error("unknown block version or nature")]
    UpgradeRequired,

    #[error(transparent)]
    Wire(#[from] tc_wire::WireError),

    #[error(transparent)]
    State(#[from] tc_state::StateError),
}

pub(crate) fn invalid(hash: [u8; 32], nature: Nature, subkind: &'static str) -> VerifierError {
    VerifierError::InvalidBlock(InvalidBlock::new(hash, nature, subkind))
}
