use thiserror::Error;

/// Errors raised by resource encryption and sharing (C8, C10). Mirrors
/// the layering of `tc_wire::WireError`/`tc_primitives::PrimitiveError`:
/// this crate's own logic failures get their own variants, lower-layer
/// failures are wrapped with `#[from]`.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unsupported or unknown framing version byte {0}")]
    UpgradeRequired(u8),

    #[error("truncated resource ciphertext")]
    Truncated,

    #[error("decryption failed (authentication tag mismatch)")]
    DecryptionFailed,

    #[error("sharing more than 100 recipients in one batch")]
    TooManyRecipients,

    #[error("unknown recipient: not a registered user, group or provisional identity")]
    UnknownRecipient,

    #[error("chunk arrived out of sequence")]
    OutOfSequence,

    #[error(transparent)]
    Primitive(#[from] tc_primitives::PrimitiveError),

    #[error(transparent)]
    Wire(#[from] tc_wire::WireError),
}
