use thiserror::Error;

/// Errors raised while decoding/encoding the binary wire format (C2–C5).
/// These are never retried — a malformed record is malformed regardless
/// of how many times it is parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("truncated input: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("trailing garbage: {remaining} unconsumed bytes")]
    TrailingGarbage { remaining: usize },

    #[error("varint encoded with more bytes than necessary")]
    OverlongVarint,

    #[error("varint overflowed 64 bits")]
    VarintOverflow,

    #[error("invalid field size for {field}: expected {expected}, got {actual}")]
    InvalidFieldSize {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported block version or unknown nature — upgrade required")]
    UpgradeRequired,

    #[error("malformed record: {0}")]
    Malformed(&'static str),
}
