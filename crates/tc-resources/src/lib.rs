//! Resource key sharing and encryption framing (C8, C10): turning
//! resource keys into key_publish blocks, and encrypting/decrypting
//! resource bodies in the Simple, Padded simple, Streamed and
//! Transparent session formats.

pub mod error;
pub mod padding;
pub mod session;
pub mod sharing;
pub mod simple;
pub mod stream;

pub use error::ResourceError;
pub use padding::PaddingStep;
pub use sharing::{share, share_provisional, KeyPublishPayload, Recipient, MAX_RECIPIENTS_PER_BATCH};
