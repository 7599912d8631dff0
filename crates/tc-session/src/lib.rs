//! tc-session — the session orchestrator (C12): the public SDK surface
//! wiring the lower crates (primitives, wire format, derived state,
//! verifier, resource sharing, local key store) into a single
//! per-process handle.
//!
//! # Module layout
//! - `config`      — `SessionConfig`, constructed by the embedding app
//! - `error`       — `SdkError`, the one error enum this crate exposes
//! - `events`      — `EventBus`/`SessionEvent`, the subscriber-facing event stream
//! - `identity`    — identity and verification-method parsing (§6)
//! - `orchestrator` — `Session`, `Status`, `DeviceDescriptor`
//! - `transport`   — the `Transport` seam embedders implement

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod orchestrator;
pub mod transport;

pub use config::SessionConfig;
pub use error::SdkError;
pub use events::{EventBus, SessionEvent};
pub use identity::{
    AttachResult, AttachStatus, ProvisionalPublicKeys, ProvisionalTarget, PublicIdentity, SecretIdentity, SecretProvisionalIdentity,
    Verification, VerificationMethod,
};
pub use orchestrator::{DecryptionStream, DeviceDescriptor, EncryptionStream, Session, Status};
pub use transport::Transport;
