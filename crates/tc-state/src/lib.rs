//! Derived local state (C6, C7): the device tree and user key-rotation
//! history, the ghost device, and group membership/key state. Every
//! type here is a pure reducer target — folding already-verified
//! blocks in. Cross-block validation lives in `tc-verifier`.

pub mod error;
pub mod ghost;
pub mod group;
pub mod user;

pub use error::StateError;
pub use ghost::{GhostDevice, VerificationKey};
pub use group::{GroupRegistry, GroupState};
pub use user::{DeviceInfo, UserRegistry, UserState};
