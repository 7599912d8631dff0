//! Block-by-block trustchain verification (C9).

pub mod error;
pub mod rules;

pub use error::{InvalidBlock, VerifierError};
pub use rules::Verifier;
