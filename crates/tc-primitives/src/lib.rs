//! tc-primitives — thin, fixed-size facade over the cryptographic primitive
//! library used throughout the trustchain core.
//!
//! # Module layout
//! - `hash`      — BLAKE2b-256 generic hash (block hashes, fingerprints)
//! - `sign`      — Ed25519 sign/verify
//! - `seal`      — X25519 anonymous sealed-box (ephemeral-sender encryption)
//! - `aead`      — XChaCha20-Poly1305 AEAD helpers
//! - `kdf`       — Argon2id passphrase -> user secret derivation
//! - `secret`    — the user secret newtype
//! - `error`     — unified error type
//!
//! No module here holds process-wide mutable state: every constant is a
//! `const`/`pub const`, and every key pair is an owned value the caller
//! threads through explicitly — there is no global key cache to
//! accidentally leave initialized across sessions.

pub mod aead;
pub mod error;
pub mod hash;
pub mod kdf;
pub mod seal;
pub mod secret;
pub mod sign;

pub use error::PrimitiveError;
