use thiserror::Error;

/// Errors raised by the primitive facade. Every operation here is CPU-bound
/// and finite — none of these indicate a network or storage failure.
#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("invalid key material: {0}")]
    InvalidKey(&'static str),

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AeadDecrypt,

    #[error("seal failed")]
    Seal,

    #[error("unseal failed (not addressed to this key, or tampered)")]
    Unseal,

    #[error("key derivation failed: {0}")]
    KeyDerivation(&'static str),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
