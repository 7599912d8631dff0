//! Fixed-size field newtypes shared by the block envelope and payload
//! codecs. Construction validates length once; every later use is
//! infallible. Sizes are hard-coded per the wire format:
//!
//! hash 32, sig pub 32, sig priv 64, enc pub 32, enc priv 32,
//! signature 64, sealed-enc-priv 32+48, sealed-sig-priv 64+48,
//! two-sealed-key 32+48+48.

use tc_primitives::seal::SEAL_OVERHEAD;

use crate::error::WireError;
use crate::reader::expect_field_size;

pub const HASH_SIZE: usize = 32;
pub const SIG_PUBLIC_KEY_SIZE: usize = 32;
/// libsodium-style Ed25519 secret key encoding: 32-byte seed || 32-byte
/// public key.
pub const SIG_PRIVATE_KEY_SIZE: usize = 64;
pub const ENC_PUBLIC_KEY_SIZE: usize = 32;
pub const ENC_PRIVATE_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;
pub const SEALED_ENC_PRIVATE_KEY_SIZE: usize = ENC_PRIVATE_KEY_SIZE + SEAL_OVERHEAD;
pub const SEALED_SIG_PRIVATE_KEY_SIZE: usize = SIG_PRIVATE_KEY_SIZE + SEAL_OVERHEAD;
pub const TWO_SEALED_KEY_SIZE: usize = ENC_PRIVATE_KEY_SIZE + SEAL_OVERHEAD + SEAL_OVERHEAD;

macro_rules! fixed_bytes_newtype {
    ($name:ident, $size:expr, $field_name:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            pub fn from_slice(bytes: &[u8]) -> Result<Self, WireError> {
                expect_field_size($field_name, bytes, $size)?;
                let mut arr = [0u8; $size];
                arr.copy_from_slice(bytes);
                Ok(Self(arr))
            }

            pub fn as_bytes(&self) -> &[u8; $size] {
                &self.0
            }

            pub fn zero() -> Self {
                Self([0u8; $size])
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $size]
            }
        }
    };
}

fixed_bytes_newtype!(Hash32, HASH_SIZE, "hash");
fixed_bytes_newtype!(SigPublicKey32, SIG_PUBLIC_KEY_SIZE, "sig_public_key");
fixed_bytes_newtype!(SigPrivateKey64, SIG_PRIVATE_KEY_SIZE, "sig_private_key");
fixed_bytes_newtype!(EncPublicKey32, ENC_PUBLIC_KEY_SIZE, "enc_public_key");
fixed_bytes_newtype!(EncPrivateKey32, ENC_PRIVATE_KEY_SIZE, "enc_private_key");
fixed_bytes_newtype!(Signature64, SIGNATURE_SIZE, "signature");

/// A private key sealed to some recipient's public encryption key.
/// Variable overhead is fixed at `SEAL_OVERHEAD`, so the wrapped key's
/// total wire size is fixed once the plaintext key size is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed(pub Vec<u8>);

impl Sealed {
    pub fn from_slice(field: &'static str, bytes: &[u8], expected_total: usize) -> Result<Self, WireError> {
        expect_field_size(field, bytes, expected_total)?;
        Ok(Self(bytes.to_vec()))
    }

    pub fn sealed_enc_private_key(bytes: &[u8]) -> Result<Self, WireError> {
        Self::from_slice("sealed_enc_private_key", bytes, SEALED_ENC_PRIVATE_KEY_SIZE)
    }

    pub fn sealed_sig_private_key(bytes: &[u8]) -> Result<Self, WireError> {
        Self::from_slice("sealed_sig_private_key", bytes, SEALED_SIG_PRIVATE_KEY_SIZE)
    }

    pub fn two_sealed_key(bytes: &[u8]) -> Result<Self, WireError> {
        Self::from_slice("two_sealed_key", bytes, TWO_SEALED_KEY_SIZE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Hash32::from_slice(&[0u8; 31]).is_err());
        assert!(Hash32::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn sealed_sizes_match_spec() {
        assert_eq!(SEALED_ENC_PRIVATE_KEY_SIZE, 80);
        assert_eq!(SEALED_SIG_PRIVATE_KEY_SIZE, 112);
        assert_eq!(TWO_SEALED_KEY_SIZE, 128);
    }
}
