//! The user secret — the exclusive key for the local AEAD-encrypted key
//! safe (C11). Zeroized on drop, never logged, never sent over the wire.

use zeroize::ZeroizeOnDrop;

pub const USER_SECRET_SIZE: usize = 32;

#[derive(ZeroizeOnDrop)]
pub struct UserSecret([u8; USER_SECRET_SIZE]);

impl UserSecret {
    pub fn from_bytes(bytes: [u8; USER_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; USER_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for UserSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserSecret(..)")
    }
}
