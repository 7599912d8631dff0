//! trustchain_creation payload: the root block's sole content is the
//! trustchain's public signature key.

use crate::error::WireError;
use crate::fields::SigPublicKey32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustchainCreation {
    pub trustchain_public_signature_key: SigPublicKey32,
}

impl TrustchainCreation {
    pub fn encode(&self) -> Vec<u8> {
        self.trustchain_public_signature_key.as_bytes().to_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        Ok(Self {
            trustchain_public_signature_key: SigPublicKey32::from_slice(payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let record = TrustchainCreation {
            trustchain_public_signature_key: SigPublicKey32::from_slice(&[1u8; 32]).unwrap(),
        };
        let decoded = TrustchainCreation::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }
}
