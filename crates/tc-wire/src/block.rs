//! The block envelope (C3): outer framing shared by every nature.

use base64::{engine::general_purpose::STANDARD, Engine};
use tc_primitives::hash;
use tc_primitives::sign::{SigKeyPair, SigPublicKey, Signature64};

use crate::error::WireError;
use crate::fields::Hash32;
use crate::nature::Nature;
use crate::reader::Reader;
use crate::writer::Writer;

const CURRENT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub version: u64,
    /// Reserved; ignored on read, always written as 0.
    pub index: u64,
    pub trustchain_id: Hash32,
    pub nature: Nature,
    pub payload: Vec<u8>,
    pub author: Hash32,
    pub signature: [u8; 64],
}

impl Block {
    /// `BLAKE2b(varint(nature) || author || payload)`. Deliberately
    /// excludes version, trustchain id and signature: signing commits
    /// to semantics, not framing.
    pub fn hash(&self) -> [u8; 32] {
        let mut w = Writer::new();
        w.varint(self.nature.code());
        let natured = w.into_bytes();
        hash::hash_parts(&[&natured, self.author.as_bytes(), &self.payload])
    }

    pub fn is_root(&self) -> bool {
        self.author.is_zero() && self.signature == [0u8; 64] && self.nature == Nature::TrustchainCreation
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.varint(self.version);
        w.varint(0); // index is always 0 on write
        w.fixed(self.trustchain_id.as_bytes());
        w.varint(self.nature.code());
        w.bytes(&self.payload);
        w.fixed(self.author.as_bytes());
        w.fixed(&self.signature);
        w.into_bytes()
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf);
        let version = r.varint()?;
        if version > CURRENT_VERSION {
            return Err(WireError::UpgradeRequired);
        }
        let index = r.varint()?;
        let trustchain_id = Hash32::from_slice(r.fixed(32)?)?;
        let nature_code = r.varint()?;
        let nature = Nature::from_code(nature_code)?;
        let payload = r.bytes()?.to_vec();
        let author = Hash32::from_slice(r.fixed(32)?)?;
        let signature: [u8; 64] = r.fixed_array()?;
        r.expect_exhausted()?;

        Ok(Block {
            version,
            index,
            trustchain_id,
            nature,
            payload,
            author,
            signature,
        })
    }

    pub fn serialize_base64(&self) -> String {
        STANDARD.encode(self.serialize())
    }

    pub fn deserialize_base64(s: &str) -> Result<Self, WireError> {
        let raw = STANDARD
            .decode(s)
            .map_err(|_| WireError::Malformed("invalid base64 block"))?;
        Self::deserialize(&raw)
    }

    /// Verify the outer signature against the claimed author's public
    /// signature key. Root blocks are verified by the caller against
    /// the zero author/signature convention instead (see `is_root`).
    pub fn verify_signature(&self, author_key: &SigPublicKey) -> bool {
        author_key.verify(&self.hash(), &Signature64(self.signature)).is_ok()
    }
}

pub struct CreatedBlock {
    pub serialized_base64: String,
    pub hash: [u8; 32],
}

/// Computes the hash, signs it, and serializes the full envelope.
pub fn create_block(
    payload: Vec<u8>,
    nature: Nature,
    trustchain_id: Hash32,
    author: Hash32,
    sign_key: &SigKeyPair,
) -> CreatedBlock {
    let block = Block {
        version: CURRENT_VERSION,
        index: 0,
        trustchain_id,
        nature,
        payload,
        author,
        signature: [0u8; 64],
    };
    let hash = block.hash();
    let signature = sign_key.sign(&hash);
    let signed = Block {
        signature: signature.0,
        ..block
    };
    CreatedBlock {
        serialized_base64: signed.serialize_base64(),
        hash,
    }
}

/// Builds the distinguished root block: `author = 0^32`, `signature =
/// 0^64`, `payload = trustchain_public_signature_key`. The block's own
/// hash becomes the trustchain id.
pub fn create_root_block(trustchain_public_signature_key: &SigPublicKey) -> CreatedBlock {
    let payload = trustchain_public_signature_key.0.to_vec();
    let block = Block {
        version: CURRENT_VERSION,
        index: 0,
        trustchain_id: Hash32::zero(),
        nature: Nature::TrustchainCreation,
        payload,
        author: Hash32::zero(),
        signature: [0u8; 64],
    };
    let hash = block.hash();
    let rooted = Block {
        trustchain_id: Hash32::from_slice(&hash).expect("hash is 32 bytes"),
        ..block
    };
    CreatedBlock {
        serialized_base64: rooted.serialize_base64(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_primitives::sign::SigKeyPair;

    #[test]
    fn roundtrip_non_root_block() {
        let author_key = SigKeyPair::generate();
        let author_id = Hash32::from_slice(&[7u8; 32]).unwrap();
        let tcid = Hash32::from_slice(&[9u8; 32]).unwrap();

        let created = create_block(
            b"payload-bytes".to_vec(),
            Nature::KeyPublishToUser,
            tcid.clone(),
            author_id.clone(),
            &author_key,
        );

        let decoded = Block::deserialize_base64(&created.serialized_base64).unwrap();
        assert_eq!(decoded.hash(), created.hash);
        assert_eq!(decoded.trustchain_id, tcid);
        assert_eq!(decoded.author, author_id);
        assert_eq!(decoded.nature, Nature::KeyPublishToUser);
        assert!(decoded.verify_signature(&author_key.public()));
    }

    #[test]
    fn root_block_is_self_consistent() {
        let trustchain_key = SigKeyPair::generate();
        let created = create_root_block(&trustchain_key.public());
        let decoded = Block::deserialize_base64(&created.serialized_base64).unwrap();
        assert!(decoded.is_root());
        assert_eq!(decoded.trustchain_id.as_bytes(), &created.hash);
        assert_eq!(decoded.hash(), created.hash);
    }

    #[test]
    fn rejects_future_version() {
        let mut w = Writer::new();
        w.varint(2); // unsupported version
        w.varint(0);
        w.fixed(&[0u8; 32]);
        w.varint(Nature::TrustchainCreation.code());
        w.bytes(b"");
        w.fixed(&[0u8; 32]);
        w.fixed(&[0u8; 64]);
        let buf = w.into_bytes();
        assert_eq!(Block::deserialize(&buf), Err(WireError::UpgradeRequired));
    }

    #[test]
    fn rejects_unknown_nature_code() {
        let mut w = Writer::new();
        w.varint(1);
        w.varint(0);
        w.fixed(&[0u8; 32]);
        w.varint(9999);
        w.bytes(b"");
        w.fixed(&[0u8; 32]);
        w.fixed(&[0u8; 64]);
        let buf = w.into_bytes();
        assert_eq!(Block::deserialize(&buf), Err(WireError::UpgradeRequired));
    }
}
