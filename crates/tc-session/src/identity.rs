//! Identity and verification-method parsing (§6).
//!
//! An identity is opaque to the embedding app: it is minted by the
//! app's own backend (which alone holds the trustchain's private
//! signature key) and handed to the SDK only to be parsed and acted
//! on. Every shape here is base64-of-JSON, matching the verification
//! key format the spec fixes explicitly; corruption of any byte must
//! surface as a semantic error (`InvalidIdentity`/`InvalidVerification`),
//! never as a raw base64/JSON decode error.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use tc_primitives::hash;
use tc_primitives::hash::hash_parts;
use tc_primitives::seal::EncKeyPair;
use tc_primitives::sign::SigKeyPair;
use tc_wire::fields::{EncPublicKey32, Hash32, SigPublicKey32};

use crate::error::SdkError;

// ---- Secret identity (this device's own, used to register/verify) ----

#[derive(Debug, Deserialize, Serialize)]
struct SecretIdentityJson {
    trustchain_id: String,
    target: String,
    value: String,
    /// The ghost device's own `device_creation` block, fully built and
    /// signed by the app backend at identity-minting time: the SDK
    /// never holds the trustchain's private signature key, so only the
    /// backend can author the block that names the trustchain itself as
    /// `author` (see `tc_verifier::rules::Authority::Trustchain`).
    /// Base64, ready to push as-is.
    ghost_device_block: String,
}

/// The caller's own identity: a user id and a pre-signed block minting
/// that user's ghost device. Used once, at `registerIdentity` time, to
/// push the ghost device and then author this device's own
/// `device_creation`, delegated by the ghost's own key pair (itself
/// reconstructed from a verification key, not from this struct).
pub struct SecretIdentity {
    pub trustchain_id: Hash32,
    pub user_id: Hash32,
    pub ghost_device_block: String,
}

impl SecretIdentity {
    pub fn parse(b64_json: &str) -> Result<Self, SdkError> {
        let raw = STANDARD
            .decode(b64_json)
            .map_err(|_| SdkError::InvalidIdentity("not valid base64"))?;
        let parsed: SecretIdentityJson =
            serde_json::from_slice(&raw).map_err(|_| SdkError::InvalidIdentity("not valid identity JSON"))?;
        if parsed.target != "user" {
            return Err(SdkError::InvalidIdentity("secret identity target must be \"user\""));
        }
        let trustchain_id = Hash32::from_slice(&STANDARD.decode(&parsed.trustchain_id).map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?)
            .map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?;
        let user_id = Hash32::from_slice(&STANDARD.decode(&parsed.value).map_err(|_| SdkError::InvalidIdentity("value"))?)
            .map_err(|_| SdkError::InvalidIdentity("value"))?;

        Ok(Self {
            trustchain_id,
            user_id,
            ghost_device_block: parsed.ghost_device_block,
        })
    }
}

// ---- Public identity (other users / provisional contacts, as share targets) ----

#[derive(Debug, Deserialize, Serialize)]
struct PublicIdentityJson {
    trustchain_id: String,
    target: String,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionalTarget {
    Email,
    PhoneNumber,
}

impl ProvisionalTarget {
    fn parse(target: &str) -> Option<Self> {
        match target {
            "email" => Some(Self::Email),
            "phone_number" => Some(Self::PhoneNumber),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PublicIdentity {
    User {
        trustchain_id: Hash32,
        user_id: Hash32,
    },
    Provisional {
        trustchain_id: Hash32,
        target: ProvisionalTarget,
        /// BLAKE2b of the plaintext email/phone value — the plaintext
        /// never leaves the caller's process (§6).
        hashed_value: Hash32,
    },
}

impl PublicIdentity {
    pub fn parse(b64_json: &str) -> Result<Self, SdkError> {
        let raw = STANDARD
            .decode(b64_json)
            .map_err(|_| SdkError::InvalidIdentity("not valid base64"))?;
        let parsed: PublicIdentityJson =
            serde_json::from_slice(&raw).map_err(|_| SdkError::InvalidIdentity("not valid identity JSON"))?;
        let trustchain_id = Hash32::from_slice(&STANDARD.decode(&parsed.trustchain_id).map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?)
            .map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?;

        if parsed.target == "user" {
            let user_id = Hash32::from_slice(&STANDARD.decode(&parsed.value).map_err(|_| SdkError::InvalidIdentity("value"))?)
                .map_err(|_| SdkError::InvalidIdentity("value"))?;
            return Ok(Self::User { trustchain_id, user_id });
        }

        let target = ProvisionalTarget::parse(&parsed.target).ok_or(SdkError::InvalidIdentity("unknown identity target"))?;
        let hashed_value = Hash32::from_slice(&hash::hash(parsed.value.as_bytes())).expect("hash output is 32 bytes");
        Ok(Self::Provisional {
            trustchain_id,
            target,
            hashed_value,
        })
    }

    pub fn trustchain_id(&self) -> &Hash32 {
        match self {
            Self::User { trustchain_id, .. } => trustchain_id,
            Self::Provisional { trustchain_id, .. } => trustchain_id,
        }
    }
}

/// What a transport's `resolve_provisional` call hands back: the
/// target's app and tanker key pairs, public half only — exactly what
/// `tc_resources::sharing` needs to seal a resource key to an
/// unclaimed provisional identity (§6, "GetPublicProvisionalIdentity").
#[derive(Debug, Clone)]
pub struct ProvisionalPublicKeys {
    pub app_signature_public_key: SigPublicKey32,
    pub app_encryption_public_key: EncPublicKey32,
    pub tanker_signature_public_key: SigPublicKey32,
    pub tanker_encryption_public_key: EncPublicKey32,
}

// ---- Secret provisional identity (attachProvisionalIdentity, §4.8) ----

#[derive(Debug, Deserialize, Serialize)]
struct SecretProvisionalIdentityJson {
    trustchain_id: String,
    target: String,
    value: String,
    public_signature_key: String,
    private_signature_key: String,
    public_encryption_key: String,
    private_encryption_key: String,
}

/// The "app half" of a provisional identity: minted by the app backend
/// alongside the matching `PublicIdentity::Provisional` and handed to
/// whichever device is meant to claim it (out of band, e.g. over the
/// invite link). The matching "tanker half" is never carried in this
/// struct — it is derived locally from the verification code at
/// `verifyProvisionalIdentity` time (`derive_tanker_provisional_keys`),
/// the same way the Tanker server itself derives it, so that possession
/// of this JSON alone is never enough to claim the identity.
pub struct SecretProvisionalIdentity {
    pub trustchain_id: Hash32,
    pub target: ProvisionalTarget,
    /// The plaintext email/phone value, kept only long enough to build
    /// the `VerificationMethod` descriptor `attachProvisionalIdentity`
    /// reports back; never persisted.
    pub value: String,
    pub hashed_value: Hash32,
    pub app_signature_public_key: SigPublicKey32,
    pub app_signature_private_key: [u8; 64],
    pub app_encryption_public_key: EncPublicKey32,
    pub app_encryption_private_key: [u8; 32],
}

impl SecretProvisionalIdentity {
    pub fn parse(b64_json: &str) -> Result<Self, SdkError> {
        let raw = STANDARD
            .decode(b64_json)
            .map_err(|_| SdkError::InvalidIdentity("not valid base64"))?;
        let parsed: SecretProvisionalIdentityJson =
            serde_json::from_slice(&raw).map_err(|_| SdkError::InvalidIdentity("not valid identity JSON"))?;
        let trustchain_id = Hash32::from_slice(&STANDARD.decode(&parsed.trustchain_id).map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?)
            .map_err(|_| SdkError::InvalidIdentity("trustchain_id"))?;
        let target = ProvisionalTarget::parse(&parsed.target).ok_or(SdkError::InvalidIdentity("unknown identity target"))?;
        let hashed_value = Hash32::from_slice(&hash::hash(parsed.value.as_bytes())).expect("hash output is 32 bytes");

        let app_signature_public_key =
            SigPublicKey32::from_slice(&STANDARD.decode(&parsed.public_signature_key).map_err(|_| SdkError::InvalidIdentity("public_signature_key"))?)
                .map_err(|_| SdkError::InvalidIdentity("public_signature_key"))?;
        let app_encryption_public_key =
            EncPublicKey32::from_slice(&STANDARD.decode(&parsed.public_encryption_key).map_err(|_| SdkError::InvalidIdentity("public_encryption_key"))?)
                .map_err(|_| SdkError::InvalidIdentity("public_encryption_key"))?;

        let sig_priv = STANDARD
            .decode(&parsed.private_signature_key)
            .map_err(|_| SdkError::InvalidIdentity("private_signature_key"))?;
        let mut app_signature_private_key = [0u8; 64];
        if sig_priv.len() != 64 {
            return Err(SdkError::InvalidIdentity("private_signature_key"));
        }
        app_signature_private_key.copy_from_slice(&sig_priv);

        let enc_priv = STANDARD
            .decode(&parsed.private_encryption_key)
            .map_err(|_| SdkError::InvalidIdentity("private_encryption_key"))?;
        let mut app_encryption_private_key = [0u8; 32];
        if enc_priv.len() != 32 {
            return Err(SdkError::InvalidIdentity("private_encryption_key"));
        }
        app_encryption_private_key.copy_from_slice(&enc_priv);

        Ok(Self {
            trustchain_id,
            target,
            value: parsed.value,
            hashed_value,
            app_signature_public_key,
            app_signature_private_key,
            app_encryption_public_key,
            app_encryption_private_key,
        })
    }
}

/// Derive the "tanker half" of a provisional identity's key pairs from
/// its verification code — the proof of ownership, never the plaintext
/// email/phone value, so a party who only knows the target's public
/// identity can't reconstruct these. Two independent seeds from one
/// code via domain-separated `hash_parts`, the same derivation idiom
/// `tc_resources::stream` uses for its per-chunk nonce.
pub fn derive_tanker_provisional_keys(verification_code: &str) -> Result<(SigKeyPair, EncKeyPair), SdkError> {
    let sig_seed = hash_parts(&[verification_code.as_bytes(), b"tanker-provisional-signature"]);
    let enc_seed = hash_parts(&[verification_code.as_bytes(), b"tanker-provisional-encryption"]);
    let sig_pair = SigKeyPair::from_secret_bytes(&sig_seed).map_err(|_| SdkError::InvalidVerification)?;
    let enc_pair = EncKeyPair::from_secret_bytes(&enc_seed).map_err(|_| SdkError::InvalidVerification)?;
    Ok((sig_pair, enc_pair))
}

/// What `attachProvisionalIdentity`/`verifyProvisionalIdentity` report
/// back: whether the claim completed, or still needs a verification of
/// the given method before it can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachStatus {
    Ready,
    IdentityVerificationNeeded,
}

#[derive(Debug, Clone)]
pub struct AttachResult {
    pub status: AttachStatus,
    pub verification_method: Option<VerificationMethod>,
}

// ---- Verification methods ----

/// One of the shapes `registerIdentity`/`verifyIdentity` accept (§6).
/// `createGroup`'s "reject secret identities" rule has no bearing here:
/// this is the verification *method*, not a group member list.
///
/// `VerificationKey` reuses `tc_state::VerificationKey` directly — it
/// already owns the base64-of-JSON ghost-device key material format
/// (`ghost.rs`), so this layer doesn't duplicate it.
pub enum Verification {
    Passphrase(String),
    Email { email: String, verification_code: String },
    PhoneNumber { phone_number: String, verification_code: String },
    VerificationKey(tc_state::VerificationKey),
    OidcIdToken(String),
    E2ePassphrase(String),
}

pub fn parse_verification_key(b64: &str) -> Result<tc_state::VerificationKey, SdkError> {
    tc_state::VerificationKey::from_base64(b64).map_err(|_| SdkError::InvalidVerification)
}

/// What `getVerificationMethods` hands back: the registered method's
/// shape, without ever re-exposing a secret (a passphrase or
/// verification code is write-only once registered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMethod {
    Passphrase,
    Email { email: String },
    PhoneNumber { phone_number: String },
    OidcIdToken,
    E2ePassphrase,
}

impl VerificationMethod {
    /// `None` for `Verification::VerificationKey`: a verification key is
    /// never itself registered as a verification *method* (§6), so it
    /// has no descriptor shape to report back.
    pub fn from_verification(verification: &Verification) -> Option<Self> {
        Some(match verification {
            Verification::Passphrase(_) => Self::Passphrase,
            Verification::Email { email, .. } => Self::Email { email: email.clone() },
            Verification::PhoneNumber { phone_number, .. } => Self::PhoneNumber {
                phone_number: phone_number.clone(),
            },
            Verification::OidcIdToken(_) => Self::OidcIdToken,
            Verification::E2ePassphrase(_) => Self::E2ePassphrase,
            Verification::VerificationKey(_) => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_key_roundtrips_through_tc_state() {
        let (vk, ghost) = tc_state::VerificationKey::generate();
        let encoded = vk.to_base64();
        let decoded = parse_verification_key(&encoded).unwrap();
        let reconstituted = decoded.reconstitute().unwrap();
        assert_eq!(reconstituted.signature_key().public(), ghost.signature_key().public());
    }

    #[test]
    fn corrupted_verification_key_is_invalid_verification_not_a_decode_error() {
        let err = parse_verification_key("not-base64-json-at-all").unwrap_err();
        assert!(matches!(err, SdkError::InvalidVerification));
    }

    #[test]
    fn public_identity_hashes_provisional_value() {
        let json = serde_json::json!({
            "trustchain_id": STANDARD.encode([1u8; 32]),
            "target": "email",
            "value": "alice@example.com",
        });
        let b64 = STANDARD.encode(serde_json::to_vec(&json).unwrap());
        let identity = PublicIdentity::parse(&b64).unwrap();
        match identity {
            PublicIdentity::Provisional { target, hashed_value, .. } => {
                assert_eq!(target, ProvisionalTarget::Email);
                assert_eq!(hashed_value, Hash32::from_slice(&hash::hash(b"alice@example.com")).unwrap());
            }
            _ => panic!("expected provisional identity"),
        }
    }
}
