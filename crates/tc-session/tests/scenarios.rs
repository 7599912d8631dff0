//! End-to-end scenarios (§8): a minimal in-memory trustchain server and
//! transport double drive the orchestrator the way a real app backend
//! and HTTP transport would, mirroring the fixture shape of
//! `tc-verifier::rules::tests::bootstrap`/`make_device_creation`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};

use tc_primitives::seal::EncKeyPair;
use tc_primitives::sign::SigKeyPair;
use tc_resources::PaddingStep;
use tc_state::VerificationKey;
use tc_store::MemoryBackend;
use tc_wire::block::{create_block, create_root_block};
use tc_wire::fields::{EncPublicKey32, Hash32, Sealed, SigPublicKey32};
use tc_wire::nature::Nature;
use tc_wire::payloads::device::{DeviceCreationV3, SealedUserKeyPair};

use tc_session::identity::{derive_tanker_provisional_keys, ProvisionalPublicKeys};
use tc_session::{
    AttachStatus, PublicIdentity, ProvisionalTarget, SdkError, SecretIdentity, Session, SessionConfig, Status, Transport, Verification,
    VerificationMethod,
};

// ---- fixture: an in-memory trustchain server ----

struct TestServer {
    blocks: Mutex<Vec<String>>,
    provisional: Mutex<Vec<(Hash32, ProvisionalTarget, ProvisionalPublicKeys)>>,
    verification_methods: Mutex<Vec<(Hash32, VerificationMethod)>>,
}

impl TestServer {
    fn new(root_block_b64: String) -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(vec![root_block_b64]),
            provisional: Mutex::new(Vec::new()),
            verification_methods: Mutex::new(Vec::new()),
        })
    }

    fn register_provisional(&self, hashed_value: Hash32, target: ProvisionalTarget, keys: ProvisionalPublicKeys) {
        self.provisional.lock().unwrap().push((hashed_value, target, keys));
    }

    fn push_raw(&self, block: String) {
        self.blocks.lock().unwrap().push(block);
    }
}

struct SharedTransport(Arc<TestServer>);

#[async_trait]
impl Transport for SharedTransport {
    async fn push(&self, blocks: Vec<String>) -> Result<(), SdkError> {
        self.0.blocks.lock().unwrap().extend(blocks);
        Ok(())
    }

    async fn pull(&self, since_index: u64) -> Result<Vec<String>, SdkError> {
        let blocks = self.0.blocks.lock().unwrap();
        Ok(blocks.iter().skip(since_index as usize).cloned().collect())
    }

    async fn resolve_provisional(&self, hashed_value: &Hash32, target: ProvisionalTarget) -> Result<Option<ProvisionalPublicKeys>, SdkError> {
        let provisional = self.0.provisional.lock().unwrap();
        Ok(provisional
            .iter()
            .find(|(h, t, _)| h == hashed_value && *t == target)
            .map(|(_, _, keys)| keys.clone()))
    }

    async fn set_verification_method(&self, user_id: &Hash32, method: VerificationMethod) -> Result<(), SdkError> {
        let mut methods = self.0.verification_methods.lock().unwrap();
        methods.retain(|(u, _)| u != user_id);
        methods.push((user_id.clone(), method));
        Ok(())
    }

    async fn get_verification_methods(&self, user_id: &Hash32) -> Result<Vec<VerificationMethod>, SdkError> {
        let methods = self.0.verification_methods.lock().unwrap();
        Ok(methods.iter().filter(|(u, _)| u == user_id).map(|(_, m)| m.clone()).collect())
    }
}

// ---- fixture: the app backend, minting trustchains and identities ----

struct Trustchain {
    key: SigKeyPair,
    id: Hash32,
    root_block_b64: String,
}

fn bootstrap_trustchain() -> Trustchain {
    let key = SigKeyPair::generate();
    let root = create_root_block(&key.public());
    let id = Hash32::from_slice(&root.hash).unwrap();
    Trustchain {
        key,
        id,
        root_block_b64: root.serialized_base64,
    }
}

fn delegation_data(ephemeral: &SigPublicKey32, user_id: &Hash32) -> Vec<u8> {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(ephemeral.as_bytes());
    data.extend_from_slice(user_id.as_bytes());
    data
}

/// Mirrors `tc_verifier::rules::tests::make_device_creation`: builds and
/// self-signs a `device_creation_v3` record delegated by `delegator`.
#[allow(clippy::too_many_arguments)]
fn make_device_creation(
    ephemeral: &SigKeyPair,
    user_id: &Hash32,
    delegator: &SigKeyPair,
    device_key: &SigKeyPair,
    device_enc: &EncKeyPair,
    user_key_public: EncPublicKey32,
    user_key_secret: &[u8; 32],
    is_ghost: bool,
) -> DeviceCreationV3 {
    let ephemeral_public_signature_key = SigPublicKey32(ephemeral.public().0);
    let delegation_signature = delegator.sign(&delegation_data(&ephemeral_public_signature_key, user_id)).0;
    let sealed_private = tc_primitives::seal::seal_key(&device_enc.public(), user_key_secret).unwrap();

    let mut record = DeviceCreationV3 {
        ephemeral_public_signature_key,
        user_id: user_id.clone(),
        delegation_signature,
        public_signature_key: SigPublicKey32(device_key.public().0),
        public_encryption_key: EncPublicKey32(device_enc.public().0),
        user_key_pair: SealedUserKeyPair {
            public: user_key_public,
            sealed_private: Sealed::sealed_enc_private_key(&sealed_private).unwrap(),
        },
        is_ghost,
        self_signature: [0u8; 64],
    };
    record.self_signature = device_key.sign(&record.sign_data()).0;
    record
}

/// Mints a `SecretIdentity` the way the app backend would: generates a
/// ghost verification key, signs its `device_creation_v3` under the
/// trustchain key, and hands back both the identity and the ghost's
/// verification key (to be passed back in as `Verification::VerificationKey`).
fn mint_identity(chain: &Trustchain, user_id: Hash32) -> (SecretIdentity, VerificationKey, EncKeyPair) {
    let (vk, ghost) = VerificationKey::generate();
    let ghost_ephemeral = SigKeyPair::generate();
    let user_enc = EncKeyPair::generate();

    let ghost_record = make_device_creation(
        &ghost_ephemeral,
        &user_id,
        &chain.key,
        ghost.signature_key(),
        ghost.encryption_key(),
        EncPublicKey32(user_enc.public().0),
        user_enc.secret_bytes(),
        true,
    );
    let ghost_block = create_block(ghost_record.encode(), Nature::DeviceCreationV3, chain.id.clone(), chain.id.clone(), &chain.key);

    let identity = SecretIdentity {
        trustchain_id: chain.id.clone(),
        user_id,
        ghost_device_block: ghost_block.serialized_base64,
    };
    (identity, vk, user_enc)
}

fn clone_vk(vk: &VerificationKey) -> VerificationKey {
    VerificationKey {
        signature_seed: vk.signature_seed,
        encryption_secret: vk.encryption_secret,
    }
}

fn new_session(chain: &Trustchain, server: &Arc<TestServer>, prefix: &str) -> Session<MemoryBackend> {
    let config = SessionConfig::new(Hash32::from_slice(&[9u8; 32]).unwrap(), SigPublicKey32(chain.key.public().0), prefix);
    Session::new(config, Box::new(SharedTransport(server.clone())), MemoryBackend::new())
}

fn user_id(byte: u8) -> Hash32 {
    Hash32::from_slice(&[byte; 32]).unwrap()
}

// ---- scenario 1: create user, encrypt, decrypt ----

#[tokio::test]
async fn create_user_encrypt_decrypt_roundtrip() {
    let chain = bootstrap_trustchain();
    let server = TestServer::new(chain.root_block_b64.clone());
    let (identity, vk, _user_enc) = mint_identity(&chain, user_id(1));

    let session = new_session(&chain, &server, "alice");
    let mut events = session.subscribe();

    let status = session.start(&identity).await.unwrap();
    assert_eq!(status, Status::RegistrationNeeded);

    session.register_identity(&identity, Verification::VerificationKey(vk)).await.unwrap();
    assert_eq!(session.status().await, Status::Ready);

    let framed = session
        .encrypt_data(
            b"Rosebud",
            PaddingStep::Off,
            &[PublicIdentity::User {
                trustchain_id: chain.id.clone(),
                user_id: identity.user_id.clone(),
            }],
            &[],
        )
        .await
        .unwrap();
    let plaintext = session.decrypt_data(&framed).await.unwrap();
    assert_eq!(plaintext, b"Rosebud");

    // At least one NewBlockAvailable event fired over the course of
    // register_identity + encrypt_data's catch-up calls.
    assert!(events.try_recv().is_ok());
}

// ---- scenario 2: second device ----

#[tokio::test]
async fn second_device_verifies_and_shares_with_first() {
    let chain = bootstrap_trustchain();
    let server = TestServer::new(chain.root_block_b64.clone());
    let (identity, vk, _user_enc) = mint_identity(&chain, user_id(2));

    let device_a = new_session(&chain, &server, "a");
    device_a.start(&identity).await.unwrap();
    device_a
        .register_identity(&identity, Verification::VerificationKey(clone_vk(&vk)))
        .await
        .unwrap();

    let device_b = new_session(&chain, &server, "b");
    let status = device_b.start(&identity).await.unwrap();
    assert_eq!(status, Status::VerificationNeeded);
    device_b.verify_identity(&identity, Verification::VerificationKey(vk)).await.unwrap();
    assert_eq!(device_b.status().await, Status::Ready);

    // Ghost device + device A's real device + device B's real device.
    let devices_from_a = device_a.get_device_list().await.unwrap();
    let devices_from_b = device_b.get_device_list().await.unwrap();
    assert_eq!(devices_from_a.iter().filter(|d| !d.is_revoked).count(), 3);
    assert_eq!(devices_from_b.iter().filter(|d| !d.is_revoked).count(), 3);

    let framed = device_a
        .encrypt_data(
            b"cross-device",
            PaddingStep::Off,
            &[PublicIdentity::User {
                trustchain_id: chain.id.clone(),
                user_id: identity.user_id.clone(),
            }],
            &[],
        )
        .await
        .unwrap();
    assert_eq!(device_b.decrypt_data(&framed).await.unwrap(), b"cross-device");
}

// ---- scenario 3: group share ----

#[tokio::test]
async fn group_share_reaches_member() {
    let chain = bootstrap_trustchain();
    let server = TestServer::new(chain.root_block_b64.clone());

    let (identity_a, vk_a, _) = mint_identity(&chain, user_id(10));
    let (identity_b, vk_b, _) = mint_identity(&chain, user_id(11));

    let session_a = new_session(&chain, &server, "group-a");
    session_a.start(&identity_a).await.unwrap();
    session_a.register_identity(&identity_a, Verification::VerificationKey(vk_a)).await.unwrap();

    let session_b = new_session(&chain, &server, "group-b");
    session_b.start(&identity_b).await.unwrap();
    session_b.register_identity(&identity_b, Verification::VerificationKey(vk_b)).await.unwrap();

    let group_id = session_a
        .create_group(&[PublicIdentity::User {
            trustchain_id: chain.id.clone(),
            user_id: identity_b.user_id.clone(),
        }])
        .await
        .unwrap();

    let framed = session_a
        .encrypt_data(b"Stronger", PaddingStep::Off, &[], &[group_id])
        .await
        .unwrap();

    // session_b must catch up on its own before it can see the
    // key_publish_to_user_group block session_a just pushed.
    let plaintext = session_b.decrypt_data(&framed).await.unwrap();
    assert_eq!(plaintext, b"Stronger");
}

// ---- scenario 4: provisional identity claim ----

/// Builds the base64-of-JSON `SecretProvisionalIdentity` shape the app
/// backend would mint alongside the matching `PublicIdentity::Provisional`,
/// mirroring `SecretProvisionalIdentityJson` in `tc_session::identity`.
fn mint_secret_provisional_identity(
    chain: &Trustchain,
    target: &str,
    value: &str,
    app_sig: &SigKeyPair,
    app_enc: &EncKeyPair,
) -> String {
    let mut sig_priv = Vec::with_capacity(64);
    sig_priv.extend_from_slice(app_sig.secret_bytes());
    sig_priv.extend_from_slice(&app_sig.public().0);

    let json = serde_json::json!({
        "trustchain_id": STANDARD.encode(chain.id.as_bytes()),
        "target": target,
        "value": value,
        "public_signature_key": STANDARD.encode(app_sig.public().0),
        "private_signature_key": STANDARD.encode(&sig_priv),
        "public_encryption_key": STANDARD.encode(app_enc.public().0),
        "private_encryption_key": STANDARD.encode(app_enc.secret_bytes()),
    });
    STANDARD.encode(serde_json::to_vec(&json).unwrap())
}

fn mint_public_provisional_identity(chain: &Trustchain, target: &str, value: &str) -> String {
    let json = serde_json::json!({
        "trustchain_id": STANDARD.encode(chain.id.as_bytes()),
        "target": target,
        "value": value,
    });
    STANDARD.encode(serde_json::to_vec(&json).unwrap())
}

#[tokio::test]
async fn provisional_identity_is_attached_verified_and_decrypts_shared_resource() {
    let chain = bootstrap_trustchain();
    let server = TestServer::new(chain.root_block_b64.clone());

    let (identity_a, vk_a, _) = mint_identity(&chain, user_id(30));
    let session_a = new_session(&chain, &server, "provisional-a");
    session_a.start(&identity_a).await.unwrap();
    session_a.register_identity(&identity_a, Verification::VerificationKey(vk_a)).await.unwrap();

    // The app backend mints the provisional identity's app half and
    // registers its full public key quartet (app + tanker) with the
    // server, the tanker half derived the same way the claim itself
    // will re-derive it from the verification code.
    let app_sig = SigKeyPair::generate();
    let app_enc = EncKeyPair::generate();
    let verification_code = "123456";
    let (tanker_sig, tanker_enc) = derive_tanker_provisional_keys(verification_code).unwrap();

    let public_identity_b64 = mint_public_provisional_identity(&chain, "email", "bob@example.com");
    let public_identity = PublicIdentity::parse(&public_identity_b64).unwrap();
    let hashed_value = match &public_identity {
        PublicIdentity::Provisional { hashed_value, .. } => hashed_value.clone(),
        _ => panic!("expected a provisional identity"),
    };
    server.register_provisional(
        hashed_value,
        ProvisionalTarget::Email,
        ProvisionalPublicKeys {
            app_signature_public_key: SigPublicKey32(app_sig.public().0),
            app_encryption_public_key: EncPublicKey32(app_enc.public().0),
            tanker_signature_public_key: SigPublicKey32(tanker_sig.public().0),
            tanker_encryption_public_key: EncPublicKey32(tanker_enc.public().0),
        },
    );

    let framed = session_a
        .encrypt_data(b"claim me", PaddingStep::Off, &[public_identity], &[])
        .await
        .unwrap();

    // The claiming user registers a fresh device, then attaches and
    // verifies the provisional identity on it.
    let (identity_b, vk_b, _) = mint_identity(&chain, user_id(31));
    let session_b = new_session(&chain, &server, "provisional-b");
    session_b.start(&identity_b).await.unwrap();
    session_b.register_identity(&identity_b, Verification::VerificationKey(vk_b)).await.unwrap();

    let secret_provisional_b64 = mint_secret_provisional_identity(&chain, "email", "bob@example.com", &app_sig, &app_enc);
    let attach_result = session_b.attach_provisional_identity(&secret_provisional_b64).await.unwrap();
    assert_eq!(attach_result.status, AttachStatus::IdentityVerificationNeeded);
    assert_eq!(attach_result.verification_method, Some(VerificationMethod::Email { email: "bob@example.com".to_string() }));

    session_b
        .verify_provisional_identity(Verification::Email {
            email: "bob@example.com".to_string(),
            verification_code: verification_code.to_string(),
        })
        .await
        .unwrap();

    let plaintext = session_b.decrypt_data(&framed).await.unwrap();
    assert_eq!(plaintext, b"claim me");
}

// ---- scenario 5: padding boundary ----

#[test]
fn padding_boundary_matches_spec_example() {
    use tc_resources::padding::padded_length;
    assert_eq!(padded_length(23, PaddingStep::Auto), 24);
    let stepped = padded_length(23, PaddingStep::Step(13));
    assert_eq!(stepped % 13, 0);
}

// ---- scenario 6: unknown block version is rejected ----

#[tokio::test]
async fn unknown_block_version_is_rejected_without_mutating_state() {
    let chain = bootstrap_trustchain();
    let server = TestServer::new(chain.root_block_b64.clone());
    let (identity, vk, _user_enc) = mint_identity(&chain, user_id(20));

    let session = new_session(&chain, &server, "versions");
    session.start(&identity).await.unwrap();
    session.register_identity(&identity, Verification::VerificationKey(vk)).await.unwrap();

    // Hand-roll a block whose version byte is 99: any well-formed
    // varint(99) followed by a root-shaped body will do, since decoding
    // must fail at the version check before anything else is read.
    let mut bogus = vec![99u8];
    bogus.extend_from_slice(&[0u8; 32 + 1 + 4 + 32 + 64]);
    server.push_raw(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bogus));

    let err = session
        .encrypt_data(b"after-bogus-block", PaddingStep::Off, &[], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::UpgradeRequired));
}
