//! Per-session configuration: which trustchain this session talks to
//! and where its local store lives.

use tc_wire::fields::{Hash32, SigPublicKey32};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub app_id: Hash32,
    pub trustchain_public_signature_key: SigPublicKey32,
    /// One key-value database per `(app_id, user_id, prefix)` triple
    /// (§6): the caller names its own prefix to distinguish sessions
    /// sharing one process (e.g. multiple test users in one run).
    pub store_prefix: String,
    pub url: Option<String>,
}

impl SessionConfig {
    pub fn new(app_id: Hash32, trustchain_public_signature_key: SigPublicKey32, store_prefix: impl Into<String>) -> Self {
        Self {
            app_id,
            trustchain_public_signature_key,
            store_prefix: store_prefix.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
