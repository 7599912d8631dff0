//! The transport seam: the orchestrator never talks to a network
//! library directly, only to this trait object, so embedders can wire
//! up HTTP, a local test double, or anything else that can push and
//! pull opaque serialized blocks.

use async_trait::async_trait;

use tc_wire::fields::Hash32;

use crate::error::SdkError;
use crate::identity::{ProvisionalPublicKeys, ProvisionalTarget, VerificationMethod};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Push newly authored blocks (serialized, base64 per §6) to the
    /// trustchain server. Either all of `blocks` are accepted, or none
    /// are and the whole call fails — the server assigns indices
    /// atomically.
    async fn push(&self, blocks: Vec<String>) -> Result<(), SdkError>;

    /// Pull every block strictly after `since_index`, in server order.
    /// Used for the catch-up read every state-changing operation
    /// performs before consulting local state.
    async fn pull(&self, since_index: u64) -> Result<Vec<String>, SdkError>;

    /// Resolve a provisional identity's current public key quartet
    /// ("GetPublicProvisionalIdentity"): `encrypt`/`share` need this to
    /// address a recipient who hasn't claimed their identity yet, since
    /// `tc_resources::sharing` only knows about registry state already
    /// folded from the chain. `None` means the app backend has never
    /// heard of this hashed value.
    async fn resolve_provisional(
        &self,
        hashed_value: &Hash32,
        target: ProvisionalTarget,
    ) -> Result<Option<ProvisionalPublicKeys>, SdkError>;

    /// Register (or replace) the app backend's record of a verification
    /// method for `user_id` — the out-of-band side channel §6's
    /// `setVerificationMethod` relies on (sending the email/SMS code,
    /// storing the passphrase hash, ...). The orchestrator only forwards
    /// the descriptor; it never keeps a server-side copy itself.
    async fn set_verification_method(&self, user_id: &Hash32, method: VerificationMethod) -> Result<(), SdkError>;

    /// The verification methods currently registered for `user_id`.
    async fn get_verification_methods(&self, user_id: &Hash32) -> Result<Vec<VerificationMethod>, SdkError>;
}
