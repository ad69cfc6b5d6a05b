//! Activity contract
//!
//! An activity wraps one idempotent remote operation. It is the only place a
//! workflow may touch the network, the clock or any other source of
//! non-determinism; the orchestrator only sees its recorded outcome.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use workflow_types::ActivityError;

/// A unit of retryable, timeout-bounded work
///
/// Implementations must be idempotent: an invocation may be repeated by a
/// retry policy or after a restart, and repeating a completed operation has
/// to report success again.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Stable registration name, recorded in history
    const NAME: &'static str;

    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    /// Resource the invocation acts on, used to tag failures.
    fn target(&self, _input: &Self::Input) -> String {
        String::new()
    }

    async fn execute(&self, input: Self::Input) -> Result<Self::Output, ActivityError>;
}
