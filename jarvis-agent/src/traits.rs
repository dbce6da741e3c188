// ABOUTME: Core AgentInvoker trait that every backend implements.
// ABOUTME: One call = one agent turn, returning a normalized outcome or a typed error.

use crate::error::AgentError;
use crate::request::AgentRequest;
use crate::schema::AgentOutcome;
use async_trait::async_trait;

/// Runs one agent turn.
///
/// Implementations own process lifecycle and timeouts; callers only see the
/// normalized outcome. A timed-out turn is an `Ok` outcome with `finished` set.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    async fn invoke(&self, request: AgentRequest) -> Result<AgentOutcome, AgentError>;
}
