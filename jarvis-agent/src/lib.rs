// ABOUTME: Claude CLI invocation layer for jarvis.
// ABOUTME: Builds requests, runs the agent process, and normalizes its structured result.

pub mod error;
pub mod locate;
pub mod prompt;
pub mod request;
pub mod schema;
pub mod traits;

pub mod backends;

pub use error::AgentError;
pub use request::{AgentRequest, DISALLOWED_TOOLS};
pub use schema::{AgentOutcome, ResultSchema};
pub use traits::AgentInvoker;
