// ABOUTME: Platform-agnostic message pipeline for the jarvis assistant
// ABOUTME: Admission, sessions, per-user gates, and the dispatch loop around the agent

pub mod admission;
pub mod archive;
pub mod config;
pub mod dispatcher;
pub mod media;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod outbound;
pub mod paths;
pub mod restart;
pub mod session;
pub mod store;
pub mod traits;

pub use admission::{Admission, AdmissionFilter, AdmissionGuard, DuplicateReason};
pub use archive::{ArchivedMessage, MessageArchive, SYSTEM_SENDER};
pub use config::Config;
pub use dispatcher::{GateOutcome, PendingEntry, TurnInput, UserDispatcher};
pub use media::TempMedia;
pub use message::{InboundMessage, MessageKind};
pub use orchestrator::{HandleResult, Orchestrator, OrchestratorConfig};
pub use restart::RestartSignal;
pub use session::{Session, SessionRegistry, SESSION_TIMEOUT};
pub use traits::{MediaBlob, Transcriber, Transport};

// Re-export the agent layer so callers need only one dependency
pub use jarvis_agent::{AgentError, AgentInvoker, AgentOutcome, AgentRequest, ResultSchema};
