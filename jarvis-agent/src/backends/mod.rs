// ABOUTME: Backend implementations for the AgentInvoker trait.
// ABOUTME: Includes the Claude CLI process runner and a scripted mock for tests.

pub mod claude_cli;
pub mod mock;

pub use claude_cli::{ClaudeCliConfig, ClaudeCliInvoker};
pub use mock::MockInvoker;
