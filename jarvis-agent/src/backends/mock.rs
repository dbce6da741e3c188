// ABOUTME: Mock backend for testing - returns scripted outcomes and records every request.
// ABOUTME: Can hold invocations until released and tracks per-recipient concurrency.
//!
//! # Example
//!
//! ```no_run
//! use jarvis_agent::backends::mock::{outcome, MockInvoker};
//! use jarvis_agent::{AgentInvoker, AgentRequest};
//!
//! # async fn example() {
//! let mock = MockInvoker::new()
//!     .then_reply(outcome(false, Some("S1")))
//!     .then_reply(outcome(true, Some("S1")));
//!
//! let first = mock.invoke(AgentRequest::conversation("hi", "u1")).await.unwrap();
//! assert_eq!(first.continuation_token.as_deref(), Some("S1"));
//! assert_eq!(mock.requests().len(), 1);
//! # }
//! ```

use crate::error::AgentError;
use crate::request::AgentRequest;
use crate::schema::AgentOutcome;
use crate::traits::AgentInvoker;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Plain outcome with the given finished flag and continuation token
pub fn outcome(finished: bool, token: Option<&str>) -> AgentOutcome {
    AgentOutcome {
        finished,
        restart_requested: false,
        skipped: false,
        timed_out: false,
        raw_output: "{}".to_string(),
        continuation_token: token.map(str::to_string),
    }
}

/// Outcome asking for a process restart
pub fn restart_outcome(token: Option<&str>) -> AgentOutcome {
    AgentOutcome {
        restart_requested: true,
        ..outcome(false, token)
    }
}

/// Scripted invoker for deterministic tests
pub struct MockInvoker {
    script: Mutex<VecDeque<Result<AgentOutcome, AgentError>>>,
    fallback: AgentOutcome,
    requests: Mutex<Vec<AgentRequest>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    concurrency: Mutex<Concurrency>,
}

#[derive(Default)]
struct Concurrency {
    current: HashMap<String, usize>,
    peak: HashMap<String, usize>,
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInvoker {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome(false, None),
            requests: Mutex::new(Vec::new()),
            delay: None,
            gate: None,
            concurrency: Mutex::new(Concurrency::default()),
        }
    }

    /// Queue a successful outcome for the next unscripted call
    pub fn then_reply(self, outcome: AgentOutcome) -> Self {
        self.lock_script().push_back(Ok(outcome));
        self
    }

    /// Queue a failure for the next unscripted call
    pub fn then_fail(self, error: AgentError) -> Self {
        self.lock_script().push_back(Err(error));
        self
    }

    /// Outcome returned once the script is exhausted
    pub fn otherwise(mut self, outcome: AgentOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call wait for a permit; returns the semaphore to release them
    pub fn held(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Requests seen so far, in call order
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Highest number of simultaneous calls observed for one recipient
    pub fn peak_concurrency(&self, recipient: &str) -> usize {
        self.concurrency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .peak
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }

    /// Poll until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<AgentOutcome, AgentError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, recipient: &str) {
        let mut c = self.concurrency.lock().unwrap_or_else(|e| e.into_inner());
        let current = c.current.entry(recipient.to_string()).or_insert(0);
        *current += 1;
        let now = *current;
        let peak = c.peak.entry(recipient.to_string()).or_insert(0);
        *peak = (*peak).max(now);
    }

    fn leave(&self, recipient: &str) {
        let mut c = self.concurrency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = c.current.get_mut(recipient) {
            *current = current.saturating_sub(1);
        }
    }
}

#[async_trait]
impl AgentInvoker for MockInvoker {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn invoke(&self, request: AgentRequest) -> Result<AgentOutcome, AgentError> {
        let recipient = request.recipient.clone().unwrap_or_default();
        self.enter(&recipient);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.lock_script().pop_front();
        self.leave(&recipient);
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
