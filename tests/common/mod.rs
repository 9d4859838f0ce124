//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cursor_relay::client::{ScriptEvaluator, ScriptTemplate};
use cursor_relay::{Error, ErrorContext, RelayClientBuilder};
use mockito::{Server, ServerGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Evaluator stub: returns `token-<n>` for the n-th call and records the source.
/// Queued outputs are returned first, one per call.
#[derive(Default)]
pub struct CountingEvaluator {
    calls: AtomicUsize,
    fail: AtomicBool,
    last_source: Mutex<String>,
    queued: Mutex<VecDeque<String>>,
}

impl CountingEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn queue_output(&self, output: &str) {
        self.queued.lock().unwrap().push_back(output.to_string());
    }

    pub fn last_source(&self) -> String {
        self.last_source.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptEvaluator for CountingEvaluator {
    async fn evaluate(&self, source: &str) -> cursor_relay::Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_source.lock().unwrap() = source.to_string();
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::token_with_context(
                "stub evaluator failure",
                ErrorContext::new().with_source("stub"),
            ));
        }
        if let Some(output) = self.queued.lock().unwrap().pop_front() {
            return Ok(output);
        }
        Ok(format!("token-{}", n))
    }
}

/// Template that exposes the user agent and the spliced upstream script.
pub fn test_template() -> ScriptTemplate {
    ScriptTemplate::new("ua=$$userAgent$$;body=$$cursor_jscode$$", "")
}

/// Test fixture that manages a mock server
pub struct MockUpstream {
    pub server: ServerGuard,
}

impl MockUpstream {
    pub async fn new() -> Self {
        Self {
            server: Server::new_async().await,
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.server.url())
    }

    pub fn script_url(&self) -> String {
        format!("{}/script.js", self.server.url())
    }

    /// Builder pointed at the mock server with millisecond backoff.
    pub fn builder(&self, evaluator: Arc<CountingEvaluator>) -> RelayClientBuilder {
        RelayClientBuilder::new()
            .template(test_template())
            .evaluator(evaluator)
            .upstream_url_override(self.chat_url())
            .backoff_unit(Duration::from_millis(5))
    }
}

/// SSE body from JSON frames.
pub fn sse_body(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|f| format!("data: {}\n\n", f))
        .collect::<Vec<_>>()
        .join("")
}
