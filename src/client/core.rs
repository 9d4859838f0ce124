use crate::client::budget::truncate_messages;
use crate::client::fingerprint::FingerprintStore;
use crate::client::models::convert_model_name;
use crate::client::payload::{to_upstream_messages, SubmissionPayload, UpstreamMessage};
use crate::client::policy::{upstream_error, AttemptState, Decision, Outcome, PolicyEngine};
use crate::client::token::TokenCache;
use crate::config::RelayConfig;
use crate::relay::{EventStream, StreamRelay};
use crate::transport::HttpTransport;
use crate::types::message::Message;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Relay client: turns a conversation into a live upstream event stream.
///
/// Cheap to share behind an `Arc`; the token cache, fingerprint and HTTP session are
/// process-wide state used by every request.
pub struct RelayClient {
    pub(crate) config: RelayConfig,
    pub(crate) transport: Arc<HttpTransport>,
    pub(crate) fingerprint: Arc<FingerprintStore>,
    pub(crate) tokens: Arc<TokenCache>,
    pub(crate) relay: StreamRelay,
    pub(crate) policy: PolicyEngine,
    pub(crate) origin: String,
}

/// Result of one submission that reached the upstream.
enum Submitted {
    Accepted(reqwest::Response),
    Rejected(reqwest::Response),
}

impl RelayClient {
    /// Create a client from configuration, loading the script template from
    /// `config.script_dir` and evaluating with `node`.
    pub fn new(config: RelayConfig) -> Result<Self> {
        crate::client::builder::RelayClientBuilder::new()
            .config(config)
            .build()
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RelayConfig::from_env())
    }

    /// Create a chat request builder.
    pub fn chat(&self) -> crate::client::chat::ChatRequestBuilder<'_> {
        crate::client::chat::ChatRequestBuilder::new(self)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &FingerprintStore {
        &self.fingerprint
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    /// Submit `messages` to `model` and return the upstream event stream.
    ///
    /// Runs the attempt state machine: transport failures, token failures and a 403
    /// are retried within the attempt budget; any other non-success status is
    /// surfaced at once. Cancelling `cancel` aborts the in-flight call or backoff and,
    /// once streaming, closes the stream.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<EventStream> {
        let started = Instant::now();
        let client_request_id = Uuid::new_v4().to_string();
        let trimmed = truncate_messages(messages, self.config.max_input_length);
        if trimmed.len() != messages.len() {
            debug!(
                before = messages.len(),
                after = trimmed.len(),
                "conversation trimmed to input budget"
            );
        }
        let upstream_model = convert_model_name(model);
        let upstream_messages =
            to_upstream_messages(&trimmed, self.config.system_prompt_inject.as_deref());

        let mut state = AttemptState::Attempting { attempt: 1 };
        loop {
            state = match state {
                AttemptState::Attempting { attempt } => {
                    match self
                        .submit(&upstream_model, &upstream_messages, attempt, cancel)
                        .await
                    {
                        Ok(Submitted::Accepted(resp)) => AttemptState::Success(resp),
                        Ok(Submitted::Rejected(resp)) => {
                            let status = resp.status().as_u16();
                            let decision = self.policy.classify(Outcome::Status(status), attempt);
                            let body = drain(resp).await;
                            match decision {
                                Decision::Retry {
                                    delay,
                                    refresh_identity,
                                } => {
                                    warn!(
                                        client_request_id = %client_request_id,
                                        http_status = status,
                                        attempt,
                                        "upstream rejected attempt, retrying"
                                    );
                                    AttemptState::Backoff {
                                        attempt,
                                        delay,
                                        refresh_identity,
                                    }
                                }
                                Decision::Fail(kind) => {
                                    error!(
                                        client_request_id = %client_request_id,
                                        http_status = status,
                                        attempt,
                                        kind = kind.as_str(),
                                        body_len = body.len(),
                                        "upstream returned non-success status"
                                    );
                                    return Err(upstream_error(status, &body));
                                }
                            }
                        }
                        Err(err) => match self.policy.classify(Outcome::Error(&err), attempt) {
                            Decision::Retry {
                                delay,
                                refresh_identity,
                            } => {
                                warn!(
                                    client_request_id = %client_request_id,
                                    error = %err,
                                    attempt,
                                    max_attempts = self.policy.max_attempts,
                                    "attempt failed, retrying"
                                );
                                AttemptState::Backoff {
                                    attempt,
                                    delay,
                                    refresh_identity,
                                }
                            }
                            Decision::Fail(kind) => {
                                debug!(
                                    client_request_id = %client_request_id,
                                    kind = kind.as_str(),
                                    attempt,
                                    "giving up"
                                );
                                return Err(err);
                            }
                        },
                    }
                }
                AttemptState::Backoff {
                    attempt,
                    delay,
                    refresh_identity,
                } => {
                    if refresh_identity {
                        let profile = self.fingerprint.refresh();
                        self.tokens.invalidate().await;
                        warn!(
                            platform = %profile.platform,
                            chrome_version = %profile.chrome_version,
                            "access denied, refreshed fingerprint and cleared token cache"
                        );
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.policy.after_backoff(attempt)
                }
                AttemptState::Success(resp) => {
                    info!(
                        client_request_id = %client_request_id,
                        model = %upstream_model,
                        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "upstream accepted request"
                    );
                    return Ok(self.relay.spawn_response(resp, cancel));
                }
                AttemptState::Exhausted => {
                    warn!(
                        client_request_id = %client_request_id,
                        max_attempts = self.policy.max_attempts,
                        "attempt budget exhausted"
                    );
                    return Err(Error::Exhausted {
                        attempts: self.policy.max_attempts,
                    })
                }
            };
        }
    }

    async fn submit(
        &self,
        model: &str,
        messages: &[UpstreamMessage],
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Submitted> {
        let token = self
            .tokens
            .acquire(cancel)
            .await
            .map_err(|e| with_attempt(e, attempt))?;

        // Snapshot taken after the token so a refresh between the two is picked up.
        let profile = self.fingerprint.current();
        let headers = profile.chat_headers(&token, &self.origin)?;
        let body = SubmissionPayload::new(model, messages.to_vec()).to_bytes()?;

        debug!(
            model,
            attempt,
            payload_len = body.len(),
            token_len = token.len(),
            platform = %profile.platform,
            "sending upstream request"
        );

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.transport.post_stream(&self.config.upstream_url, headers, body) => resp?,
        };

        if resp.status().is_success() {
            Ok(Submitted::Accepted(resp))
        } else {
            Ok(Submitted::Rejected(resp))
        }
    }
}

fn with_attempt(err: Error, attempt: u32) -> Error {
    match err {
        Error::TokenAcquisition { message, context } => Error::TokenAcquisition {
            message,
            context: context.with_attempt(attempt),
        },
        other => other,
    }
}

/// Read the rest of an error body so the connection can be reused.
async fn drain(resp: reqwest::Response) -> String {
    match resp.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "failed to read upstream error body");
            String::new()
        }
    }
}
