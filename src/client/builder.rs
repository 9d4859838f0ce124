use crate::client::core::RelayClient;
use crate::client::evaluator::{NodeScriptEvaluator, ScriptEvaluator, ScriptTemplate};
use crate::client::fingerprint::FingerprintStore;
use crate::client::policy::PolicyEngine;
use crate::client::token::TokenCache;
use crate::config::RelayConfig;
use crate::relay::{StreamRelay, DEFAULT_BUFFER};
use crate::transport::HttpTransport;
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating relay clients with custom configuration.
///
/// Everything not set falls back to [`RelayConfig`] values.
pub struct RelayClientBuilder {
    config: RelayConfig,
    evaluator: Option<Arc<dyn ScriptEvaluator>>,
    template: Option<ScriptTemplate>,
    /// Override upstream URL (primarily for testing with mock servers)
    upstream_url_override: Option<String>,
    script_url_override: Option<String>,
    max_attempts: Option<u32>,
    backoff_unit: Option<Duration>,
    token_freshness: Option<Duration>,
    buffer: usize,
}

impl RelayClientBuilder {
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            evaluator: None,
            template: None,
            upstream_url_override: None,
            script_url_override: None,
            max_attempts: None,
            backoff_unit: None,
            token_freshness: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject the script evaluator. Default runs `node` with the configured timeout.
    pub fn evaluator(mut self, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Use an in-memory template instead of loading `main.js`/`env.js` from disk.
    pub fn template(mut self, template: ScriptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn upstream_url_override(mut self, url: impl Into<String>) -> Self {
        self.upstream_url_override = Some(url.into());
        self
    }

    pub fn script_url(mut self, url: impl Into<String>) -> Self {
        self.script_url_override = Some(url.into());
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n.max(1));
        self
    }

    /// Backoff unit between attempts (attempt `n` waits `n` units).
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = Some(unit);
        self
    }

    pub fn token_freshness(mut self, window: Duration) -> Self {
        self.token_freshness = Some(window);
        self
    }

    /// Output buffer capacity per stream.
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.buffer = capacity.max(1);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<RelayClient> {
        let mut config = self.config;
        if let Some(url) = self.upstream_url_override {
            config.upstream_url = url;
        }
        if let Some(url) = self.script_url_override {
            config.script_url = Some(url);
        }
        if let Some(n) = self.max_attempts {
            config.max_attempts = n;
        }
        if let Some(unit) = self.backoff_unit {
            config.backoff_unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        }
        let config = config.normalized();

        let origin = origin_of(&config.upstream_url)?;
        let template = match self.template {
            Some(t) => t,
            None => ScriptTemplate::load(&config.script_dir)?,
        };
        let evaluator: Arc<dyn ScriptEvaluator> = match self.evaluator {
            Some(e) => e,
            None => Arc::new(NodeScriptEvaluator::new(config.script_timeout())),
        };

        let transport = Arc::new(HttpTransport::new(config.timeout())?);
        let fingerprint = Arc::new(FingerprintStore::from_seed(&config.fingerprint));

        let mut tokens = TokenCache::new(
            transport.clone(),
            fingerprint.clone(),
            evaluator,
            template,
            config.script_url.clone(),
            origin.clone(),
        );
        if let Some(window) = self.token_freshness {
            tokens = tokens.with_freshness(window);
        }

        let policy = PolicyEngine::new(
            config.max_attempts,
            self.backoff_unit.unwrap_or_else(|| config.backoff_unit()),
        );

        Ok(RelayClient {
            config,
            transport,
            fingerprint,
            tokens: Arc::new(tokens),
            relay: StreamRelay::new(self.buffer),
            policy,
            origin,
        })
    }
}

impl Default for RelayClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `scheme://host[:port]` of the upstream endpoint, used for origin/referer headers.
fn origin_of(upstream_url: &str) -> Result<String> {
    let url = url::Url::parse(upstream_url).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid upstream url: {}", e),
            ErrorContext::new()
                .with_source("client_builder")
                .with_details(upstream_url),
        )
    })?;
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path() {
        assert_eq!(
            origin_of("https://cursor.com/api/chat").unwrap(),
            "https://cursor.com"
        );
        assert_eq!(
            origin_of("http://127.0.0.1:1234/api/chat").unwrap(),
            "http://127.0.0.1:1234"
        );
    }

    #[test]
    fn invalid_upstream_url_is_rejected() {
        let err = RelayClientBuilder::new()
            .template(ScriptTemplate::new("", ""))
            .upstream_url_override("not a url")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn oversized_backoff_saturates_in_config() {
        let client = RelayClientBuilder::new()
            .template(ScriptTemplate::new("", ""))
            .backoff_unit(Duration::MAX)
            .build()
            .unwrap();
        assert_eq!(client.config().backoff_unit_ms, u64::MAX);
        assert_eq!(client.policy.backoff_unit, Duration::MAX);
    }

    #[test]
    fn missing_template_files_fail_the_build() {
        let mut config = RelayConfig::default();
        config.script_dir = "/definitely/not/here".into();
        let err = RelayClientBuilder::new().config(config).build().err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
