//! 证明令牌缓存：一分钟新鲜窗口内复用令牌，过期后重新获取脚本并求值。
//!
//! Time-boxed proof-token cache.
//!
//! The cached entry (script body, token, production time) lives behind a single
//! `RwLock`, so invalidation clears all three at once. Freshness checks and refreshes
//! are not one atomic step: concurrent misses may both recompute, last writer wins.

use super::evaluator::{ScriptEvaluator, ScriptTemplate};
use super::fingerprint::FingerprintStore;
use reqwest::header::HeaderValue;
use crate::transport::HttpTransport;
use crate::{Error, ErrorContext, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tokens older than this are never reused.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

struct CachedToken {
    script_body: String,
    token: String,
    produced_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub evaluations: u64,
    pub invalidations: u64,
}

impl TokenCacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    evaluations: AtomicU64,
    invalidations: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> TokenCacheStats {
        TokenCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

pub struct TokenCache {
    transport: Arc<HttpTransport>,
    fingerprint: Arc<FingerprintStore>,
    evaluator: Arc<dyn ScriptEvaluator>,
    template: ScriptTemplate,
    script_url: Option<String>,
    origin: String,
    freshness: Duration,
    entry: RwLock<Option<CachedToken>>,
    stats: AtomicStats,
}

impl TokenCache {
    pub fn new(
        transport: Arc<HttpTransport>,
        fingerprint: Arc<FingerprintStore>,
        evaluator: Arc<dyn ScriptEvaluator>,
        template: ScriptTemplate,
        script_url: Option<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            fingerprint,
            evaluator,
            template,
            script_url,
            origin: origin.into(),
            freshness: FRESHNESS_WINDOW,
            entry: RwLock::new(None),
            stats: AtomicStats::default(),
        }
    }

    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Return a fresh proof token, computing a new one on a miss.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<String> {
        let previous_body = {
            let entry = self.entry.read().await;
            match entry.as_ref() {
                Some(cached) if cached.produced_at.elapsed() < self.freshness => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(cached.token.clone());
                }
                Some(cached) => Some(cached.script_body.clone()),
                None => None,
            }
        };
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let script_body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            body = self.resolve_script_body(previous_body) => body,
        };

        let profile = self.fingerprint.current();
        let source = self.template.assemble(
            &profile,
            self.script_url.as_deref().unwrap_or_default(),
            &script_body,
        );

        self.stats.evaluations.fetch_add(1, Ordering::Relaxed);
        let evaluated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.evaluator.evaluate(&source) => result,
        };

        match evaluated.and_then(usable_token) {
            Ok(token) => {
                debug!(
                    token_len = token.len(),
                    token_prefix = %token.chars().take(16).collect::<String>(),
                    "proof token computed"
                );
                *self.entry.write().await = Some(CachedToken {
                    script_body,
                    token: token.clone(),
                    produced_at: Instant::now(),
                });
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "proof token evaluation failed, clearing cache");
                *self.entry.write().await = None;
                Err(Error::token_with_context(
                    err.to_string(),
                    ErrorContext::new().with_source("token_cache"),
                ))
            }
        }
    }

    /// Drop the cached entry; the next `acquire` recomputes.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TokenCacheStats {
        self.stats.to_stats()
    }

    /// Fetch the upstream script, falling back to the previous body (or empty).
    async fn resolve_script_body(&self, previous: Option<String>) -> String {
        let Some(url) = self.script_url.as_deref() else {
            debug!("no script url configured, using degraded mode");
            return String::new();
        };

        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        match self.fetch_script(url).await {
            Ok(body) => body,
            Err(err) => match previous {
                Some(body) => {
                    warn!(error = %err, "script fetch failed, using cached script");
                    body
                }
                None => {
                    warn!(error = %err, "script fetch failed and nothing cached, using degraded mode");
                    String::new()
                }
            },
        }
    }

    async fn fetch_script(&self, url: &str) -> Result<String> {
        let headers = self.fingerprint.current().script_headers(&self.origin)?;
        let resp = self.transport.get(url, headers).await?;
        let status = resp.status();
        if !status.is_success() {
            // Drain so the connection goes back to the pool.
            let _ = resp.bytes().await;
            return Err(Error::Upstream {
                status: status.as_u16(),
                message: format!("script fetch returned {}", status),
            });
        }
        resp.text()
            .await
            .map_err(|e| Error::Transport(e.into()))
    }
}

/// The token travels as a header value; anything that cannot be sent is rejected
/// before it reaches the cache.
fn usable_token(token: String) -> Result<String> {
    if token.is_empty() || HeaderValue::from_str(&token).is_err() {
        return Err(Error::token_with_context(
            "evaluator returned a token that is not a valid header value",
            ErrorContext::new()
                .with_source("token_cache")
                .with_details(format!("token_len={}", token.len())),
        ));
    }
    Ok(token)
}
