//! 运行配置：超时、脚本地址、输入预算与浏览器指纹种子。
//!
//! Runtime configuration consumed by the relay.
//!
//! Values come from [`RelayConfig::default`] and can be overridden from the environment
//! with [`RelayConfig::from_env`]. Loading configuration files is left to the embedding
//! application; the struct derives `Deserialize` so any serde format works.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_UPSTREAM_URL: &str = "https://cursor.com/api/chat";

/// Browser fingerprint seed values injected into the proof-token script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FingerprintSeed {
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub user_agent: String,
}

impl Default for FingerprintSeed {
    fn default() -> Self {
        Self {
            webgl_vendor: "Google Inc. (Intel)".to_string(),
            webgl_renderer:
                "ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0, D3D11)"
                    .to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub upstream_url: String,
    pub timeout_secs: u64,
    /// Script source for the proof token. `None` runs in degraded mode.
    pub script_url: Option<String>,
    /// Character budget for the conversation; `<= 0` disables trimming.
    pub max_input_length: i64,
    pub fingerprint: FingerprintSeed,
    /// Text prepended to the leading system message (or inserted as one).
    pub system_prompt_inject: Option<String>,
    /// Directory holding `main.js` and `env.js`.
    pub script_dir: PathBuf,
    pub script_timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            timeout_secs: 60,
            script_url: None,
            max_input_length: 200_000,
            fingerprint: FingerprintSeed::default(),
            system_prompt_inject: None,
            script_dir: PathBuf::from("jscode"),
            script_timeout_secs: 10,
            max_attempts: 2,
            backoff_unit_ms: 1_000,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(url) = lookup("CURSOR_UPSTREAM_URL").filter(|s| !s.trim().is_empty()) {
            cfg.upstream_url = url;
        }
        if let Some(secs) = lookup("TIMEOUT").and_then(|s| s.trim().parse::<u64>().ok()) {
            cfg.timeout_secs = secs;
        }
        if let Some(url) = lookup("SCRIPT_URL") {
            cfg.script_url = Some(url);
        }
        if let Some(n) = lookup("MAX_INPUT_LENGTH").and_then(|s| s.trim().parse::<i64>().ok()) {
            cfg.max_input_length = n;
        }
        if let Some(v) = lookup("UNMASKED_VENDOR_WEBGL") {
            cfg.fingerprint.webgl_vendor = v;
        }
        if let Some(v) = lookup("UNMASKED_RENDERER_WEBGL") {
            cfg.fingerprint.webgl_renderer = v;
        }
        if let Some(v) = lookup("USER_AGENT").filter(|s| !s.trim().is_empty()) {
            cfg.fingerprint.user_agent = v;
        }
        if let Some(v) = lookup("SYSTEM_PROMPT_INJECT") {
            cfg.system_prompt_inject = Some(v);
        }
        if let Some(dir) = lookup("SCRIPT_DIR").filter(|s| !s.trim().is_empty()) {
            cfg.script_dir = PathBuf::from(dir);
        }

        cfg.normalized()
    }

    /// Collapse empty optional strings to `None`.
    pub fn normalized(mut self) -> Self {
        self.script_url = self
            .script_url
            .take()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.system_prompt_inject = self
            .system_prompt_inject
            .take()
            .filter(|s| !s.trim().is_empty());
        self.max_attempts = self.max_attempts.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs.max(1))
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}
