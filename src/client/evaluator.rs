//! 脚本求值：在隔离运行时中执行拼装好的脚本以得到证明令牌。
//!
//! Proof-token script evaluation.
//!
//! The relay treats evaluation as a black box behind [`ScriptEvaluator`]. The
//! production implementation, [`NodeScriptEvaluator`], runs the script in a `node`
//! child process with an empty environment and a hard time limit.

use super::fingerprint::FingerprintProfile;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("script runtime could not be started: {0}")]
    Spawn(String),

    #[error("script timed out after {0:?}")]
    Timeout(Duration),

    #[error("script exited with status {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("script produced no output")]
    EmptyOutput,
}

/// Evaluates an assembled script and returns its result as a string.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, source: &str) -> Result<String>;
}

/// Runs scripts with `node`, reading the program from stdin.
pub struct NodeScriptEvaluator {
    program: PathBuf,
    timeout: Duration,
}

impl NodeScriptEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("node"),
            timeout,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl ScriptEvaluator for NodeScriptEvaluator {
    async fn evaluate(&self, source: &str) -> Result<String> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("-")
            .env_clear()
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| EvaluationError::Spawn(e.to_string()))?;

        let run = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(EvaluationError::Spawn(e.to_string()).into()),
            Err(_) => return Err(EvaluationError::Timeout(self.timeout).into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EvaluationError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.chars().take(512).collect(),
            }
            .into());
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            return Err(EvaluationError::EmptyOutput.into());
        }
        Ok(value)
    }
}

const SCRIPT_SRC: &str = "$$currentScriptSrc$$";
const WEBGL_VENDOR: &str = "$$UNMASKED_VENDOR_WEBGL$$";
const WEBGL_RENDERER: &str = "$$UNMASKED_RENDERER_WEBGL$$";
const USER_AGENT: &str = "$$userAgent$$";
const ENV_SHIM: &str = "$$env_jscode$$";
const UPSTREAM_SCRIPT: &str = "$$cursor_jscode$$";

/// Fixed wrapper script plus the environment shim it embeds.
#[derive(Debug, Clone)]
pub struct ScriptTemplate {
    main: String,
    env_shim: String,
}

impl ScriptTemplate {
    pub fn new(main: impl Into<String>, env_shim: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            env_shim: env_shim.into(),
        }
    }

    /// Load `main.js` and `env.js` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|e| {
                Error::configuration_with_context(
                    format!("failed to read {}: {}", path.display(), e),
                    ErrorContext::new().with_source("script_template"),
                )
            })
        };
        Ok(Self::new(read("main.js")?, read("env.js")?))
    }

    /// Assemble the final script.
    ///
    /// Identity placeholders are substituted in the wrapper first; the environment shim
    /// and the upstream script are spliced in afterwards (first occurrence only), so
    /// placeholder-like text inside them is left untouched.
    pub fn assemble(
        &self,
        profile: &FingerprintProfile,
        script_url: &str,
        upstream_script: &str,
    ) -> String {
        let main = self
            .main
            .replace(SCRIPT_SRC, script_url)
            .replace(WEBGL_VENDOR, &profile.webgl_vendor)
            .replace(WEBGL_RENDERER, &profile.webgl_renderer)
            .replace(USER_AGENT, &profile.user_agent);
        let main = main.replacen(ENV_SHIM, &self.env_shim, 1);
        main.replacen(UPSTREAM_SCRIPT, upstream_script, 1)
    }
}
