//! Relay client.
//!
//! Keep the public surface small: [`RelayClient`] plus its builder. The moving parts
//! (token cache, fingerprint, retry policy) live in submodules under `src/client/`.

pub mod budget;
pub mod builder;
pub mod chat;
pub mod core;
pub mod evaluator;
pub mod fingerprint;
pub mod models;
pub mod payload;
mod policy;
pub mod token;

pub use builder::RelayClientBuilder;
pub use chat::{ChatRequestBuilder, ChatResponse};
pub use core::RelayClient;
pub use evaluator::{EvaluationError, NodeScriptEvaluator, ScriptEvaluator, ScriptTemplate};
pub use fingerprint::{FingerprintProfile, FingerprintStore};
pub use models::{convert_model_name, supported_models, ModelConfig};
pub use token::{TokenCache, TokenCacheStats};
