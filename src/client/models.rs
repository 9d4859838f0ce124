//! Static model registry and caller-to-upstream model name translation.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Canonical mid-tier identifier used when nothing else matches.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.6";
/// High-capability variant of the claude family.
pub const HIGH_CAPABILITY_MODEL: &str = "anthropic/claude-opus-4.6";
pub const GEMINI_MODEL: &str = "google/gemini-3.1-pro";

const QUALIFIER: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    /// Public name accepted from callers.
    pub name: &'static str,
    /// Identifier sent upstream (qualified with a provider prefix).
    pub id: &'static str,
    pub owned_by: &'static str,
    pub context_window: u32,
}

static REGISTRY: &[ModelConfig] = &[
    ModelConfig {
        name: "claude-sonnet-4.6",
        id: "anthropic/claude-sonnet-4.6",
        owned_by: "anthropic",
        context_window: 200_000,
    },
    ModelConfig {
        name: "claude-opus-4.6",
        id: "anthropic/claude-opus-4.6",
        owned_by: "anthropic",
        context_window: 200_000,
    },
    ModelConfig {
        name: "claude-haiku-4.5",
        id: "anthropic/claude-haiku-4.5",
        owned_by: "anthropic",
        context_window: 200_000,
    },
    ModelConfig {
        name: "gemini-3.1-pro",
        id: "google/gemini-3.1-pro",
        owned_by: "google",
        context_window: 1_000_000,
    },
    ModelConfig {
        name: "gpt-5.2",
        id: "openai/gpt-5.2",
        owned_by: "openai",
        context_window: 400_000,
    },
    ModelConfig {
        name: "grok-4",
        id: "xai/grok-4",
        owned_by: "xai",
        context_window: 256_000,
    },
];

static BY_NAME: Lazy<HashMap<&'static str, &'static ModelConfig>> =
    Lazy::new(|| REGISTRY.iter().map(|m| (m.name, m)).collect());

pub fn get_model_config(name: &str) -> Option<&'static ModelConfig> {
    BY_NAME.get(name).copied()
}

/// Models exposed to an outward `/models` listing.
pub fn supported_models() -> &'static [ModelConfig] {
    REGISTRY
}

/// Translate a caller-supplied model name into the upstream identifier.
///
/// Total and deterministic: qualified names pass through, registry hits with a
/// qualified id win, then family heuristics apply, then [`DEFAULT_MODEL`].
pub fn convert_model_name(model: &str) -> String {
    if model.contains(QUALIFIER) {
        return model.to_string();
    }

    if let Some(cfg) = get_model_config(model) {
        if cfg.id.contains(QUALIFIER) {
            return cfg.id.to_string();
        }
    }

    let lower = model.to_ascii_lowercase();
    // "opus" is a claude-only marker.
    let mapped = if lower.contains("opus") {
        HIGH_CAPABILITY_MODEL
    } else if lower.contains("claude") {
        DEFAULT_MODEL
    } else if lower.contains("gemini") {
        GEMINI_MODEL
    } else {
        // gpt-* and anything unknown land on the default tier.
        DEFAULT_MODEL
    };
    mapped.to_string()
}
