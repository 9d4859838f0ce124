//! Upstream submission body.

use crate::types::message::{Message, MessageRole};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;

const TRIGGER: &str = "submit-message";
const ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamMessage {
    pub id: String,
    pub role: &'static str,
    pub parts: Vec<MessagePart>,
}

impl UpstreamMessage {
    fn text(role: MessageRole, text: String) -> Self {
        Self {
            id: random_id(),
            role: role.as_str(),
            parts: vec![MessagePart { kind: "text", text }],
        }
    }
}

/// Body of one upstream POST. Built per attempt so every attempt gets a new id.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionPayload {
    pub context: Vec<serde_json::Value>,
    pub model: String,
    pub id: String,
    pub messages: Vec<UpstreamMessage>,
    pub trigger: &'static str,
}

impl SubmissionPayload {
    pub fn new(model: impl Into<String>, messages: Vec<UpstreamMessage>) -> Self {
        Self {
            context: Vec::new(),
            model: model.into(),
            id: random_id(),
            messages,
            trigger: TRIGGER,
        }
    }

    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub fn random_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

/// Convert conversation messages to the upstream shape, applying the optional
/// system-prompt injection.
pub fn to_upstream_messages(messages: &[Message], inject: Option<&str>) -> Vec<UpstreamMessage> {
    let inject = inject.map(str::trim).filter(|s| !s.is_empty());
    let mut out = Vec::with_capacity(messages.len() + 1);

    match (inject, messages.first()) {
        (Some(extra), Some(first)) if first.is_system() => {
            let text = first.text_content();
            let merged = if text.is_empty() {
                extra.to_string()
            } else {
                format!("{}\n{}", extra, text)
            };
            out.push(UpstreamMessage::text(MessageRole::System, merged));
            out.extend(convert(&messages[1..]));
        }
        (Some(extra), _) => {
            out.push(UpstreamMessage::text(MessageRole::System, extra.to_string()));
            out.extend(convert(messages));
        }
        (None, _) => out.extend(convert(messages)),
    }
    out
}

fn convert(messages: &[Message]) -> impl Iterator<Item = UpstreamMessage> + '_ {
    messages
        .iter()
        .map(|m| UpstreamMessage::text(m.role, m.text_content()))
}
