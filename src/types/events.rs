//! Events republished from the upstream event stream.

use crate::error::ErrorResponse;
use serde::Serialize;
use serde_json::Value;

/// One decoded upstream frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamChunk {
    /// Frame discriminator (the frame's `type` field), e.g. `text-delta`.
    pub kind: String,
    /// Text delta carried by the frame, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    /// Raw frame as received.
    pub payload: Value,
}

impl StreamChunk {
    pub fn from_frame(payload: Value) -> Self {
        let kind = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let delta = payload
            .get("delta")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        Self {
            kind,
            delta,
            payload,
        }
    }

    pub fn is_text_delta(&self) -> bool {
        self.kind == "text-delta"
    }
}

/// Output sequence item.
///
/// `Error` is terminal: nothing follows it. `Done` marks an explicit upstream
/// end-of-stream sentinel; a stream may also just close after its last chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type")]
pub enum StreamEvent {
    Data(StreamChunk),
    Error(ErrorResponse),
    Done,
}

impl StreamEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::Error(_))
    }
}
