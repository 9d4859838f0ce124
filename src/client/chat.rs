use crate::relay::EventStream;
use crate::types::events::StreamEvent;
use crate::types::message::Message;
use crate::{Error, Result};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::core::RelayClient;
use super::models::convert_model_name;

/// Aggregated (non-streaming) chat result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    /// Upstream model identifier the request was sent to.
    pub model: String,
    /// Concatenated text deltas.
    pub content: String,
    /// Number of data chunks received.
    pub chunks: usize,
}

/// Builder for chat requests.
pub struct ChatRequestBuilder<'a> {
    pub(crate) client: &'a RelayClient,
    pub(crate) model: String,
    pub(crate) messages: Vec<Message>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl<'a> ChatRequestBuilder<'a> {
    pub(crate) fn new(client: &'a RelayClient) -> Self {
        Self {
            client,
            model: String::new(),
            messages: Vec::new(),
            cancel: None,
        }
    }

    /// Caller-facing model name; translated before submission.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the conversation.
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Append one message.
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Tie the request to a caller-owned cancellation token.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Execute the request and return the live event stream.
    pub async fn execute_stream(self) -> Result<EventStream> {
        let cancel = self.cancel.unwrap_or_default();
        self.client
            .chat_stream(&self.model, &self.messages, &cancel)
            .await
    }

    /// Execute the request and collect text deltas until the stream ends.
    ///
    /// A terminal error event becomes an `Err`.
    pub async fn execute(self) -> Result<ChatResponse> {
        let model = convert_model_name(&self.model);
        let mut stream = self.execute_stream().await?;
        let mut response = ChatResponse {
            model,
            ..ChatResponse::default()
        };

        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Data(chunk) => {
                    response.chunks += 1;
                    if let Some(delta) = chunk.delta.as_deref().filter(|_| chunk.is_text_delta()) {
                        response.content.push_str(delta);
                    }
                }
                StreamEvent::Error(err) => return Err(Error::from_stream_event(err)),
                StreamEvent::Done => break,
            }
        }
        Ok(response)
    }
}
