//! # cursor-relay
//!
//! 一个把标准聊天补全请求转发到浏览器专用对话后端的中继层，负责证明令牌、浏览器指纹与流式转发。
//!
//! Request-orchestration core for relaying chat completions to a conversational
//! backend that only accepts browser-like traffic.
//!
//! ## Overview
//!
//! Each request goes through the same steps:
//!
//! - **Budgeting**: the conversation is trimmed to the configured input budget
//! - **Proof token**: a short-lived anti-automation token is taken from [`client::token::TokenCache`]
//!   or computed by evaluating the upstream script
//! - **Identity**: headers are built from the shared [`client::fingerprint::FingerprintStore`]
//! - **Submission**: one POST per attempt; a 403 regenerates the identity and retries
//! - **Relay**: the upstream event stream is re-published as typed [`StreamEvent`]s on a
//!   bounded, cancellable channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cursor_relay::{Message, RelayClient, RelayConfig, StreamEvent};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> cursor_relay::Result<()> {
//!     let client = RelayClient::new(RelayConfig::from_env())?;
//!
//!     let mut stream = client
//!         .chat()
//!         .model("claude-sonnet")
//!         .message(Message::user("Hello!"))
//!         .execute_stream()
//!         .await?;
//!
//!     while let Some(event) = stream.next().await {
//!         if let StreamEvent::Data(chunk) = event {
//!             print!("{}", chunk.delta.unwrap_or_default());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Relay client, retry policy, token cache, fingerprint, model mapping |
//! | [`config`] | Runtime configuration and environment overrides |
//! | [`pipeline`] | Server-sent event decoding |
//! | [`relay`] | Background worker feeding the output channel |
//! | [`transport`] | Shared HTTP session |
//! | [`types`] | Messages and stream events |

pub mod client;
pub mod config;
pub mod pipeline;
pub mod relay;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatResponse, RelayClient, RelayClientBuilder};
pub use config::RelayConfig;
pub use relay::EventStream;
pub use types::{
    events::{StreamChunk, StreamEvent},
    message::{Message, MessageRole},
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorResponse};
