//! 类型系统模块：会话消息与流式事件。
//!
//! # Types Module
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Conversation message with role and content |
//! | [`MessageRole`] | Message role (system, user, assistant) |
//! | [`StreamEvent`] | Item of the relayed output sequence |
//! | [`StreamChunk`] | One decoded upstream frame |
//!
//! ## Example
//!
//! ```rust
//! use cursor_relay::types::{Message, MessageRole};
//!
//! let system = Message::system("You are a helpful assistant");
//! let user = Message::user("Hello!");
//! assert_eq!(system.role, MessageRole::System);
//! assert_eq!(user.content_length(), 6);
//! ```

pub mod events;
pub mod message;

pub use events::{StreamChunk, StreamEvent};
pub use message::{ContentBlock, Message, MessageContent, MessageRole};
