//! 流式解码管线：把上游字节流切分为 SSE 帧。
//!
//! Streaming decode pipeline: upstream bytes to SSE frames.

pub mod decode;

pub use decode::{SseDecoder, SseFrame};
