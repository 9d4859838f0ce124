//! Streaming decoder (Bytes -> SSE frames).
//!
//! Frames are split on a blank line. Only `data:` lines carry payload; comment,
//! `event:`, `id:` and `retry:` lines are ignored. Bytes are buffered raw so
//! multi-byte characters split across network chunks decode correctly.

use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Json(Value),
    Done,
}

pub struct SseDecoder {
    done_signal: String,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SseDecoder {
    pub fn new(done_signal: Option<String>) -> Self {
        Self {
            done_signal: done_signal.unwrap_or_else(|| "[DONE]".to_string()),
        }
    }

    /// Decode a byte stream into frames. Decoding stops after the done signal.
    pub fn decode_stream(&self, input: BoxStream<'static, Bytes>) -> BoxStream<'static, SseFrame> {
        let done_signal = self.done_signal.clone();

        let stream = stream::unfold(
            Some((input, Vec::<u8>::new())),
            move |state| {
                let done_signal = done_signal.clone();
                async move {
                    let (mut input, mut buf) = state?;
                    loop {
                        if let Some((end, skip)) = find_frame_end(&buf) {
                            let frame: Vec<u8> = buf.drain(..end + skip).take(end).collect();
                            match parse_frame(&frame, &done_signal) {
                                Ok(Some(SseFrame::Done)) => {
                                    return Some((Ok(SseFrame::Done), None));
                                }
                                Ok(Some(f)) => return Some((Ok(f), Some((input, buf)))),
                                Ok(None) => continue,
                                Err(e) => return Some((Err(e), None)),
                            }
                        }

                        match input.next().await {
                            Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                            Some(Err(e)) => return Some((Err(e), None)),
                            None => {
                                // EOF: flush a trailing frame without delimiter.
                                let rest = std::mem::take(&mut buf);
                                return match parse_frame(&rest, &done_signal) {
                                    Ok(Some(f)) => Some((Ok(f), None)),
                                    Ok(None) => None,
                                    Err(e) => Some((Err(e), None)),
                                };
                            }
                        }
                    }
                }
            },
        );

        Box::pin(stream)
    }
}

/// Position of the first blank-line delimiter and its length.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            if buf.get(i + 1) == Some(&b'\n') {
                return Some((i, 2));
            }
            if buf.get(i + 1) == Some(&b'\r') && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, 3));
            }
        }
        i += 1;
    }
    None
}

fn parse_frame(raw: &[u8], done_signal: &str) -> Result<Option<SseFrame>> {
    let text = String::from_utf8_lossy(raw);
    let mut data_lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return Ok(None);
    }

    let payload = data_lines.join("\n");
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == done_signal {
        return Ok(Some(SseFrame::Done));
    }

    let value: Value = serde_json::from_str(payload).map_err(Error::Serialization)?;
    Ok(Some(SseFrame::Json(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn byte_stream(chunks: &[&'static [u8]]) -> BoxStream<'static, Bytes> {
        let items: Vec<Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::from_static(*c))).collect();
        Box::pin(stream::iter(items))
    }

    async fn collect(chunks: &[&'static [u8]]) -> Vec<Result<SseFrame>> {
        SseDecoder::default()
            .decode_stream(byte_stream(chunks))
            .collect()
            .await
    }

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let out = collect(&[
            b"data: {\"type\":\"text-delta\",\"del" as &[u8],
            b"ta\":\"Hel\"}\n\ndata: {\"type\":\"text-delta\",\"delta\":\"lo\"}\n" as &[u8],
            b"\n" as &[u8],
        ])
        .await;
        let frames: Vec<SseFrame> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            frames,
            vec![
                SseFrame::Json(json!({"type": "text-delta", "delta": "Hel"})),
                SseFrame::Json(json!({"type": "text-delta", "delta": "lo"})),
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_boundaries() {
        // "é" is 0xC3 0xA9; split it between chunks.
        let out = collect(&[b"data: {\"delta\":\"\xC3" as &[u8], b"\xA9\"}\n\n" as &[u8]]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].as_ref().unwrap(),
            &SseFrame::Json(json!({"delta": "é"}))
        );
    }

    #[tokio::test]
    async fn comments_and_event_lines_are_ignored() {
        let out = collect(&[
            b": keep-alive\n\nevent: message\nid: 3\ndata: {\"a\":1}\r\n\r\n" as &[u8],
        ])
        .await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &SseFrame::Json(json!({"a": 1})));
    }

    #[tokio::test]
    async fn done_signal_ends_decoding() {
        let out = collect(&[b"data: {\"a\":1}\n\ndata: [DONE]\n\ndata: {\"a\":2}\n\n" as &[u8]]).await;
        let frames: Vec<SseFrame> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(frames, vec![SseFrame::Json(json!({"a": 1})), SseFrame::Done]);
    }

    #[tokio::test]
    async fn trailing_frame_without_delimiter_is_flushed() {
        let out = collect(&[b"data: {\"a\":1}" as &[u8]]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }

    #[tokio::test]
    async fn malformed_json_is_a_terminal_error() {
        let out = collect(&[b"data: {not json\n\ndata: {\"a\":1}\n\n" as &[u8]]).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(Error::Serialization(_))));
    }
}
