//! 流式转发：后台任务读取上游 SSE，按序推送到有界通道。
//!
//! Stream relay.
//!
//! A single background task per request reads the upstream body, decodes it and pushes
//! [`StreamEvent`]s into a bounded channel. Data events use a blocking send (backpressure);
//! the terminal error uses `try_send` and is dropped when the buffer is full.
//! Cancellation closes the channel without an error event.

use crate::pipeline::{SseDecoder, SseFrame};
use crate::types::events::{StreamChunk, StreamEvent};
use crate::{BoxStream, Error};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// Output buffer capacity per request.
pub const DEFAULT_BUFFER: usize = 32;

pub struct StreamRelay {
    decoder: SseDecoder,
    buffer: usize,
}

impl Default for StreamRelay {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl StreamRelay {
    pub fn new(buffer: usize) -> Self {
        Self {
            decoder: SseDecoder::default(),
            buffer: buffer.max(1),
        }
    }

    /// Relay an upstream HTTP response body.
    pub fn spawn_response(&self, resp: reqwest::Response, cancel: &CancellationToken) -> EventStream {
        let body: BoxStream<'static, Bytes> = Box::pin(
            resp.bytes_stream()
                .map(|r| r.map_err(|e| Error::Transport(e.into()))),
        );
        self.spawn(body, cancel)
    }

    /// Start the background worker and return the caller side of the channel.
    ///
    /// The worker stops when `cancel` fires, when the returned [`EventStream`] is dropped,
    /// or when the upstream ends.
    pub fn spawn(&self, body: BoxStream<'static, Bytes>, cancel: &CancellationToken) -> EventStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let token = cancel.child_token();
        let frames = self.decoder.decode_stream(body);
        tokio::spawn(pump(frames, tx, token.clone()));
        EventStream {
            rx,
            _guard: token.drop_guard(),
        }
    }
}

async fn pump(
    mut frames: BoxStream<'static, SseFrame>,
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("stream relay cancelled");
                return;
            }
            item = frames.next() => item,
        };

        let event = match next {
            None => return,
            Some(Ok(SseFrame::Json(value))) => StreamEvent::Data(StreamChunk::from_frame(value)),
            Some(Ok(SseFrame::Done)) => StreamEvent::Done,
            Some(Err(err)) => {
                if cancel.is_cancelled() {
                    return;
                }
                push_terminal_error(&tx, err);
                return;
            }
        };
        let is_done = matches!(event, StreamEvent::Done);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = tx.send(event) => {
                if sent.is_err() {
                    debug!("stream consumer went away");
                    return;
                }
            }
        }

        if is_done {
            return;
        }
    }
}

fn push_terminal_error(tx: &mpsc::Sender<StreamEvent>, err: Error) {
    let response = Error::stream(err.to_string()).to_response();
    match tx.try_send(StreamEvent::Error(response)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(error = %err, "output buffer full, dropping stream error event");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(error = %err, "stream consumer gone before error event");
        }
    }
}

/// Caller side of a relayed stream. Dropping it stops the worker.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
    _guard: DropGuard,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;

    fn body_from(chunks: Vec<crate::Result<Bytes>>) -> BoxStream<'static, Bytes> {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn relays_chunks_in_order_then_closes() {
        let body = body_from(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text-delta\",\"delta\":\"a\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"text-delta\",\"delta\":\"b\"}\n\n")),
        ]);
        let cancel = CancellationToken::new();
        let events: Vec<StreamEvent> = StreamRelay::default().spawn(body, &cancel).collect().await;
        let deltas: Vec<_> = events
            .iter()
            .map(|e| match e {
                StreamEvent::Data(c) => c.delta.clone().unwrap_or_default(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn done_sentinel_is_forwarded_last() {
        let body = body_from(vec![Ok(Bytes::from_static(
            b"data: {\"type\":\"finish\"}\n\ndata: [DONE]\n\n",
        ))]);
        let cancel = CancellationToken::new();
        let events: Vec<StreamEvent> = StreamRelay::default().spawn(body, &cancel).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn read_failure_becomes_single_terminal_error() {
        let body = body_from(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"text-delta\",\"delta\":\"a\"}\n\n")),
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))),
        ]);
        let cancel = CancellationToken::new();
        let events: Vec<StreamEvent> = StreamRelay::default().spawn(body, &cancel).collect().await;
        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Error(resp) => {
                assert_eq!(resp.status, 502);
                assert!(resp.message.starts_with("Upstream stream failure"));
                assert!(resp.message.contains("connection reset"));
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_event_is_dropped_when_buffer_is_full() {
        let body = body_from(vec![
            Ok(Bytes::from_static(b"data: {\"n\":1}\n\n")),
            Err(Error::Io(std::io::Error::other("boom"))),
        ]);
        let cancel = CancellationToken::new();
        let mut events = StreamRelay::new(1).spawn(body, &cancel);

        // Let the worker fill the single slot and hit the error without a reader.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first = events.recv().await;
        assert!(matches!(first, Some(StreamEvent::Data(_))));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn cancellation_closes_without_error() {
        let (tx, rx) = mpsc::channel::<crate::Result<Bytes>>(4);
        let body: BoxStream<'static, Bytes> =
            Box::pin(tokio_stream_from_receiver(rx));
        let cancel = CancellationToken::new();
        let mut events = StreamRelay::default().spawn(body, &cancel);

        tx.send(Ok(Bytes::from_static(b"data: {\"n\":1}\n\n")))
            .await
            .unwrap();
        assert!(matches!(events.recv().await, Some(StreamEvent::Data(_))));

        cancel.cancel();
        let rest: Vec<StreamEvent> = tokio::time::timeout(Duration::from_secs(1), events.collect())
            .await
            .expect("stream should close after cancellation");
        assert!(rest.iter().all(|e| !e.is_error()));
        drop(tx);
    }

    fn tokio_stream_from_receiver(
        rx: mpsc::Receiver<crate::Result<Bytes>>,
    ) -> impl Stream<Item = crate::Result<Bytes>> + Send + 'static {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
    }
}
