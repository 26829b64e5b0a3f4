// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Event stream processor
//
// Takes an input byte stream, assembles frames, classifies them, and
// pushes typed events into a bounded channel. The spawned task stops on
// the sentinel, at end of input, on a read error, an oversized frame or an
// idle timeout (each reported as the last item), on cancellation, or when
// the consumer goes away.

use super::classifier::FrameClassifier;
use super::decoder::FrameBuffer;
use super::types::{Classified, StreamError, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_FRAME_BYTES};
use crate::http::HttpError;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// Default capacity of the event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Turns a byte stream into a stream of classified events.
///
/// Generic over the classifier so every channel shares one framing
/// implementation.
pub struct EventStreamProcessor<C: FrameClassifier> {
    classifier: Arc<C>,
    capacity: usize,
    max_frame_bytes: usize,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl<C: FrameClassifier> EventStreamProcessor<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier: Arc::new(classifier),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            idle_timeout: Some(Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS)),
            cancel: CancellationToken::new(),
        }
    }

    /// Bound the channel between the reader task and the consumer.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Fail the stream once this much text waits for a delimiter.
    pub fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit.max(1);
        self
    }

    /// Fail the stream when no chunk arrives for `timeout`. `None` waits
    /// forever.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Stop reading as soon as `cancel` fires. No event is synthesized.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Spawn the reader task and return the consumer side.
    ///
    /// Items arrive in frame order, which is byte arrival order. A read
    /// error, an oversized frame, or an idle timeout becomes a final `Err`
    /// after every event decoded before it.
    pub fn process(
        self,
        mut input: impl Stream<Item = Result<Bytes, HttpError>> + Unpin + Send + 'static,
    ) -> ReceiverStream<Result<C::Event, StreamError>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let classifier = self.classifier;
        let cancel = self.cancel;
        let max_frame_bytes = self.max_frame_bytes;
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            let mut frames = FrameBuffer::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("event stream cancelled");
                        return;
                    }
                    next = next_chunk(&mut input, idle_timeout) => next,
                };

                let next = match next {
                    Ok(next) => next,
                    Err(after) => {
                        let after_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
                        tracing::warn!(after_ms, "event stream idle, giving up");
                        let _ = tx.send(Err(StreamError::IdleTimeout { after_ms })).await;
                        return;
                    }
                };

                match next {
                    Some(Ok(chunk)) => {
                        for frame in frames.push(&chunk) {
                            if deliver(classifier.as_ref(), &frame, &tx, &cancel).await.is_err() {
                                return;
                            }
                        }
                        if frames.pending_len() > max_frame_bytes {
                            tracing::warn!(
                                pending = frames.pending_len(),
                                limit = max_frame_bytes,
                                "event stream frame too large"
                            );
                            let _ = tx
                                .send(Err(StreamError::FrameTooLarge {
                                    limit: max_frame_bytes,
                                }))
                                .await;
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "event stream read failed");
                        let _ = tx.send(Err(StreamError::Aborted(e.to_string()))).await;
                        return;
                    }
                    None => break,
                }
            }

            // End of input without a sentinel: flush the undelimited tail.
            if let Some(frame) = frames.finish() {
                let _ = deliver(classifier.as_ref(), &frame, &tx, &cancel).await;
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Read the next chunk. `Err` carries the idle timeout that expired.
async fn next_chunk<S>(
    input: &mut S,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<Bytes, HttpError>>, Duration>
where
    S: Stream<Item = Result<Bytes, HttpError>> + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, input.next())
            .await
            .map_err(|_| limit),
        None => Ok(input.next().await),
    }
}

/// Classify one frame and forward its event.
///
/// `Err(())` means stop reading: sentinel seen, cancelled, or consumer gone.
async fn deliver<C: FrameClassifier>(
    classifier: &C,
    frame: &super::types::StreamFrame,
    tx: &mpsc::Sender<Result<C::Event, StreamError>>,
    cancel: &CancellationToken,
) -> Result<(), ()> {
    if cancel.is_cancelled() {
        return Err(());
    }
    match classifier.classify(frame) {
        Classified::Event(event) => tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(()),
            sent = tx.send(Ok(event)) => sent.map_err(|_| ()),
        },
        Classified::Done => {
            tracing::debug!("stream sentinel received");
            Err(())
        }
        Classified::Skip => Ok(()),
    }
}
