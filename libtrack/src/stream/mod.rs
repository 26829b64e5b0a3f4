// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// SSE framing and event classification
//
// Responsibilities:
// - Decode arbitrarily chunked bytes into blank-line delimited frames
// - Reconstruct each frame's payload from its `data:` lines
// - Recognize the `[DONE]` sentinel and stop reading
// - Parse payloads into typed events; drop unparsable ones with a log line
// - Deliver events in arrival order over a bounded channel

mod classifier;
mod decoder;
mod processor;
mod types;

pub use classifier::{ChatEventClassifier, FrameClassifier};
pub(crate) use classifier::preview;
pub use decoder::{FrameBuffer, Utf8Decoder};
pub use processor::{EventStreamProcessor, DEFAULT_CHANNEL_CAPACITY};
pub use types::{
    ChatEvent, Classified, EventKind, StreamError, StreamFrame, DATA_MARKER,
    DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_FRAME_BYTES, DONE_SENTINEL,
};
