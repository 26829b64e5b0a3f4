// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

// Frame buffer and incremental UTF-8 decoding
//
// Turns arbitrarily chunked bytes into complete frames:
// - Bytes are decoded incrementally; a multi-byte character split across
//   chunks is held back until its remaining bytes arrive
// - Text accumulates in one buffer until a blank line is found
// - Each frame is trimmed; whitespace-only frames are discarded
// - Whatever follows the last delimiter waits for the next chunk

use super::types::StreamFrame;

/// Frame delimiter: a blank line.
const FRAME_DELIMITER: &str = "\n\n";

// ---------------------------------------------------------------------------
// Utf8Decoder
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoder that preserves partial sequences across calls.
///
/// Invalid sequences are replaced with U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + chunk` as forms complete characters.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut consumed = 0;

        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = consumed + e.valid_up_to();
                    // Prefix up to valid_up_to is valid UTF-8.
                    out.push_str(
                        std::str::from_utf8(&self.pending[consumed..valid_up_to])
                            .unwrap_or_default(),
                    );
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_up_to + bad;
                        }
                        None => {
                            // Incomplete sequence at the end: keep it.
                            consumed = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        out
    }

    /// Flush at end of stream. A dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// FrameBuffer
// ---------------------------------------------------------------------------

/// Accumulates decoded text and splits it into frames on blank lines.
///
/// The result is independent of how the transport chunked the bytes.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    decoder: Utf8Decoder,
    buffer: String,
    /// Prefix of `buffer` already searched without finding a delimiter.
    scanned: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_frames()
    }

    /// Flush the undelimited remainder at end of stream.
    pub fn finish(&mut self) -> Option<StreamFrame> {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        frame_from(&rest)
    }

    /// Bytes of text waiting for a delimiter.
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.decoder.pending_len()
    }

    fn drain_frames(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let mut start = 0;

        // A delimiter can straddle the old end of the buffer by one byte.
        let mut search = self.scanned.saturating_sub(FRAME_DELIMITER.len() - 1);
        while !self.buffer.is_char_boundary(search) {
            search -= 1;
        }

        while let Some(pos) = self.buffer[search..].find(FRAME_DELIMITER) {
            let end = search + pos;
            if let Some(frame) = frame_from(&self.buffer[start..end]) {
                frames.push(frame);
            }
            start = end + FRAME_DELIMITER.len();
            search = start;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
        self.scanned = self.buffer.len();
        frames
    }
}

fn frame_from(text: &str) -> Option<StreamFrame> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(StreamFrame::from_raw(trimmed))
    }
}
