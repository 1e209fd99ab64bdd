//! Incremental transcoder for upstream chat-completion streams.
//!
//! The [`StreamTranscoder`] is fed raw byte chunks as they arrive and returns
//! the rewritten SSE frames to write downstream:
//!
//! ```text
//! bytes -> LineBuffer -> parse_line -> ReasoningMerger -> encode_chunk -> frames
//! ```
//!
//! One instance per response stream. It does no I/O, so it is driven by
//! whichever task owns the stream and tested without a network.

use bytes::Bytes;

use super::reasoning::{ReasoningMerger, ReasoningState, Rewrite};
use super::sse::{done_frame, encode_chunk, parse_line, Frame, LineBuffer};
use crate::config::ReasoningConfig;

/// Counters reported when a stream is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub forwarded: usize,
    pub suppressed: usize,
    pub malformed: usize,
    /// Reasoning was still open when the stream ended. No close marker is
    /// synthesized for it.
    pub left_open: bool,
}

/// Usage:
///   let mut transcoder = StreamTranscoder::new(ReasoningConfig::default());
///   for chunk in upstream_chunks {
///       for frame in transcoder.feed(&chunk) {
///           // write frame downstream
///       }
///   }
///   let (frames, stats) = transcoder.finish();
#[derive(Debug)]
pub struct StreamTranscoder {
    lines: LineBuffer,
    merger: ReasoningMerger,
    stats: TranscodeStats,
}

impl StreamTranscoder {
    #[must_use]
    pub fn new(config: ReasoningConfig) -> Self {
        Self {
            lines: LineBuffer::new(),
            merger: ReasoningMerger::new(config),
            stats: TranscodeStats::default(),
        }
    }

    /// Process one upstream chunk, returning the frames it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for line in self.lines.feed(chunk) {
            self.process_line(&line, &mut frames);
        }
        frames
    }

    /// End of stream: process any unterminated trailing line and report.
    pub fn finish(mut self) -> (Vec<Bytes>, TranscodeStats) {
        let mut frames = Vec::new();
        if let Some(line) = self.lines.flush() {
            self.process_line(&line, &mut frames);
        }
        self.stats.left_open = self.merger.state() == ReasoningState::Open;
        (frames, self.stats)
    }

    #[must_use]
    pub fn reasoning_open(&self) -> bool {
        self.merger.state() == ReasoningState::Open
    }

    #[must_use]
    pub fn stats(&self) -> TranscodeStats {
        self.stats
    }

    fn process_line(&mut self, line: &str, frames: &mut Vec<Bytes>) {
        let chunk = match parse_line(line) {
            Ok(None) => return,
            Ok(Some(Frame::Done)) => {
                self.stats.forwarded += 1;
                frames.push(done_frame());
                return;
            }
            Ok(Some(Frame::Chunk(chunk))) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping unparseable stream event");
                self.stats.malformed += 1;
                return;
            }
        };

        match self.merger.rewrite(&chunk) {
            Rewrite::Forward(rewritten) => match encode_chunk(&rewritten) {
                Ok(frame) => {
                    self.stats.forwarded += 1;
                    frames.push(frame);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping event that failed to serialize");
                    self.stats.malformed += 1;
                }
            },
            Rewrite::Suppress => self.stats.suppressed += 1,
        }
    }
}
