//! Removal of a leading `<think>...</think>` reasoning block from model output.
//!
//! Only the very start of a response is inspected. If the first non-blank chunk
//! opens a think block, everything is held back until `</think>` shows up and
//! only what follows the tag is released. A block that never closes releases
//! nothing.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::GradeError;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// No non-blank chunk seen yet.
    #[default]
    Undecided,
    /// Inside a leading think block.
    Buffering,
    PassThrough,
}

/// Incremental think-tag filter. Feed chunks in arrival order.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    mode: Mode,
    buffer: String,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns the non-blank lines it releases.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        match self.mode {
            Mode::Undecided => {
                if chunk.trim().is_empty() {
                    return Vec::new();
                }
                if chunk.trim_start().starts_with(THINK_OPEN) {
                    self.mode = Mode::Buffering;
                    self.buffer.push_str(chunk);
                    self.release_after_close()
                } else {
                    self.mode = Mode::PassThrough;
                    non_blank_lines(chunk)
                }
            }
            Mode::Buffering => {
                self.buffer.push_str(chunk);
                self.release_after_close()
            }
            Mode::PassThrough => non_blank_lines(chunk),
        }
    }

    /// `true` while a think block is open and nothing has been released.
    pub fn is_buffering(&self) -> bool {
        self.mode == Mode::Buffering
    }

    fn release_after_close(&mut self) -> Vec<String> {
        let Some(pos) = self.buffer.find(THINK_CLOSE) else {
            return Vec::new();
        };
        let lines = non_blank_lines(&self.buffer[pos + THINK_CLOSE.len()..]);
        self.buffer.clear();
        self.mode = Mode::PassThrough;
        lines
    }
}

fn non_blank_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Filter every chunk of a raw response once, in order.
pub fn filter_chunks<I, S>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut filter = ThinkFilter::new();
    chunks
        .into_iter()
        .flat_map(|chunk| filter.push(chunk.as_ref()))
        .collect()
}

struct FilterState<'a> {
    chunks: BoxStream<'a, Result<String, GradeError>>,
    filter: ThinkFilter,
    ready: VecDeque<String>,
    failed: bool,
}

/// Wrap a raw chunk stream so it yields filtered lines, one at a time.
///
/// A backend error is passed through and ends the stream.
pub fn filter_think_tags<'a>(
    chunks: BoxStream<'a, Result<String, GradeError>>,
) -> BoxStream<'a, Result<String, GradeError>> {
    let state = FilterState {
        chunks,
        filter: ThinkFilter::new(),
        ready: VecDeque::new(),
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.failed {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let released = state.filter.push(&chunk);
                    state.ready.extend(released);
                }
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
                None => {
                    if state.filter.is_buffering() {
                        tracing::debug!("response ended inside an unclosed think block");
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}
