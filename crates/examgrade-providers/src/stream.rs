//! Reassembly of streamed HTTP bodies into whole lines.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{transport_error, ProviderError};

/// Splits arbitrary byte chunks on `\n`.
///
/// Bytes are held until a full line is available so multi-byte characters
/// split across chunks decode correctly.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk; returns every line it completes, without terminators.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Whatever is left after the body ends, if anything.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

struct BodyState {
    response: Option<reqwest::Response>,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    timeout_secs: u64,
}

/// Stream a response body line by line, pulling chunks on demand.
pub(crate) fn body_lines(
    response: reqwest::Response,
    timeout_secs: u64,
) -> BoxStream<'static, Result<String, ProviderError>> {
    let state = BodyState {
        response: Some(response),
        buffer: LineBuffer::default(),
        ready: VecDeque::new(),
        timeout_secs,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            let response = state.response.as_mut()?;
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    let lines = state.buffer.push(&bytes);
                    state.ready.extend(lines);
                }
                Ok(None) => {
                    state.response = None;
                    state.ready.extend(state.buffer.finish());
                }
                Err(e) => {
                    state.response = None;
                    let timeout_secs = state.timeout_secs;
                    return Some((Err(transport_error(e, timeout_secs)), state));
                }
            }
        }
    })
    .boxed()
}
