//! Incremental splitting of inline reasoning markers.
//!
//! Some providers interleave a reasoning channel into the primary stream
//! between `<think>` and `</think>` markers, and a marker can arrive
//! split across chunk boundaries.

use super::TokenEvent;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Routes buffered stream text between `Content` and `Thought` events.
///
/// While inside a marker pair the text accumulates until the closing
/// marker is observed; if the stream ends first, the partial content is
/// flushed as normal output rather than dropped.
#[derive(Debug, Default)]
pub struct ThinkSplitter {
    buf: String,
    in_think: bool,
}

impl ThinkSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &str) -> Vec<TokenEvent> {
        self.buf.push_str(delta);
        let mut out = Vec::new();

        loop {
            if self.in_think {
                let Some(idx) = self.buf.find(THINK_CLOSE) else {
                    // Closing marker may still arrive in a later chunk.
                    break;
                };
                let inner: String = self.buf.drain(..idx).collect();
                if !inner.is_empty() {
                    out.push(TokenEvent::Thought(inner));
                }
                self.buf.drain(..THINK_CLOSE.len());
                self.in_think = false;
            } else if let Some(idx) = self.buf.find(THINK_OPEN) {
                let lead: String = self.buf.drain(..idx).collect();
                if !lead.is_empty() {
                    out.push(TokenEvent::Content(lead));
                }
                self.buf.drain(..THINK_OPEN.len());
                self.in_think = true;
            } else {
                // Hold back a tail that could still grow into an opening
                // marker, emit the rest.
                let hold = partial_marker_len(&self.buf, THINK_OPEN);
                let emit_to = self.buf.len() - hold;
                if emit_to > 0 {
                    let lead: String = self.buf.drain(..emit_to).collect();
                    out.push(TokenEvent::Content(lead));
                }
                break;
            }
        }

        out
    }

    /// Flushes whatever is left at end of stream. Content buffered inside
    /// an unterminated marker comes out as normal output.
    pub fn finish(mut self) -> Vec<TokenEvent> {
        if self.buf.is_empty() {
            Vec::new()
        } else {
            vec![TokenEvent::Content(std::mem::take(&mut self.buf))]
        }
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of
/// `marker`.
fn partial_marker_len(buf: &str, marker: &str) -> usize {
    let max = marker.len().saturating_sub(1).min(buf.len());
    for k in (1..=max).rev() {
        if !buf.is_char_boundary(buf.len() - k) {
            continue;
        }
        if marker.starts_with(&buf[buf.len() - k..]) {
            return k;
        }
    }
    0
}

/// Removes already-closed reasoning spans (and stray markers) from a
/// historical assistant message before it is resent as context.
pub fn strip_think_spans(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + THINK_OPEN.len()..];
        match after.find(THINK_CLOSE) {
            Some(close) => rest = &after[close + THINK_CLOSE.len()..],
            // Unmatched opener: drop the marker, keep the text.
            None => rest = after,
        }
    }
    out.push_str(rest);

    let out = out.replace(THINK_CLOSE, "");
    out.trim_start().to_string()
}
