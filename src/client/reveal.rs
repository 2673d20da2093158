//! Gradual reveal of buffered streamed text.
//!
//! Network chunks arrive in bursts; revealing them verbatim makes the
//! transcript jump. Arriving text is cut into word-preserving chunks and
//! released on ticks with a budget that grows with the square root of
//! the backlog, so a deep buffer catches up quickly without teleporting.

use std::collections::VecDeque;

/// Largest chunk produced while the stream is still running.
const MAX_CHUNK_CHARS: usize = 180;
/// Tails shorter than this are held for the next arrival while the
/// stream is still running.
const MIN_CHUNK_CHARS: usize = 30;

/// Per-tick reveal budget bounds, in characters.
const MIN_TICK_BUDGET: usize = 40;
const MAX_TICK_BUDGET: usize = 1200;

#[derive(Debug, Default)]
pub struct RevealQueue {
    chunks: VecDeque<String>,
    /// Short remainder awaiting more text; flushed at end of stream.
    tail: String,
    pending_chars: usize,
}

impl RevealQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues newly arrived text. While `streaming`, a remainder shorter
    /// than the minimum chunk size is held until it grows; at end of
    /// stream everything is queued.
    pub fn push(&mut self, appended: &str, streaming: bool) {
        let mut text = std::mem::take(&mut self.tail);
        text.push_str(appended);

        let (chunks, tail) = chunk_preserving_words(&text, streaming);
        for chunk in chunks {
            self.pending_chars += chunk.chars().count();
            self.chunks.push_back(chunk);
        }
        self.tail = tail;
    }

    /// Releases whole chunks up to this tick's budget and returns them
    /// concatenated. At least one chunk is released when any is queued.
    pub fn tick(&mut self) -> String {
        let mut budget = self.tick_budget();
        let mut out = String::new();

        while let Some(chunk) = self.chunks.front() {
            let len = chunk.chars().count();
            if !out.is_empty() && len > budget {
                break;
            }
            budget = budget.saturating_sub(len);
            self.pending_chars -= len;
            out.push_str(&self.chunks.pop_front().unwrap_or_default());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.tail.is_empty()
    }

    pub fn pending_chars(&self) -> usize {
        self.pending_chars
    }

    fn tick_budget(&self) -> usize {
        let raw = ((self.pending_chars as f64).sqrt() * 6.0).floor() as usize;
        raw.clamp(MIN_TICK_BUDGET, MAX_TICK_BUDGET)
    }
}

/// Splits text into chunks of roughly at most `MAX_CHUNK_CHARS`, cutting
/// at whitespace and flushing early at sentence ends. Returns the chunks
/// plus the held-back remainder (empty unless `streaming`); concatenating
/// both always reproduces the input.
fn chunk_preserving_words(text: &str, streaming: bool) -> (Vec<String>, String) {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for word in split_inclusive_whitespace(text) {
        let word_chars = word.chars().count();

        if current_chars + word_chars > MAX_CHUNK_CHARS && current_chars >= MIN_CHUNK_CHARS {
            out.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        current.push_str(word);
        current_chars += word_chars;

        // Sentence boundaries make natural reveal points.
        if current_chars >= MIN_CHUNK_CHARS && ends_sentence(&current) {
            out.push(std::mem::take(&mut current));
            current_chars = 0;
        }
    }

    if current.is_empty() {
        (out, String::new())
    } else if streaming && current_chars < MIN_CHUNK_CHARS {
        (out, current)
    } else {
        out.push(current);
        (out, String::new())
    }
}

fn ends_sentence(chunk: &str) -> bool {
    matches!(
        chunk.trim_end().chars().last(),
        Some('.') | Some('!') | Some('?') | Some('\n')
    )
}

/// Words keep their trailing whitespace so concatenation is lossless,
/// mirroring the server-side pacing split.
fn split_inclusive_whitespace(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_whitespace = false;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_whitespace = true;
        } else if in_whitespace {
            out.push(&text[start..i]);
            start = i;
            in_whitespace = false;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_is_lossless() {
        let text = "One sentence. Another somewhat longer sentence that keeps going \
                    for a while so the splitter has something to cut, and then some.";
        let (chunks, tail) = chunk_preserving_words(text, false);
        assert_eq!(chunks.concat() + &tail, text);
        assert!(tail.is_empty());
    }

    #[test]
    fn short_tail_is_held_while_streaming() {
        let (chunks, tail) = chunk_preserving_words("a few words", true);
        assert!(chunks.is_empty());
        assert_eq!(tail, "a few words");

        // End of stream flushes the same text.
        let (chunks, tail) = chunk_preserving_words("a few words", false);
        assert_eq!(chunks, vec!["a few words"]);
        assert!(tail.is_empty());
    }

    #[test]
    fn sentence_ends_flush_early() {
        let text = "This is a complete sentence of decent length. tail";
        let (chunks, _) = chunk_preserving_words(text, true);
        assert!(chunks[0].trim_end().ends_with('.'));
    }

    #[test]
    fn budget_stays_within_bounds() {
        let mut queue = RevealQueue::new();
        assert_eq!(queue.tick_budget(), MIN_TICK_BUDGET);

        queue.push(&"x".repeat(100_000), false);
        assert_eq!(queue.tick_budget(), MAX_TICK_BUDGET);

        // sqrt(2500) * 6 = 300
        let mut mid = RevealQueue::new();
        mid.pending_chars = 2500;
        assert_eq!(mid.tick_budget(), 300);
    }

    #[test]
    fn tick_releases_whole_chunks_and_drains() {
        let mut queue = RevealQueue::new();
        let text = "word ".repeat(200);
        queue.push(&text, false);

        let mut revealed = String::new();
        let mut ticks = 0;
        while !queue.chunks.is_empty() {
            revealed.push_str(&queue.tick());
            ticks += 1;
            assert!(ticks < 100, "queue failed to drain");
        }
        assert_eq!(revealed, text);
        // The backlog is large enough that it cannot drain in one tick.
        assert!(ticks > 1);
    }

    #[test]
    fn held_tail_joins_next_push() {
        let mut queue = RevealQueue::new();
        queue.push("short", true);
        assert!(queue.chunks.is_empty());

        queue.push(
            " and now enough additional words have arrived to cross the line.",
            true,
        );
        let combined: String = queue.chunks.iter().cloned().collect::<String>() + &queue.tail;
        assert_eq!(
            combined,
            "short and now enough additional words have arrived to cross the line."
        );
        assert!(!queue.chunks.is_empty());
    }

    #[test]
    fn tick_on_empty_queue_returns_nothing() {
        let mut queue = RevealQueue::new();
        assert_eq!(queue.tick(), "");
    }
}
