//! Adaptive pacing of streamed output.
//!
//! Some providers deliver text in large, bursty chunks. The smoother
//! re-emits that text word by word at a rate derived from the observed
//! arrival rate, so the client sees a steady stream instead of stalls
//! followed by walls of text.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::providers::GenerateError;

use super::{SinkClosed, StreamSink};

/// Shown in place of a reasoning trace for providers that do not expose
/// one, paced one word at a time so the wait reads as activity. Framed
/// as a reasoning span, so clients render it as a thought block and
/// history preparation strips it like any real trace.
const THINK_PREAMBLE: &str = "<think>\nGive me a moment. This model works through \
its reasoning privately, so I will take a short pause and then stream \
the full answer.\n</think>\n";

#[derive(Debug, Clone, Copy)]
pub struct SmootherConfig {
    /// Sliding window over which the arrival rate is measured.
    pub window_ms: u64,
    /// Emission floor in words per second.
    pub min_wps: f64,
    /// Emission ceiling in words per second.
    pub max_wps: f64,
    /// Poll interval while the queue is empty but the stream is open.
    pub idle_poll_ms: u64,
    /// Per-word delay while emitting the think preamble.
    pub preamble_delay_ms: u64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            window_ms: 800,
            min_wps: 30.0,
            max_wps: 70.0,
            idle_poll_ms: 50,
            preamble_delay_ms: 30,
        }
    }
}

/// Paces text fragments from a channel into a sink.
///
/// Incoming fragments are deduplicated against everything already
/// accepted, split into words and emitted with a delay recomputed from
/// the recent arrival rate. The accepted text survives sink closure, so
/// the caller can still persist a complete message.
pub struct RateSmoother<S> {
    config: SmootherConfig,
    sink: S,
    accepted: String,
    sink_open: bool,
    arrivals: VecDeque<(Instant, usize)>,
}

impl<S: StreamSink> RateSmoother<S> {
    pub fn new(sink: S, config: SmootherConfig) -> Self {
        Self {
            config,
            sink,
            accepted: String::new(),
            sink_open: true,
            arrivals: VecDeque::new(),
        }
    }

    /// Drives the smoother until the channel closes or yields an error.
    ///
    /// On an upstream error, everything already queued is still emitted
    /// at the current pace before the error is returned; the client keeps
    /// whatever was generated.
    pub async fn run(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<Result<String, GenerateError>>,
    ) -> Result<(), GenerateError> {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut upstream_err: Option<GenerateError> = None;
        let mut open = true;

        loop {
            while open && upstream_err.is_none() {
                match rx.try_recv() {
                    Ok(Ok(fragment)) => self.accept(&fragment, &mut queue),
                    Ok(Err(e)) => upstream_err = Some(e),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => open = false,
                }
            }

            if let Some(word) = queue.pop_front() {
                self.write_out(&word);
                tokio::time::sleep(self.current_delay()).await;
                continue;
            }

            if let Some(e) = upstream_err {
                return Err(e);
            }
            if !open {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(self.config.idle_poll_ms)).await;
        }
    }

    /// Streams the canned preamble at a fixed word cadence.
    pub async fn emit_preamble(&mut self) {
        for word in word_chunks(THINK_PREAMBLE) {
            self.accepted.push_str(&word);
            self.write_out(&word);
            tokio::time::sleep(Duration::from_millis(self.config.preamble_delay_ms)).await;
        }
    }

    /// Everything accepted so far, including text the sink never saw.
    pub fn into_text(self) -> String {
        self.accepted
    }

    fn accept(&mut self, fragment: &str, queue: &mut VecDeque<String>) {
        let addition = non_overlapping_suffix(&self.accepted, fragment);
        if addition.is_empty() {
            return;
        }
        self.accepted.push_str(&addition);
        let words = word_chunks(&addition);
        self.record_arrival(words.len());
        queue.extend(words);
    }

    fn write_out(&mut self, text: &str) {
        if !self.sink_open {
            return;
        }
        if let Err(SinkClosed) = self.sink.write(text) {
            tracing::debug!("stream sink closed mid-generation");
            self.sink_open = false;
        }
    }

    fn record_arrival(&mut self, words: usize) {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.window_ms);
        self.arrivals.push_back((now, words));
        while let Some(&(t, _)) = self.arrivals.front() {
            if now.duration_since(t) > window {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    fn current_delay(&self) -> Duration {
        let now = Instant::now();
        let window = Duration::from_millis(self.config.window_ms);
        let recent: usize = self
            .arrivals
            .iter()
            .filter(|&&(t, _)| now.duration_since(t) <= window)
            .map(|&(_, n)| n)
            .sum();

        let observed = recent as f64 * 1000.0 / self.config.window_ms as f64;
        // Run slightly below the arrival rate so the queue keeps a small
        // reserve to ride out upstream gaps.
        let wps = (observed * 0.9).clamp(self.config.min_wps, self.config.max_wps);
        Duration::from_millis((1000.0 / wps).round() as u64)
    }
}

/// The part of `incoming` that does not overlap the end of `existing`.
///
/// Upstream providers occasionally resend the tail of the previous chunk
/// at the start of the next one; the longest such overlap is removed.
/// All indices respect char boundaries.
pub fn non_overlapping_suffix(existing: &str, incoming: &str) -> String {
    let max = existing.len().min(incoming.len());
    for k in (1..=max).rev() {
        if !incoming.is_char_boundary(k) {
            continue;
        }
        if existing.ends_with(&incoming[..k]) {
            return incoming[k..].to_string();
        }
    }
    incoming.to_string()
}

/// Splits text into words with their trailing whitespace attached, so
/// that concatenating the chunks reproduces the input exactly.
fn word_chunks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
            current.push(ch);
        } else {
            if in_whitespace && !current.is_empty() {
                out.push(std::mem::take(&mut current));
                in_whitespace = false;
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
