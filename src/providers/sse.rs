//! Minimal server-sent-events reader over a streaming HTTP response.

#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

use super::GenerateError;

/// Source of raw byte chunks; scriptable in tests.
pub enum ByteSource {
    Response(Response),
    #[cfg(test)]
    Scripted(VecDeque<Bytes>),
}

impl ByteSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, GenerateError> {
        match self {
            ByteSource::Response(response) => response
                .chunk()
                .await
                .map_err(|e| GenerateError::new(format!("stream read failed: {}", e))),
            #[cfg(test)]
            ByteSource::Scripted(chunks) => Ok(chunks.pop_front()),
        }
    }
}

/// Line-oriented SSE reader; yields the payload of each `data:` line.
/// Chunk boundaries need not align with lines or UTF-8 code points.
pub struct SseReader {
    source: ByteSource,
    buf: Vec<u8>,
}

impl SseReader {
    pub fn from_response(response: Response) -> Self {
        Self {
            source: ByteSource::Response(response),
            buf: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn scripted(chunks: Vec<Bytes>) -> Self {
        Self {
            source: ByteSource::Scripted(chunks.into()),
            buf: Vec::new(),
        }
    }

    /// Next `data:` payload, or `None` when the stream is exhausted.
    pub async fn next_data(&mut self) -> Result<Option<String>, GenerateError> {
        loop {
            if let Some(line) = self.take_line() {
                if let Some(payload) = parse_data_line(&line) {
                    return Ok(Some(payload));
                }
                // Comments, event names and blank separators are skipped.
                continue;
            }

            match self.source.next_chunk().await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => {
                    // Stream ended; a final unterminated line still counts.
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    if let Some(payload) = parse_data_line(&line) {
                        return Ok(Some(payload));
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let nl = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=nl).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

fn parse_data_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    Some(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_events_across_chunk_boundaries() {
        let mut sse = SseReader::scripted(vec![
            Bytes::from_static(b"data:"),
            Bytes::from_static(b" hello\n"),
            Bytes::from_static(b"\ndata: bye\n\n"),
        ]);
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn skips_comments_and_event_lines() {
        let mut sse = SseReader::scripted(vec![Bytes::from_static(
            b": keep-alive\nevent: message\ndata: payload\n\n",
        )]);
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "payload");
        assert_eq!(sse.next_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn tolerates_crlf_and_missing_final_newline() {
        let mut sse = SseReader::scripted(vec![
            Bytes::from_static(b"data: one\r\n\r\n"),
            Bytes::from_static(b"data: two"),
        ]);
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "one");
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "two");
        assert_eq!(sse.next_data().await.unwrap(), None);
    }

    #[tokio::test]
    async fn utf8_split_across_chunks() {
        // "é" is 0xC3 0xA9.
        let mut sse = SseReader::scripted(vec![
            Bytes::from_static(b"data: caf\xc3"),
            Bytes::from_static(b"\xa9\n\n"),
        ]);
        assert_eq!(sse.next_data().await.unwrap().unwrap(), "café");
    }
}
