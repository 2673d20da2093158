//! Delivery of generated text to a connected client.
//!
//! A [`StreamSink`] is where streamed text goes; generation never fails
//! because the client went away, so a closed sink is reported as a value
//! rather than an error that propagates.

pub mod smoother;

use bytes::Bytes;
use tokio::sync::mpsc;

pub use smoother::{non_overlapping_suffix, RateSmoother, SmootherConfig};

/// The receiving side of the sink has gone away. Writers stop sending
/// but keep generating so the result can still be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

pub trait StreamSink {
    fn write(&mut self, text: &str) -> Result<(), SinkClosed>;
}

impl<S: StreamSink + ?Sized> StreamSink for &mut S {
    fn write(&mut self, text: &str) -> Result<(), SinkClosed> {
        (**self).write(text)
    }
}

/// Sink backed by an unbounded channel of body chunks, consumed by the
/// HTTP response stream.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Result<Bytes, std::io::Error>>,
}

impl ChannelSink {
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<Result<Bytes, std::io::Error>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Aborts the response body mid-stream. Used when generation fails
    /// after headers have already been sent.
    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Err(std::io::Error::other(message.to_string())));
    }
}

impl StreamSink for ChannelSink {
    fn write(&mut self, text: &str) -> Result<(), SinkClosed> {
        self.tx
            .send(Ok(Bytes::from(text.to_string())))
            .map_err(|_| SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_reports_closure() {
        let (mut sink, rx) = ChannelSink::pair();
        assert!(sink.write("still open").is_ok());
        drop(rx);
        assert_eq!(sink.write("gone"), Err(SinkClosed));
    }

    #[tokio::test]
    async fn written_text_arrives_as_body_chunks() {
        let (mut sink, mut rx) = ChannelSink::pair();
        sink.write("hello ").unwrap();
        sink.write("world").unwrap();
        drop(sink);

        let mut body = Vec::new();
        while let Some(chunk) = rx.recv().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"hello world");
    }
}
