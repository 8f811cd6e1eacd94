//! Bridge from the blocking request handler to a streamed axum body.
//!
//! The handler runs on a blocking thread and writes through a
//! [`ChannelSink`]. The head travels over a oneshot channel so the async
//! side can build the response as soon as the status is committed; every
//! body write becomes one frame of the response stream.

use crate::stream::{ResponseHead, ResponseSink};
use bytes::Bytes;
use std::io::{self, Write};
use tokio::sync::{mpsc, oneshot};

/// Blocking [`ResponseSink`] that hands the response to the async side.
///
/// Once the receiving side is gone every write fails with `BrokenPipe`.
pub(crate) struct ChannelSink {
    head: Option<oneshot::Sender<ResponseHead>>,
    chunks: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub(crate) fn new(head: oneshot::Sender<ResponseHead>, chunks: mpsc::Sender<Bytes>) -> Self {
        Self {
            head: Some(head),
            chunks,
        }
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.chunks
            .blocking_send(Bytes::copy_from_slice(buf))
            .map_err(|_| disconnected())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for ChannelSink {
    fn start(&mut self, head: &ResponseHead) -> io::Result<()> {
        let sender = self
            .head
            .take()
            .ok_or_else(|| io::Error::other("response head already sent"))?;
        sender.send(*head).map_err(|_| disconnected())
    }
}
