//! Streaming response writer.
//!
//! The response array is opened with `[` as soon as a request passes
//! validation and every fragment is flushed as it is written. The closing
//! `]` is owned by [`ResponseStream`]: `close` writes it explicitly and the
//! `Drop` impl writes it on any path that skipped `close`.

use logux_protocol::Answer;
use std::io::{self, Write};
use tracing::warn;

/// Media type of every endpoint response.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Status line and content type of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
}

impl ResponseHead {
    /// Creates a JSON response head with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: JSON_CONTENT_TYPE,
        }
    }

    /// `200 OK` with a JSON content type.
    pub fn ok() -> Self {
        Self::new(200)
    }
}

/// Destination of a response: a head followed by body bytes.
///
/// The head must be started exactly once, before any body byte.
pub trait ResponseSink: Write {
    /// Commits the status line and headers.
    fn start(&mut self, head: &ResponseHead) -> io::Result<()>;
}

/// A response collected in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedResponse {
    /// The committed head, if any.
    pub head: Option<ResponseHead>,
    /// Body bytes written so far.
    pub body: Vec<u8>,
}

impl BufferedResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the committed status code.
    pub fn status(&self) -> Option<u16> {
        self.head.map(|head| head.status)
    }

    /// Returns the body as text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl Write for BufferedResponse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseSink for BufferedResponse {
    fn start(&mut self, head: &ResponseHead) -> io::Result<()> {
        if self.head.is_some() {
            return Err(io::Error::other("response head already sent"));
        }
        self.head = Some(*head);
        Ok(())
    }
}

/// An open JSON array in the response body.
///
/// Fragments are separated with commas automatically, so callers only ever
/// write complete elements.
pub struct ResponseStream<'a> {
    out: &'a mut dyn Write,
    elements: usize,
    closed: bool,
}

impl<'a> ResponseStream<'a> {
    /// Writes `[` and returns the open stream.
    pub fn open(out: &'a mut dyn Write) -> io::Result<Self> {
        out.write_all(b"[")?;
        out.flush()?;
        Ok(Self {
            out,
            elements: 0,
            closed: false,
        })
    }

    /// Appends one JSON fragment to the array.
    pub fn write(&mut self, fragment: &str) -> io::Result<()> {
        if self.elements > 0 {
            self.out.write_all(b",")?;
        }
        self.out.write_all(fragment.as_bytes())?;
        self.out.flush()?;
        self.elements += 1;
        Ok(())
    }

    /// Appends an answer to the array.
    pub fn write_answer(&mut self, answer: &Answer) -> io::Result<()> {
        self.write(&answer.to_json())
    }

    /// Returns the number of fragments written.
    pub fn len(&self) -> usize {
        self.elements
    }

    /// Returns true if no fragment was written.
    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }

    /// Writes `]` and finishes the stream.
    pub fn close(mut self) -> io::Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> io::Result<()> {
        // A failed close is not retried.
        self.closed = true;
        self.out.write_all(b"]")?;
        self.out.flush()
    }
}

impl Drop for ResponseStream<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.finish() {
                warn!(error = %err, "failed to close response array");
            }
        }
    }
}
