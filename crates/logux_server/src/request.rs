//! Inbound request body with memoized JSON parsing.

use serde_json::Value;
use std::io::Read;
use thiserror::Error;

/// Why the request body could not be turned into JSON.
#[derive(Error, Debug)]
pub enum BodyError {
    /// Reading the body failed.
    #[error("failed to read body: {0}")]
    Io(#[from] std::io::Error),

    /// The body exceeds the size limit.
    #[error("body exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: usize,
    },

    /// The body is not valid JSON.
    #[error("invalid json: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The body source was already consumed.
    #[error("body already consumed")]
    Consumed,
}

/// A request body that is read and parsed at most once.
///
/// Reading consumes the underlying source, so the parsed value (or the parse
/// failure) is kept for the rest of the request.
pub struct InboundRequest<R> {
    source: Option<R>,
    limit: usize,
    parsed: Option<Result<Value, BodyError>>,
}

impl<R: Read> InboundRequest<R> {
    /// Wraps a body source without a size limit.
    pub fn new(source: R) -> Self {
        Self::with_limit(source, usize::MAX)
    }

    /// Wraps a body source that may hold at most `limit` bytes.
    pub fn with_limit(source: R, limit: usize) -> Self {
        Self {
            source: Some(source),
            limit,
            parsed: None,
        }
    }

    /// Returns the parsed body, reading the source on first access only.
    pub fn json(&mut self) -> Result<&Value, &BodyError> {
        let source = &mut self.source;
        let limit = self.limit;
        self.parsed
            .get_or_insert_with(|| read_json(source.take(), limit))
            .as_ref()
    }

    /// Returns true once the source has been read.
    pub fn is_consumed(&self) -> bool {
        self.source.is_none()
    }
}

fn read_json<R: Read>(source: Option<R>, limit: usize) -> Result<Value, BodyError> {
    let source = source.ok_or(BodyError::Consumed)?;
    let mut bytes = Vec::new();
    source
        .take(limit.saturating_add(1) as u64)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(serde_json::from_slice(&bytes)?)
}
