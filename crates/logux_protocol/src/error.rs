//! Processing errors raised while a batch is streamed.

use std::backtrace::Backtrace;
use std::fmt;
use thiserror::Error;

/// Result type for batch processing.
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Stack trace recorded where a failure was created.
///
/// Always captured, independent of `RUST_BACKTRACE`.
pub struct Trace(Backtrace);

impl Trace {
    /// Captures the current stack.
    pub fn capture() -> Self {
        Self(Backtrace::force_capture())
    }

    /// Returns the recorded backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.0
    }
}

impl From<Backtrace> for Trace {
    fn from(backtrace: Backtrace) -> Self {
        Self(backtrace)
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trace({:?})", self.0.status())
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Failures raised after the response stream has been opened.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// No handler knows the action type.
    #[error("unknown action {id}")]
    UnknownAction {
        /// Action id.
        id: String,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// No handler knows the subscribed channel.
    #[error("unknown channel for action {id}")]
    UnknownChannel {
        /// Action id.
        id: String,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// The user is not allowed to perform the request.
    #[error("user {user_id} is not authorized")]
    Unauthorized {
        /// User id.
        user_id: String,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// A batch entry could not be interpreted.
    #[error("malformed command at position {index}: {reason}")]
    MalformedCommand {
        /// Position of the entry in the batch.
        index: usize,
        /// What was wrong with it.
        reason: String,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// An action handler failed.
    #[error("action {id} failed: {message}")]
    ActionFailed {
        /// Action id.
        id: String,
        /// Failure description.
        message: String,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// The processor panicked.
    #[error("processor panicked: {message}")]
    Panicked {
        /// Panic payload.
        message: String,
        /// Stack of the panicking thread.
        trace: Trace,
    },

    /// Writing to the response stream failed.
    #[error("stream write failed: {source}")]
    Stream {
        /// Transport error.
        source: std::io::Error,
        /// Where the failure was raised.
        trace: Trace,
    },

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Failure description.
        message: String,
        /// Where the failure was raised.
        trace: Trace,
    },
}

impl From<std::io::Error> for ProcessingError {
    fn from(source: std::io::Error) -> Self {
        Self::Stream {
            source,
            trace: Trace::capture(),
        }
    }
}

impl ProcessingError {
    /// Creates a generic processing error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates an unknown action error.
    pub fn unknown_action(id: impl Into<String>) -> Self {
        Self::UnknownAction {
            id: id.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates an unknown channel error.
    pub fn unknown_channel(id: impl Into<String>) -> Self {
        Self::UnknownChannel {
            id: id.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates an authorization error.
    pub fn unauthorized(user_id: impl Into<String>) -> Self {
        Self::Unauthorized {
            user_id: user_id.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates a malformed command error.
    pub fn malformed_command(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedCommand {
            index,
            reason: reason.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates an action failure.
    pub fn action_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            id: id.into(),
            message: message.into(),
            trace: Trace::capture(),
        }
    }

    /// Creates a panic failure with the stack recorded by the panic hook.
    pub fn panicked(message: impl Into<String>, trace: Trace) -> Self {
        Self::Panicked {
            message: message.into(),
            trace,
        }
    }

    /// Returns the stack trace recorded where the failure was raised.
    pub fn trace(&self) -> &Trace {
        match self {
            ProcessingError::UnknownAction { trace, .. }
            | ProcessingError::UnknownChannel { trace, .. }
            | ProcessingError::Unauthorized { trace, .. }
            | ProcessingError::MalformedCommand { trace, .. }
            | ProcessingError::ActionFailed { trace, .. }
            | ProcessingError::Panicked { trace, .. }
            | ProcessingError::Stream { trace, .. }
            | ProcessingError::Other { trace, .. } => trace,
        }
    }

    /// Returns true if the failure came from the transport rather than
    /// from the processing itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProcessingError::Stream { .. })
    }
}
