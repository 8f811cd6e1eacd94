//! Answer fragments written into the response array.

use serde::ser::{Serialize, SerializeTuple, Serializer};

/// One element of the response array.
///
/// Every answer is encoded as a two element JSON array: the answer kind
/// followed by its argument (usually the action id from `meta.id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// The action passed its access check.
    Approved {
        /// Action id.
        id: String,
    },
    /// The action was denied by its access check.
    Forbidden {
        /// Action id.
        id: String,
    },
    /// The action was processed.
    Processed {
        /// Action id.
        id: String,
    },
    /// No handler is registered for the action type.
    UnknownAction {
        /// Action id.
        id: String,
    },
    /// No handler is registered for the subscribed channel.
    UnknownChannel {
        /// Action id.
        id: String,
    },
    /// The user is not allowed to perform the request.
    Unauthorized {
        /// User id.
        user_id: String,
    },
    /// Processing failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl Answer {
    /// Returns the answer kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Answer::Approved { .. } => "approved",
            Answer::Forbidden { .. } => "forbidden",
            Answer::Processed { .. } => "processed",
            Answer::UnknownAction { .. } => "unknownAction",
            Answer::UnknownChannel { .. } => "unknownChannel",
            Answer::Unauthorized { .. } => "unauthorized",
            Answer::Error { .. } => "error",
        }
    }

    fn argument(&self) -> &str {
        match self {
            Answer::Approved { id }
            | Answer::Forbidden { id }
            | Answer::Processed { id }
            | Answer::UnknownAction { id }
            | Answer::UnknownChannel { id } => id,
            Answer::Unauthorized { user_id } => user_id,
            Answer::Error { message } => message,
        }
    }

    /// Encodes the answer as a JSON fragment.
    pub fn to_json(&self) -> String {
        // Two strings always serialize; the fallback only keeps this infallible.
        serde_json::to_string(self)
            .unwrap_or_else(|_| String::from(r#"["error","answer encoding failed"]"#))
    }
}

impl Serialize for Answer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.kind())?;
        tuple.serialize_element(self.argument())?;
        tuple.end()
    }
}
