//! Rendering of processing failures into response fragments.

use crate::answer::Answer;
use crate::error::ProcessingError;

/// Turns a [`ProcessingError`] into the JSON fragment that closes a broken
/// batch.
///
/// Rendering never fails and always yields one syntactically valid JSON
/// array, so the fragment can be appended to a partially written response.
/// Stack traces stay in the server log and are never rendered.
#[derive(Debug)]
pub struct ErrorRenderer<'a> {
    error: &'a ProcessingError,
}

impl<'a> ErrorRenderer<'a> {
    /// Creates a renderer for the given error.
    pub fn new(error: &'a ProcessingError) -> Self {
        Self { error }
    }

    /// Returns the answer describing the failure.
    pub fn answer(&self) -> Answer {
        match self.error {
            ProcessingError::UnknownAction { id, .. } => Answer::UnknownAction { id: id.clone() },
            ProcessingError::UnknownChannel { id, .. } => Answer::UnknownChannel { id: id.clone() },
            ProcessingError::Unauthorized { user_id, .. } => Answer::Unauthorized {
                user_id: user_id.clone(),
            },
            other => Answer::Error {
                message: other.to_string(),
            },
        }
    }

    /// Returns the rendered JSON fragment.
    pub fn message(&self) -> String {
        self.answer().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Trace;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn render_known_failures() {
        let err = ProcessingError::unknown_action("1 10:a 0");
        assert_eq!(ErrorRenderer::new(&err).message(), r#"["unknownAction","1 10:a 0"]"#);

        let err = ProcessingError::unknown_channel("2 10:a 0");
        assert_eq!(ErrorRenderer::new(&err).message(), r#"["unknownChannel","2 10:a 0"]"#);

        let err = ProcessingError::unauthorized("10");
        assert_eq!(ErrorRenderer::new(&err).message(), r#"["unauthorized","10"]"#);
    }

    #[test]
    fn render_generic_failure() {
        let err = ProcessingError::other("database is down");
        let rendered: Value = serde_json::from_str(&ErrorRenderer::new(&err).message()).unwrap();
        assert_eq!(rendered, json!(["error", "database is down"]));
    }

    #[test]
    fn trace_is_not_rendered() {
        let err = ProcessingError::panicked("index out of bounds", Trace::capture());
        let rendered: Value = serde_json::from_str(&ErrorRenderer::new(&err).message()).unwrap();
        assert_eq!(
            rendered,
            json!(["error", "processor panicked: index out of bounds"])
        );
    }

    proptest! {
        #[test]
        fn rendering_is_always_valid_json(message in any::<String>(), id in any::<String>()) {
            for err in [
                ProcessingError::other(message.clone()),
                ProcessingError::panicked(message.clone(), Trace::capture()),
                ProcessingError::unknown_action(id.clone()),
                ProcessingError::action_failed(id.clone(), message.clone()),
            ] {
                let rendered: Value = serde_json::from_str(&ErrorRenderer::new(&err).message())
                    .unwrap();
                prop_assert!(rendered.is_array());
                prop_assert_eq!(rendered.as_array().unwrap().len(), 2);
            }
        }
    }
}
