//! Batch processing backends.

use crate::stream::ResponseStream;
use logux_protocol::{ActionCommand, Answer, Command, ProcessingError, ProcessingResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes a batch of commands and writes one or more fragments per command
/// to the stream, in command order.
///
/// Returning an error (or panicking) stops the batch; the request handler
/// then renders the failure into the stream and closes the array.
pub trait BatchProcessor: Send + Sync {
    /// Processes `commands`, writing results to `stream` as they complete.
    fn process(&self, stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()>;
}

impl<F> BatchProcessor for F
where
    F: Fn(&mut ResponseStream<'_>, &[Value]) -> ProcessingResult<()> + Send + Sync,
{
    fn process(&self, stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()> {
        self(stream, commands)
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The action may be processed.
    Approved,
    /// The action is denied.
    Forbidden,
}

/// Handles actions of one type.
pub trait ActionHandler: Send + Sync {
    /// Decides whether the action may be processed.
    fn authorize(&self, action: &ActionCommand<'_>) -> ProcessingResult<Verdict>;

    /// Processes an approved action.
    fn process(&self, action: &ActionCommand<'_>) -> ProcessingResult<()>;
}

/// Default [`BatchProcessor`] that dispatches `action` commands to
/// registered [`ActionHandler`]s by `action.type`.
///
/// For each action it writes `approved` or `forbidden`, then `processed`
/// once the handler succeeds. Types without a handler (and no fallback)
/// answer `unknownAction` and the batch continues.
#[derive(Default)]
pub struct ActionProcessor {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    fallback: RwLock<Option<Arc<dyn ActionHandler>>>,
}

impl ActionProcessor {
    /// Creates a processor with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for an action type, replacing any previous one.
    pub fn register(&self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.write().insert(action_type.into(), handler);
    }

    /// Sets the handler used for action types without a registered handler.
    pub fn set_fallback(&self, handler: Arc<dyn ActionHandler>) {
        *self.fallback.write() = Some(handler);
    }

    /// Returns the handler responsible for an action type.
    pub fn handler_for(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .read()
            .get(action_type)
            .cloned()
            .or_else(|| self.fallback.read().clone())
    }

    fn process_action(
        &self,
        stream: &mut ResponseStream<'_>,
        action: &ActionCommand<'_>,
    ) -> ProcessingResult<()> {
        let id = action.id().to_string();
        let Some(handler) = self.handler_for(action.action_type()) else {
            stream.write_answer(&Answer::UnknownAction { id })?;
            return Ok(());
        };

        if handler.authorize(action)? == Verdict::Forbidden {
            stream.write_answer(&Answer::Forbidden { id })?;
            return Ok(());
        }
        stream.write_answer(&Answer::Approved { id: id.clone() })?;

        handler.process(action)?;
        stream.write_answer(&Answer::Processed { id })?;
        Ok(())
    }
}

impl BatchProcessor for ActionProcessor {
    fn process(&self, stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()> {
        for (index, raw) in commands.iter().enumerate() {
            let command = Command::parse(raw)
                .map_err(|reason| ProcessingError::malformed_command(index, reason))?;
            match command {
                Command::Action(action) => self.process_action(stream, &action)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHandler {
        deny: bool,
        fail: bool,
        processed: Mutex<Vec<String>>,
    }

    impl ActionHandler for RecordingHandler {
        fn authorize(&self, _action: &ActionCommand<'_>) -> ProcessingResult<Verdict> {
            Ok(if self.deny {
                Verdict::Forbidden
            } else {
                Verdict::Approved
            })
        }

        fn process(&self, action: &ActionCommand<'_>) -> ProcessingResult<()> {
            if self.fail {
                return Err(ProcessingError::action_failed(
                    action.id(),
                    "storage unavailable",
                ));
            }
            self.processed.lock().push(action.id().to_string());
            Ok(())
        }
    }

    fn action(action_type: &str, id: &str) -> Value {
        json!(["action", { "type": action_type }, { "id": id, "time": 1 }])
    }

    fn run(processor: &ActionProcessor, commands: &[Value]) -> (ProcessingResult<()>, Value) {
        let mut out = Vec::new();
        let result = {
            let mut stream = ResponseStream::open(&mut out).unwrap();
            let result = processor.process(&mut stream, commands);
            stream.close().unwrap();
            result
        };
        (result, serde_json::from_slice(&out).unwrap())
    }

    #[test]
    fn approve_and_process() {
        let processor = ActionProcessor::new();
        let handler = Arc::new(RecordingHandler::default());
        processor.register("user/rename", handler.clone());

        let (result, body) = run(
            &processor,
            &[action("user/rename", "1 10:a 0"), action("user/rename", "2 10:a 0")],
        );

        result.unwrap();
        assert_eq!(
            body,
            json!([
                ["approved", "1 10:a 0"],
                ["processed", "1 10:a 0"],
                ["approved", "2 10:a 0"],
                ["processed", "2 10:a 0"]
            ])
        );
        assert_eq!(*handler.processed.lock(), vec!["1 10:a 0", "2 10:a 0"]);
    }

    #[test]
    fn forbidden_action_is_not_processed() {
        let processor = ActionProcessor::new();
        let handler = Arc::new(RecordingHandler {
            deny: true,
            ..Default::default()
        });
        processor.register("secret/read", handler.clone());

        let (result, body) = run(&processor, &[action("secret/read", "1 10:a 0")]);

        result.unwrap();
        assert_eq!(body, json!([["forbidden", "1 10:a 0"]]));
        assert!(handler.processed.lock().is_empty());
    }

    #[test]
    fn unknown_action_continues_batch() {
        let processor = ActionProcessor::new();
        processor.register("known", Arc::new(RecordingHandler::default()));

        let (result, body) = run(
            &processor,
            &[action("unknown", "1 10:a 0"), action("known", "2 10:a 0")],
        );

        result.unwrap();
        assert_eq!(
            body,
            json!([
                ["unknownAction", "1 10:a 0"],
                ["approved", "2 10:a 0"],
                ["processed", "2 10:a 0"]
            ])
        );
    }

    #[test]
    fn fallback_handles_unregistered_types() {
        let processor = ActionProcessor::new();
        let fallback = Arc::new(RecordingHandler::default());
        processor.set_fallback(fallback.clone());

        let (result, _) = run(&processor, &[action("anything", "1 10:a 0")]);

        result.unwrap();
        assert_eq!(fallback.processed.lock().len(), 1);
    }

    #[test]
    fn handler_failure_stops_batch() {
        let processor = ActionProcessor::new();
        processor.register(
            "broken",
            Arc::new(RecordingHandler {
                fail: true,
                ..Default::default()
            }),
        );

        let (result, body) = run(
            &processor,
            &[action("broken", "1 10:a 0"), action("broken", "2 10:a 0")],
        );

        assert!(matches!(result, Err(ProcessingError::ActionFailed { .. })));
        assert_eq!(body, json!([["approved", "1 10:a 0"]]));
    }

    #[test]
    fn malformed_command_reports_position() {
        let processor = ActionProcessor::new();
        processor.register("known", Arc::new(RecordingHandler::default()));

        let (result, _) = run(&processor, &[action("known", "1 10:a 0"), json!(42)]);

        assert!(matches!(
            result,
            Err(ProcessingError::MalformedCommand { index: 1, .. })
        ));
    }
}
