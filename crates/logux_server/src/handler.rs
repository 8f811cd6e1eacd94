//! Request handler for the back-end endpoint.
//!
//! A request moves through `Received → BodyParsed → Validated → Streaming →
//! Closed`. Validation failures end in `Rejected` before a single body byte
//! is written; once streaming starts the status is committed and failures
//! are reported inside the JSON array instead.

use crate::config::{ErrorCallback, ServerConfig};
use crate::error::ServerResult;
use crate::processor::BatchProcessor;
use crate::request::InboundRequest;
use crate::stream::{ResponseHead, ResponseSink, ResponseStream};
use logux_protocol::{
    ErrorRenderer, ProcessingError, ProcessingResult, ProtocolPolicy, Rejection, Trace, ValidBody,
};
use serde_json::Value;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use tracing::{debug, error, warn};

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// How a request ended.
#[derive(Debug)]
pub enum Outcome {
    /// Rejected before streaming; the body is the rejection message.
    Rejected(Rejection),
    /// Every command was processed.
    Completed {
        /// Fragments written by the processor.
        fragments: usize,
    },
    /// Processing failed after streaming began.
    Interrupted {
        /// Fragments written before the failure.
        fragments: usize,
        /// The caught failure.
        error: ProcessingError,
    },
}

impl Outcome {
    /// Returns the HTTP status that was committed.
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Rejected(rejection) => rejection.status(),
            Outcome::Completed { .. } | Outcome::Interrupted { .. } => 200,
        }
    }
}

/// Handler for back-end requests.
pub struct RequestHandler {
    policy: ProtocolPolicy,
    processor: Arc<dyn BatchProcessor>,
    on_error: Option<ErrorCallback>,
}

impl RequestHandler {
    /// Creates a handler from a server configuration.
    pub fn new(config: &ServerConfig, processor: Arc<dyn BatchProcessor>) -> Self {
        Self {
            policy: config.policy(),
            processor,
            on_error: config.on_error().cloned(),
        }
    }

    /// Returns the validation policy.
    pub fn policy(&self) -> &ProtocolPolicy {
        &self.policy
    }

    /// Handles one request, writing the whole response to `sink`.
    ///
    /// Returns an error only when the sink itself fails.
    pub fn handle<R, S>(&self, request: &mut InboundRequest<R>, sink: &mut S) -> ServerResult<Outcome>
    where
        R: Read,
        S: ResponseSink,
    {
        let body = match self.validate(request) {
            Ok(body) => body,
            Err(rejection) => return reject(rejection, sink),
        };

        sink.start(&ResponseHead::ok())?;
        self.stream_batch(body.commands(), sink)
    }

    fn validate<'r, R: Read>(
        &self,
        request: &'r mut InboundRequest<R>,
    ) -> Result<ValidBody<'r>, Rejection> {
        let parsed = request.json().map_err(|err| {
            debug!(error = %err, "request body is not valid json");
            Rejection::WrongBody
        })?;
        self.policy.validate(parsed)
    }

    fn stream_batch<S: ResponseSink>(&self, commands: &[Value], sink: &mut S) -> ServerResult<Outcome> {
        let mut stream = ResponseStream::open(sink)?;

        let result = run_guarded(|| self.processor.process(&mut stream, commands));

        let fragments = stream.len();
        let outcome = match result {
            Ok(()) => Outcome::Completed { fragments },
            Err(error) => {
                self.report(&error);
                stream.write(&ErrorRenderer::new(&error).message())?;
                Outcome::Interrupted { fragments, error }
            }
        };

        stream.close()?;
        Ok(outcome)
    }

    fn report(&self, failure: &ProcessingError) {
        if let Some(callback) = &self.on_error {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(failure))).is_err() {
                warn!("error callback panicked");
            }
        }
        error!(
            error = %failure,
            backtrace = %failure.trace(),
            "batch processing failed"
        );
    }
}

/// Chains a panic hook that records the panicking stack, but only on threads
/// currently inside [`run_guarded`].
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.try_with(Cell::get).unwrap_or(false) {
                let _ = PANIC_TRACE
                    .try_with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            }
            previous(info);
        }));
    });
}

/// Runs `f`, turning a panic into [`ProcessingError::Panicked`] carrying the
/// stack of the panic site.
fn run_guarded<T>(f: impl FnOnce() -> ProcessingResult<T>) -> ProcessingResult<T> {
    install_panic_hook();
    let outer = CAPTURING.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|flag| flag.set(outer));

    result.unwrap_or_else(|payload| {
        let trace = PANIC_TRACE
            .with(|slot| slot.borrow_mut().take())
            .map_or_else(Trace::capture, Trace::from);
        Err(ProcessingError::panicked(
            panic_message(payload.as_ref()),
            trace,
        ))
    })
}

fn reject<S: ResponseSink>(rejection: Rejection, sink: &mut S) -> ServerResult<Outcome> {
    debug!(status = rejection.status(), reason = %rejection, "request rejected");
    sink.start(&ResponseHead::new(rejection.status()))?;
    sink.write_all(rejection.message().as_bytes())?;
    sink.flush()?;
    Ok(Outcome::Rejected(rejection))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BufferedResponse;
    use logux_protocol::Answer;
    use serde_json::json;
    use std::backtrace::BacktraceStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()> {
        for command in commands {
            stream.write(&command.to_string())?;
        }
        Ok(())
    }

    fn create_handler(processor: Arc<dyn BatchProcessor>) -> RequestHandler {
        RequestHandler::new(&ServerConfig::new("secret"), processor)
    }

    fn send(handler: &RequestHandler, body: &[u8]) -> (Outcome, BufferedResponse) {
        let mut request = InboundRequest::new(body);
        let mut response = BufferedResponse::new();
        let outcome = handler.handle(&mut request, &mut response).unwrap();
        (outcome, response)
    }

    #[test]
    fn empty_batch() {
        let handler = create_handler(Arc::new(echo));
        let (outcome, response) = send(&handler, br#"{"version":4,"secret":"secret","commands":[]}"#);

        assert!(matches!(outcome, Outcome::Completed { fragments: 0 }));
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body_text(), "[]");
    }

    #[test]
    fn rejection_writes_plain_message() {
        let handler = create_handler(Arc::new(echo));

        let (outcome, response) = send(&handler, b"{oops");
        assert!(matches!(outcome, Outcome::Rejected(Rejection::WrongBody)));
        assert_eq!(response.status(), Some(400));
        assert_eq!(response.body_text(), "Wrong body");
        assert_eq!(response.head.unwrap().content_type, "application/json");

        let (_, response) = send(&handler, br#"{"version":4,"secret":"nope"}"#);
        assert_eq!(response.status(), Some(403));
        assert_eq!(response.body_text(), "Wrong secret");

        let (_, response) = send(&handler, br#"{"version":1,"secret":"secret"}"#);
        assert_eq!(response.status(), Some(400));
        assert_eq!(
            response.body_text(),
            "Back-end protocol version is not supported"
        );
    }

    #[test]
    fn failure_closes_array() {
        fn fail_second(stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()> {
            stream.write(&commands[0].to_string())?;
            Err(ProcessingError::other("database is down"))
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = ServerConfig::new("secret").with_on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let handler = RequestHandler::new(&config, Arc::new(fail_second));

        let (outcome, response) = send(
            &handler,
            br#"{"version":4,"secret":"secret","commands":[1,2,3]}"#,
        );

        assert!(matches!(outcome, Outcome::Interrupted { fragments: 1, .. }));
        assert_eq!(outcome.status(), 200);
        assert_eq!(response.status(), Some(200));
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body[0], 1);
        assert_eq!(body[1][0], "error");
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_is_caught() {
        #[inline(never)]
        fn explode(_: &mut ResponseStream<'_>, _: &[Value]) -> ProcessingResult<()> {
            panic!("processor bug");
        }

        let handler = create_handler(Arc::new(explode));
        let (outcome, response) = send(&handler, br#"{"version":4,"secret":"secret","commands":[1]}"#);

        match outcome {
            Outcome::Interrupted { error, .. } => {
                assert!(
                    matches!(error, ProcessingError::Panicked { ref message, .. } if message == "processor bug")
                );
                let status = error.trace().backtrace().status();
                assert_ne!(status, BacktraceStatus::Disabled);
                if status == BacktraceStatus::Captured {
                    assert!(error.trace().to_string().contains("explode"));
                }
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[test]
    fn panicking_callback_still_closes_array() {
        fn fail(_: &mut ResponseStream<'_>, _: &[Value]) -> ProcessingResult<()> {
            Err(ProcessingError::unauthorized("10"))
        }

        let config = ServerConfig::new("secret").with_on_error(|_| panic!("callback bug"));
        let handler = RequestHandler::new(&config, Arc::new(fail));
        let (_, response) = send(&handler, br#"{"version":4,"secret":"secret"}"#);

        assert_eq!(response.body_text(), r#"[["unauthorized","10"]]"#);
    }

    #[test]
    fn answers_keep_command_order() {
        fn answer_each(stream: &mut ResponseStream<'_>, commands: &[Value]) -> ProcessingResult<()> {
            for command in commands {
                let id = command.as_str().unwrap_or_default().to_string();
                stream.write_answer(&Answer::Processed { id })?;
            }
            Ok(())
        }

        let handler = create_handler(Arc::new(answer_each));
        let (outcome, response) = send(
            &handler,
            br#"{"version":4,"secret":"secret","commands":["a","b","c"]}"#,
        );

        assert!(matches!(outcome, Outcome::Completed { fragments: 3 }));
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            body,
            json!([["processed", "a"], ["processed", "b"], ["processed", "c"]])
        );
    }
}
