//! CLI command implementations.

pub mod check;
pub mod serve;

use logux_protocol::{ActionCommand, ProcessingResult};
use logux_server::{ActionHandler, ActionProcessor, Verdict};
use std::sync::Arc;
use tracing::info;

/// Approves every action and logs it.
struct LoggingHandler;

impl ActionHandler for LoggingHandler {
    fn authorize(&self, _action: &ActionCommand<'_>) -> ProcessingResult<Verdict> {
        Ok(Verdict::Approved)
    }

    fn process(&self, action: &ActionCommand<'_>) -> ProcessingResult<()> {
        info!(
            id = action.id(),
            action_type = action.action_type(),
            user_id = action.user_id().unwrap_or("-"),
            "action processed"
        );
        Ok(())
    }
}

/// Processor used by the CLI: every action type goes to [`LoggingHandler`].
pub fn default_processor() -> Arc<ActionProcessor> {
    let processor = ActionProcessor::new();
    processor.set_fallback(Arc::new(LoggingHandler));
    Arc::new(processor)
}
