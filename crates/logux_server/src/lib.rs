//! # Logux Server
//!
//! Streaming HTTP back-end endpoint for the Logux sync protocol.
//!
//! This crate provides:
//! - Ordered request validation (body, secret, protocol version)
//! - A streaming response writer that always produces a closed JSON array
//! - The `BatchProcessor` seam and a default `ActionProcessor`
//! - An HTTP listener built on axum
//!
//! # Protocol
//!
//! A client posts `{"version", "secret", "commands"}` to the root path.
//! Rejected requests get a plain-text message with status 400 or 403 and no
//! array. Accepted requests get status 200 and a JSON array that is opened
//! immediately and filled one fragment at a time:
//!
//! ```text
//! [["approved","1 10:uuid 0"],["processed","1 10:uuid 0"]]
//! ```
//!
//! If processing fails midway the status cannot change anymore, so the
//! failure is rendered as one more fragment before the array is closed.
//!
//! ```rust,ignore
//! use logux_server::{ActionProcessor, BackendServer, ServerConfig};
//!
//! let processor = Arc::new(ActionProcessor::new());
//! processor.register("user/rename", Arc::new(RenameHandler::new(db)));
//!
//! let config = ServerConfig::new(secret).with_on_error(|err| metrics.record(err));
//! BackendServer::new(config, processor)?.run().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod body;
mod config;
mod error;
mod handler;
mod processor;
mod request;
mod server;
mod stream;

pub use config::{ErrorCallback, ServerConfig, DEFAULT_MAX_BODY_SIZE, DEFAULT_ROOT_PATH};
pub use error::{ServerError, ServerResult};
pub use handler::{Outcome, RequestHandler};
pub use processor::{ActionHandler, ActionProcessor, BatchProcessor, Verdict};
pub use request::{BodyError, InboundRequest};
pub use server::BackendServer;
pub use stream::{BufferedResponse, ResponseHead, ResponseSink, ResponseStream, JSON_CONTENT_TYPE};
