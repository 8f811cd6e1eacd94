//! # Logux Protocol
//!
//! Back-end protocol types for the Logux sync endpoint.
//!
//! This crate provides:
//! - `ProtocolPolicy` for ordered request validation (body, secret, version)
//! - `Command` parsing for batch entries
//! - `Answer` fragments written into the response array
//! - `ProcessingError` and the `ErrorRenderer` that turns it into a fragment
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod answer;
mod command;
mod error;
mod policy;
mod render;

pub use answer::Answer;
pub use command::{ActionCommand, Command};
pub use error::{ProcessingError, ProcessingResult, Trace};
pub use policy::{
    MetaParams, ProtocolPolicy, Rejection, ValidBody, DEFAULT_PROTOCOL_VERSION,
};
pub use render::ErrorRenderer;
