//! Main back-end server.

use crate::body::ChannelSink;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{Outcome, RequestHandler};
use crate::processor::BatchProcessor;
use crate::request::InboundRequest;
use crate::stream::{BufferedResponse, ResponseHead, ResponseSink};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Body chunks buffered between the handler and a slow client.
const FRAME_BUFFER: usize = 32;

/// The back-end server.
///
/// Serves the Logux back-end endpoint over HTTP and can also be driven
/// in-process through [`BackendServer::handle_post`].
///
/// # Example
///
/// ```
/// use logux_server::{ActionProcessor, BackendServer, ServerConfig};
/// use std::sync::Arc;
///
/// let config = ServerConfig::new("secret");
/// let server = BackendServer::new(config, Arc::new(ActionProcessor::new())).unwrap();
///
/// let response = server
///     .handle_post("/logux", br#"{"version":4,"secret":"secret","commands":[]}"#)
///     .unwrap();
/// assert_eq!(response.body, b"[]");
/// ```
pub struct BackendServer {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
}

impl BackendServer {
    /// Creates a new server.
    ///
    /// Fails with [`ServerError::Config`] when the configuration cannot
    /// serve requests.
    pub fn new(config: ServerConfig, processor: Arc<dyn BatchProcessor>) -> ServerResult<Self> {
        config.validate()?;
        let handler = Arc::new(RequestHandler::new(&config, processor));
        Ok(Self { config, handler })
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Handles a POST request in-process and returns the buffered response.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> ServerResult<BufferedResponse> {
        let mut response = BufferedResponse::new();
        if path != self.config.root_path {
            response.start(&ResponseHead::new(404))?;
            response.write_all(b"Not found")?;
            return Ok(response);
        }
        if body.len() > self.config.max_body_size {
            response.start(&ResponseHead::new(413))?;
            response.write_all(b"Request body too large")?;
            return Ok(response);
        }

        let mut request = InboundRequest::with_limit(body, self.config.max_body_size);
        self.handler.handle(&mut request, &mut response)?;
        Ok(response)
    }

    /// Builds the HTTP router: `POST` on the root path, body limited to
    /// the configured size.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.root_path, post(backend))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(Arc::clone(&self.handler))
    }

    /// Binds a listener to the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(
            addr = %listener.local_addr()?,
            path = %self.config.root_path,
            "logux back-end listening"
        );
        Ok(listener)
    }

    /// Binds to the configured address and serves until the listener fails.
    pub async fn run(self) -> ServerResult<()> {
        let listener = self.bind().await?;
        Arc::new(self).serve(listener).await
    }

    /// Serves HTTP connections accepted from `listener`.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> ServerResult<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Runs the blocking handler and streams whatever it writes.
///
/// The response is built once the handler commits its head; the body then
/// follows chunk by chunk until the handler drops its sink.
async fn backend(State(handler): State<Arc<RequestHandler>>, body: Bytes) -> Response {
    let (head_tx, head_rx) = oneshot::channel();
    let (chunks, receiver) = mpsc::channel(FRAME_BUFFER);

    tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(head_tx, chunks);
        let mut request = InboundRequest::new(&body[..]);
        match handler.handle(&mut request, &mut sink) {
            Ok(Outcome::Interrupted { fragments, .. }) => debug!(fragments, "batch interrupted"),
            Ok(_) => {}
            Err(err) if err.is_disconnect() => debug!("client disconnected: {err}"),
            Err(err) => warn!("failed to write response: {err}"),
        }
    });

    let Ok(head) = head_rx.await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let status = StatusCode::from_u16(head.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Body::from_stream(ReceiverStream::new(receiver).map(Ok::<_, Infallible>));
    (status, [(header::CONTENT_TYPE, head.content_type)], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ActionProcessor;

    fn create_server() -> BackendServer {
        BackendServer::new(
            ServerConfig::new("secret").with_max_body_size(64),
            Arc::new(ActionProcessor::new()),
        )
        .unwrap()
    }

    #[test]
    fn empty_secret_is_refused() {
        let result = BackendServer::new(ServerConfig::new(""), Arc::new(ActionProcessor::new()));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn unknown_path() {
        let response = create_server().handle_post("/other", b"{}").unwrap();
        assert_eq!(response.status(), Some(404));
    }

    #[test]
    fn oversized_body() {
        let body = vec![b' '; 65];
        let response = create_server().handle_post("/logux", &body).unwrap();
        assert_eq!(response.status(), Some(413));
    }

    #[test]
    fn loopback_request() {
        let response = create_server()
            .handle_post("/logux", br#"{"version":4,"secret":"secret"}"#)
            .unwrap();
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body, b"[]");
    }
}
