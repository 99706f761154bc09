//! HTTP surface of the hub: line ingestion in, SSE fan-out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures_util::{Stream, StreamExt, stream};
use miette::Diagnostic;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument};

use super::registry::SubscriberRegistry;

/// How often an idle SSE connection receives a comment frame.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Error, Diagnostic)]
pub enum HubError {
    #[error("hub server error")]
    #[diagnostic(code(logvine::hub::serve))]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub keep_alive: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

/// Log line hub: accepts newline-delimited lines on `POST /logs` and
/// rebroadcasts each one to every `GET /logs` SSE subscriber.
///
/// Cloning is cheap; clones share the subscriber registry.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<SubscriberRegistry>,
    config: HubConfig,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        Self {
            registry: Arc::new(SubscriberRegistry::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Router exposing `POST /logs` (ingest) and `GET /logs` (subscribe).
    pub fn router(&self) -> Router {
        Router::new()
            .route("/logs", post(ingest).get(subscribe))
            .with_state(self.clone())
    }

    /// Serve the hub on `listener` until the `shutdown` future resolves.
    #[instrument(skip(self, listener, shutdown), err)]
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), HubError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "hub listening");
        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// `POST /logs`: split the body into lines as chunks arrive and broadcast
/// each completed line before reading further.
///
/// A trailing unterminated line still counts as a line. Any broadcast
/// failure aborts the request with a 500 even though earlier lines may
/// already have gone out.
async fn ingest(State(hub): State<Hub>, body: Body) -> Response {
    let mut body = body.into_data_stream();
    let mut splitter = LineSplitter::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                error!(error = %err, "failed to read request body");
                return failure("failed to read request body");
            }
        };
        for line in splitter.push(&chunk) {
            if let Err(err) = hub.registry.broadcast(&line) {
                error!(error = %err, "failed to broadcast message");
                return failure("failed to broadcast message");
            }
        }
    }

    if let Some(line) = splitter.finish() {
        if let Err(err) = hub.registry.broadcast(&line) {
            error!(error = %err, "failed to broadcast message");
            return failure("failed to broadcast message");
        }
    }

    StatusCode::OK.into_response()
}

fn failure(body: &'static str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

/// `GET /logs`: register a subscriber and stream every broadcast line to
/// it as an SSE `message` event. The subscriber is deregistered when the
/// client goes away and the stream is dropped.
async fn subscribe(State(hub): State<Hub>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = hub.registry().subscribe();
    info!(subscriber = id, "client subscribed");
    let guard = SubscriberGuard {
        registry: Arc::clone(hub.registry()),
        id,
    };

    let stream = stream::unfold((rx, guard, 0u64), |(rx, guard, seq)| async move {
        match rx.recv_async().await {
            Ok(line) => {
                // SSE data fields cannot carry carriage returns.
                let event = Event::default()
                    .id(seq.to_string())
                    .event("message")
                    .data(line.replace('\r', ""));
                Some((Ok(event), (rx, guard, seq + 1)))
            }
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(hub.config.keep_alive)
            .text("keep-alive"),
    )
}

/// Deregisters a subscriber when its SSE stream is dropped.
struct SubscriberGuard {
    registry: Arc<SubscriberRegistry>,
    id: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
        debug!(subscriber = self.id, "client disconnected");
    }
}

/// Incremental newline splitter over arbitrary chunk boundaries.
///
/// `\n` terminates a line and a terminating `\r\n` is treated the same;
/// the separators are not part of the line. Empty lines are real lines.
#[derive(Default)]
struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    /// Absorb one chunk and return every line it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// The unterminated remainder, if any.
    fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let mut line = self.buf;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}
