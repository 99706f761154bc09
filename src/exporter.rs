//! Batched HTTP export of log records.
//!
//! [`HttpExporter`] is a [`Sink`] decorator: records go to the wrapped
//! inner sink first (local emission is never gated on the collector),
//! then into a [`Batcher`] whose flush posts the batch to the collector's
//! `/logs` endpoint as newline-delimited JSON.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use miette::Diagnostic;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::batcher::{BatchFlush, Batcher, BatcherConfig, BatcherError, FlushError};
use crate::record::{Level, LogRecord};
use crate::sink::{Sink, SinkError};

/// Default per-request timeout for collector POSTs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Exporter tuning knobs.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Base address of the collector, e.g. `http://127.0.0.1:2022`.
    pub collector_addr: String,
    /// Hard deadline for one batch POST.
    pub request_timeout: Duration,
    /// Batching behavior; capacity and flush interval pass through to the
    /// underlying [`Batcher`].
    pub batch: BatcherConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            collector_addr: "http://127.0.0.1:2022".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            batch: BatcherConfig::default(),
        }
    }
}

impl ExporterConfig {
    #[must_use]
    pub fn with_collector_addr(mut self, addr: impl Into<String>) -> Self {
        self.collector_addr = addr.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: BatcherConfig) -> Self {
        self.batch = batch;
        self
    }
}

/// The exporter could not be constructed.
#[derive(Debug, Error, Diagnostic)]
pub enum ExporterError {
    #[error("failed to build collector http client: {0}")]
    #[diagnostic(
        code(logvine::exporter::client),
        help("check the request timeout and TLS configuration")
    )]
    Client(#[from] reqwest::Error),
}

/// Sink decorator that exports every handled record to a collector.
///
/// `enabled` delegates to the inner sink, so the export path sees exactly
/// the records local output sees. A full export queue blocks `handle`
/// until the drain task catches up; collector failures never do, they
/// only delay batches.
///
/// Wrap the exporter in an [`Arc`](std::sync::Arc) when you need to keep
/// a handle for [`HttpExporter::shutdown`] after moving it into a logger:
///
/// ```no_run
/// use std::sync::Arc;
/// use logvine::exporter::{ExporterConfig, HttpExporter};
/// use logvine::logger::Logger;
/// use logvine::record::Level;
/// use logvine::sink::TextSink;
///
/// # async fn demo() -> Result<(), logvine::exporter::ExporterError> {
/// let exporter = Arc::new(HttpExporter::new(
///     TextSink::stdout(Level::Debug),
///     ExporterConfig::default().with_collector_addr("http://127.0.0.1:2022"),
/// )?);
/// let logger = Logger::builder().with_sink(Arc::clone(&exporter)).build();
///
/// // ... emit through `logger` ...
///
/// exporter.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct HttpExporter<S> {
    inner: S,
    batcher: Batcher<LogRecord>,
}

impl<S: Sink> HttpExporter<S> {
    /// Build the exporter and start its drain task.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(inner: S, config: ExporterConfig) -> Result<Self, ExporterError> {
        let flush = HttpFlush::new(&config)?;
        Ok(Self {
            inner,
            batcher: Batcher::spawn(config.batch, flush),
        })
    }

    /// Stop the export drain task.
    ///
    /// Records still queued or retained are dropped, matching the
    /// batcher's close contract. Local emission through the inner sink
    /// keeps working; only the export path closes.
    pub async fn shutdown(&self) {
        self.batcher.close().await;
    }

    /// Number of records discarded by the batcher's overflow policy.
    pub fn dropped(&self) -> u64 {
        self.batcher.dropped()
    }
}

impl<S: Sink> Sink for HttpExporter<S> {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.inner.handle(record)?;
        self.batcher
            .add(record.clone())
            .map_err(|BatcherError::Closed| SinkError::Closed)
    }
}

struct HttpFlush {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFlush {
    fn new(config: &ExporterConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: collector_endpoint(&config.collector_addr),
        })
    }
}

fn collector_endpoint(addr: &str) -> String {
    format!("{}/logs", addr.trim_end_matches('/'))
}

#[async_trait]
impl BatchFlush<LogRecord> for HttpFlush {
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    async fn flush(&self, batch: &[LogRecord]) -> Result<(), FlushError> {
        let mut lines: Vec<Result<Bytes, Infallible>> = Vec::with_capacity(batch.len());
        for record in batch {
            let mut line = serde_json::to_vec(&record.to_wire())
                .map_err(|err| FlushError::with_source("serialize record", err))?;
            line.push(b'\n');
            lines.push(Ok(Bytes::from(line)));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .body(reqwest::Body::wrap_stream(stream::iter(lines)))
            .send()
            .await
            .map_err(|err| FlushError::with_source("post batch to collector", err))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FlushError::new(format!(
                "unexpected status code: {}, body: {body}",
                status.as_u16()
            )));
        }

        debug!(records = batch.len(), "flushed batch to collector");
        Ok(())
    }
}
