//! # Logvine: Causal Structured Logging Pipeline
//!
//! Logvine is a structured-logging pipeline that threads a causal identity
//! through every record: each record gets its own id, points at the record
//! that caused it, and carries a correlation id shared by all the work done
//! on behalf of one request. Records can stay local (text or JSON on a
//! writer) or be batched and shipped over HTTP to a hub that rebroadcasts
//! them to live SSE subscribers.
//!
//! ## Core Concepts
//!
//! - **Records**: Structured log records with level, message, attributes,
//!   callsite, and causal ids
//! - **Trace contexts**: The parent/correlation state a record is emitted
//!   under; each emission derives the context for the next one
//! - **Sinks**: Synchronous record consumers (text, JSON, memory, HTTP)
//! - **Batcher**: Bounded async batching with threshold and interval flushes
//! - **Hub**: HTTP ingestion endpoint that fans lines out to SSE subscribers
//!
//! ## Quick Start
//!
//! ### Emitting a Causal Chain
//!
//! Every emission returns the context the next emission should use. Feeding
//! the returned context forward parents each record on the previous one:
//!
//! ```
//! use logvine::callsite;
//! use logvine::logger::Logger;
//! use logvine::sink::MemorySink;
//! use logvine::trace::{SequenceIdSource, TraceContext};
//!
//! let sink = MemorySink::new();
//! let logger = Logger::builder()
//!     .with_sink(sink.clone())
//!     .with_ids(SequenceIdSource::new("req"))
//!     .build();
//!
//! let ctx = TraceContext::new().with_correlation_id("checkout-41");
//! let ctx = logger.info(&ctx, callsite!(), "accepted order");
//! let ctx = logger.info(&ctx, callsite!(), "charged card");
//! logger.warn(&ctx, callsite!(), "confirmation email deferred");
//!
//! let records = sink.snapshot();
//! assert_eq!(records[0].id, "req-1");
//! assert_eq!(records[1].parent_id.as_deref(), Some("req-1"));
//! assert_eq!(records[2].parent_id.as_deref(), Some("req-2"));
//! assert!(
//!     records
//!         .iter()
//!         .all(|r| r.correlation_id.as_deref() == Some("checkout-41"))
//! );
//! ```
//!
//! ### Filtering by Callsite
//!
//! Filters run before a record is assigned an id, so suppressed emissions
//! leave no gaps in the visible chain:
//!
//! ```
//! use logvine::callsite;
//! use logvine::filter::match_func;
//! use logvine::logger::Logger;
//! use logvine::sink::MemorySink;
//! use logvine::trace::TraceContext;
//!
//! let sink = MemorySink::new();
//! let logger = Logger::builder()
//!     .with_sink(sink.clone())
//!     .with_filter(match_func("^handle_").expect("valid pattern"))
//!     .build();
//!
//! let ctx = TraceContext::new();
//! logger.info(&ctx, callsite!("handle_order"), "kept");
//! logger.info(&ctx, callsite!("internal_helper"), "suppressed");
//!
//! assert_eq!(sink.snapshot().len(), 1);
//! ```
//!
//! ### Shipping Records to a Collector
//!
//! The HTTP exporter wraps any sink: records hit the inner sink right away
//! and are batched in the background for delivery to the collector:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logvine::callsite;
//! use logvine::exporter::{ExporterConfig, HttpExporter};
//! use logvine::logger::Logger;
//! use logvine::record::Level;
//! use logvine::sink::TextSink;
//! use logvine::trace::TraceContext;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExporterConfig::default().with_collector_addr("http://127.0.0.1:2022");
//! let exporter = Arc::new(HttpExporter::new(TextSink::stdout(Level::Info), config)?);
//!
//! let logger = Logger::builder().with_sink(Arc::clone(&exporter)).build();
//! let ctx = logger.info(&TraceContext::new(), callsite!(), "pipeline up");
//! logger.info(&ctx, callsite!(), "first real work");
//!
//! exporter.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ### Running a Hub
//!
//! ```no_run
//! use logvine::hub::Hub;
//! use tokio::net::TcpListener;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Hub::new();
//! let listener = TcpListener::bind("127.0.0.1:2022").await?;
//! hub.serve(listener, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`record`] - Log records, levels, callsites, and the wire form
//! - [`trace`] - Causal identity: contexts, id sources, header propagation
//! - [`logger`] - Emission front-end that derives follow-up contexts
//! - [`filter`] - Record predicates applied before ids are assigned
//! - [`sink`] - Synchronous record consumers (text, JSON, in-memory)
//! - [`batcher`] - Bounded async batching with threshold and interval flushes
//! - [`exporter`] - Batched HTTP export to a collector
//! - [`hub`] - Line ingestion with SSE fan-out to live subscribers

pub mod batcher;
pub mod exporter;
pub mod filter;
pub mod hub;
pub mod logger;
pub mod record;
pub mod sink;
pub mod trace;
