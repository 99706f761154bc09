use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, extract::State, http::StatusCode, routing::post};
use httpmock::prelude::*;
use serde_json::{Value, json};
use tokio::time::sleep;

use logvine::batcher::BatcherConfig;
use logvine::callsite;
use logvine::exporter::{ExporterConfig, HttpExporter};
use logvine::logger::Logger;
use logvine::record::{Level, LogRecord, new_attr_map};
use logvine::sink::{MemorySink, Sink, SinkError};
use logvine::trace::{SequenceIdSource, TraceContext};

mod common;
use common::{spawn_server, wait_for};

/// Collector double that records every request with the status it
/// answered, switchable between accepting and rejecting.
#[derive(Clone)]
struct Collector {
    requests: Arc<Mutex<Vec<(u16, String)>>>,
    status: Arc<AtomicU16>,
}

impl Collector {
    fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            status: Arc::new(AtomicU16::new(200)),
        }
    }

    fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    fn requests(&self) -> Vec<(u16, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Bodies of the requests that were answered with 200.
    fn delivered(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|(status, _)| *status == 200)
            .map(|(_, body)| body)
            .collect()
    }

    fn app(&self) -> Router {
        Router::new()
            .route("/logs", post(collect))
            .with_state(self.clone())
    }
}

async fn collect(State(collector): State<Collector>, body: String) -> StatusCode {
    let status = collector.status.load(Ordering::SeqCst);
    collector.requests.lock().unwrap().push((status, body));
    StatusCode::from_u16(status).unwrap()
}

fn parse_lines(body: &str) -> Vec<Value> {
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn ids_of(body: &str) -> Vec<String> {
    parse_lines(body)
        .iter()
        .map(|line| line["id"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn delivers_enriched_ndjson_to_the_collector() {
    let collector = Collector::new();
    let (base, server) = spawn_server(collector.app()).await;

    let inner = MemorySink::new();
    let config = ExporterConfig::default().with_collector_addr(base).with_batch(
        BatcherConfig::default()
            .with_capacity(2)
            .with_flush_interval(Duration::from_secs(60)),
    );
    let exporter = Arc::new(HttpExporter::new(inner.clone(), config).unwrap());
    let logger = Logger::builder()
        .with_sink(Arc::clone(&exporter))
        .with_ids(SequenceIdSource::new("e"))
        .build();

    let ctx = TraceContext::new().with_correlation_id("agg-7");
    let ctx = logger.info(&ctx, callsite!("ship"), "first record");
    let mut attrs = new_attr_map();
    attrs.insert("attempt".to_owned(), json!(2));
    logger.warn_with(&ctx, callsite!("ship"), "second record", attrs);

    // the inner sink saw both records before anything went over the wire
    assert_eq!(inner.snapshot().len(), 2);

    wait_for("collector delivery", || !collector.delivered().is_empty()).await;
    let delivered = collector.delivered();
    assert_eq!(delivered.len(), 1);

    let lines = parse_lines(&delivered[0]);
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["id"], "e-1");
    assert_eq!(lines[0]["parent_id"], "");
    assert_eq!(lines[0]["level"], "INFO");
    assert_eq!(lines[0]["message"], "first record");
    assert_eq!(lines[0]["meta"]["aggregate_id"], "agg-7");
    assert_eq!(lines[0]["meta"]["fn"], "ship");
    assert!(lines[0]["meta"]["pkg"].as_str().unwrap().contains("exporter"));
    let timestamp = lines[0]["timestamp"].as_str().unwrap();
    assert!(
        timestamp
            .parse::<chrono::DateTime<chrono::FixedOffset>>()
            .is_ok()
    );

    assert_eq!(lines[1]["id"], "e-2");
    assert_eq!(lines[1]["parent_id"], "e-1");
    assert_eq!(lines[1]["level"], "WARN");
    assert_eq!(lines[1]["meta"]["attempt"], 2);
    assert_eq!(lines[1]["meta"]["aggregate_id"], "agg-7");

    exporter.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn failed_delivery_is_retried_on_the_next_tick() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/logs");
            then.status(500).body("collector is down");
        })
        .await;

    let config = ExporterConfig::default()
        .with_collector_addr(server.base_url())
        .with_batch(
            BatcherConfig::default()
                .with_capacity(2)
                .with_flush_interval(Duration::from_millis(100)),
        );
    let exporter = HttpExporter::new(MemorySink::new(), config).unwrap();

    let mut record = LogRecord::new(Level::Info, "undeliverable");
    record.id = "e-1".to_owned();
    exporter.handle(&record).unwrap();
    let mut record = LogRecord::new(Level::Info, "also undeliverable");
    record.id = "e-2".to_owned();
    exporter.handle(&record).unwrap();

    sleep(Duration::from_millis(500)).await;
    let attempts = mock.calls_async().await;
    assert!(
        attempts >= 2,
        "rejected batch should be retried, saw {attempts} attempts"
    );

    exporter.shutdown().await;
}

#[tokio::test]
async fn recovered_collector_receives_old_then_new_batches() {
    let collector = Collector::new();
    collector.set_status(500);
    let (base, server) = spawn_server(collector.app()).await;

    let config = ExporterConfig::default().with_collector_addr(base).with_batch(
        BatcherConfig::default()
            .with_capacity(2)
            .with_flush_interval(Duration::from_secs(60)),
    );
    let exporter = Arc::new(HttpExporter::new(MemorySink::new(), config).unwrap());
    let logger = Logger::builder()
        .with_sink(Arc::clone(&exporter))
        .with_ids(SequenceIdSource::new("e"))
        .build();

    let ctx = TraceContext::new();
    let ctx = logger.info(&ctx, callsite!("retry"), "one");
    let ctx = logger.info(&ctx, callsite!("retry"), "two");
    wait_for("first rejected attempt", || !collector.requests().is_empty()).await;
    assert!(collector.delivered().is_empty());

    collector.set_status(200);
    let ctx = logger.info(&ctx, callsite!("retry"), "three");
    logger.info(&ctx, callsite!("retry"), "four");

    wait_for("both batches delivered", || collector.delivered().len() == 2).await;
    let delivered = collector.delivered();
    // the retained batch went out first, then the new one, in order
    assert_eq!(ids_of(&delivered[0]), ["e-1", "e-2"]);
    assert_eq!(ids_of(&delivered[1]), ["e-3", "e-4"]);

    exporter.shutdown().await;
    server.abort();
}

#[tokio::test]
async fn closed_exporter_rejects_new_records_but_inner_still_sees_them() {
    let inner = MemorySink::new();
    let exporter = HttpExporter::new(inner.clone(), ExporterConfig::default()).unwrap();
    exporter.shutdown().await;

    let mut record = LogRecord::new(Level::Info, "late arrival");
    record.id = "e-1".to_owned();
    let result = exporter.handle(&record);

    assert!(matches!(result, Err(SinkError::Closed)));
    assert_eq!(inner.snapshot().len(), 1);
}
