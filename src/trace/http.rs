//! HTTP propagation of causal identity.
//!
//! Inbound requests seed a [`TraceContext`] from two headers; outbound
//! requests carry the same pair so the chain survives service hops. The
//! [`propagate`] middleware wires this into an axum service and logs the
//! request envelope through an attached [`Logger`].

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use tracing::warn;

use crate::callsite;
use crate::logger::Logger;
use crate::record::new_attr_map;

use super::context::{TraceContext, resolve_correlation_id};

/// Header carrying the correlation ("aggregate") id across services.
pub const AGGREGATE_ID_HEADER: &str = "x-logger-aggregate-id";

/// Header seeding the causal parent for the receiving side's first record.
pub const PARENT_ID_HEADER: &str = "x-log-parent-id";

/// Build the inbound [`TraceContext`] from request headers.
///
/// Missing or empty headers yield `None` fields; a request without a
/// parent header starts a fresh chain root on the receiving side.
pub fn extract_context(headers: &HeaderMap) -> TraceContext {
    TraceContext::from_parts(
        header_value(headers, PARENT_ID_HEADER),
        header_value(headers, AGGREGATE_ID_HEADER),
    )
}

/// Stamp the context's lineage and correlation ids onto an outbound request.
///
/// The receiving service's first record will parent onto this context's
/// lineage id and join the same correlation group.
///
/// ```no_run
/// use logvine::trace::{TraceContext, inject};
///
/// let ctx = TraceContext::new().with_correlation_id("agg-1").child("e4");
/// let client = reqwest::Client::new();
/// let request = inject(&ctx, client.get("http://billing.internal/invoices"));
/// ```
pub fn inject(ctx: &TraceContext, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    if let Some(parent_id) = ctx.parent_id() {
        request = request.header(PARENT_ID_HEADER, parent_id);
    }
    if let Some(correlation_id) = ctx.correlation_id() {
        request = request.header(AGGREGATE_ID_HEADER, correlation_id);
    }
    request
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// State for the [`propagate`] middleware.
///
/// Holds the [`Logger`] used for the request envelope records; its id
/// source also mints correlation ids for requests that arrive without one.
#[derive(Clone)]
pub struct TraceMiddleware {
    logger: Arc<Logger>,
}

impl TraceMiddleware {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

/// Axum middleware that resolves causal identity for a request.
///
/// For every request this:
///
/// 1. resolves the correlation id (an already-inserted [`TraceContext`]
///    extension wins, then the `x-logger-aggregate-id` header, then a
///    freshly generated id),
/// 2. seeds the chain from the `x-log-parent-id` header,
/// 3. emits a `received http request` record and stores the derived
///    context in the request extensions so handlers chain onto it,
/// 4. emits a `finished http request` record with status and duration,
/// 5. always writes the resolved correlation id to the
///    `x-logger-aggregate-id` response header.
///
/// Install with [`axum::middleware::from_fn_with_state`]:
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{Router, middleware, routing::get};
/// use logvine::logger::Logger;
/// use logvine::record::Level;
/// use logvine::sink::TextSink;
/// use logvine::trace::{TraceMiddleware, propagate};
///
/// let logger = Arc::new(
///     Logger::builder()
///         .with_sink(TextSink::stdout(Level::Debug))
///         .build(),
/// );
/// let router: Router = Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(middleware::from_fn_with_state(
///         TraceMiddleware::new(logger),
///         propagate,
///     ));
/// ```
pub async fn propagate(
    State(mw): State<TraceMiddleware>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let extension_ctx = request.extensions().get::<TraceContext>().cloned();
    let header_ctx = extract_context(request.headers());

    let empty = TraceContext::new();
    let correlation_id = resolve_correlation_id(
        extension_ctx.as_ref().unwrap_or(&empty),
        header_ctx.correlation_id(),
        mw.logger.ids().as_ref(),
    );
    let parent_seed = extension_ctx
        .as_ref()
        .and_then(|ctx| ctx.parent_id())
        .or_else(|| header_ctx.parent_id())
        .map(str::to_owned);

    let ctx = TraceContext::from_parts(parent_seed, Some(correlation_id.clone()));

    let mut attrs = new_attr_map();
    attrs.insert("method".to_string(), json!(method));
    attrs.insert("path".to_string(), json!(path));
    let ctx = mw.logger.info_with(
        &ctx,
        callsite!("propagate"),
        "received http request",
        attrs,
    );

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;

    let mut attrs = new_attr_map();
    attrs.insert("method".to_string(), json!(method));
    attrs.insert("path".to_string(), json!(path));
    attrs.insert("status".to_string(), json!(response.status().as_u16()));
    attrs.insert(
        "duration_ms".to_string(),
        json!(started.elapsed().as_millis() as u64),
    );
    mw.logger.info_with(
        &ctx,
        callsite!("propagate"),
        "finished http request",
        attrs,
    );

    match HeaderValue::from_str(&correlation_id) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(HeaderName::from_static(AGGREGATE_ID_HEADER), value);
        }
        Err(_) => warn!(
            correlation_id,
            "correlation id is not a valid header value; response header not set"
        ),
    }

    response
}
