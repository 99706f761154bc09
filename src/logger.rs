//! The emission facade tying identity, filters, and sinks together.
//!
//! A [`Logger`] is an explicit value: construct one with the builder and
//! pass it (usually as an `Arc`) to whatever needs to emit. There is no
//! global logger to install or discover.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::filter::Filter;
use crate::record::{AttrMap, Callsite, Level, LogRecord};
use crate::sink::{Sink, TextSink};
use crate::trace::{IdSource, TraceContext, UuidSource};

/// Emits causally-chained [`LogRecord`]s to a [`Sink`].
///
/// Every emission derives a new [`TraceContext`]: the returned context's
/// lineage id is the id of the record just emitted, so threading the
/// result through successive calls produces a parent chain.
///
/// ```
/// use logvine::callsite;
/// use logvine::logger::Logger;
/// use logvine::sink::MemorySink;
/// use logvine::trace::{SequenceIdSource, TraceContext};
///
/// let sink = MemorySink::new();
/// let logger = Logger::builder()
///     .with_sink(sink.clone())
///     .with_ids(SequenceIdSource::new("e"))
///     .build();
///
/// let ctx = TraceContext::new();
/// let ctx = logger.info(&ctx, callsite!("startup"), "first");
/// let ctx = logger.info(&ctx, callsite!("startup"), "second");
/// logger.info(&ctx, callsite!("startup"), "third");
///
/// let records = sink.snapshot();
/// assert_eq!(records[0].parent_id, None);
/// assert_eq!(records[1].parent_id.as_deref(), Some("e-1"));
/// assert_eq!(records[2].parent_id.as_deref(), Some("e-2"));
/// ```
pub struct Logger {
    sink: Box<dyn Sink>,
    filters: Vec<Filter>,
    ids: Arc<dyn IdSource>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// The id source used for record ids, shared with anything else that
    /// needs to mint compatible ids (e.g. correlation ids at the HTTP
    /// boundary).
    pub fn ids(&self) -> &Arc<dyn IdSource> {
        &self.ids
    }

    /// Emit a record and derive the follow-up context.
    ///
    /// A record suppressed by the sink's level or by a filter is not
    /// assigned an id and the context comes back unchanged, so the
    /// visible chain stays gap-free. Sink failures are reported through
    /// the diagnostics channel and do not affect the returned context.
    pub fn log(
        &self,
        ctx: &TraceContext,
        level: Level,
        callsite: Callsite,
        message: impl Into<String>,
        attrs: AttrMap,
    ) -> TraceContext {
        if !self.sink.enabled(level) {
            return ctx.clone();
        }

        let mut record = LogRecord {
            id: String::new(),
            parent_id: ctx.parent_id().map(str::to_owned),
            correlation_id: ctx.correlation_id().map(str::to_owned),
            level,
            message: message.into(),
            timestamp: Utc::now(),
            attrs,
            callsite,
        };

        if !self.filters.iter().all(|filter| filter(&record)) {
            return ctx.clone();
        }

        // Identity is assigned only after the filters pass, so suppressed
        // records leave no gap in the chain.
        let id = self.ids.next_id();
        record.id = id.clone();

        if let Err(err) = self.sink.handle(&record) {
            warn!(error = %err, record_id = %id, "sink failed to handle record");
        }

        ctx.child(id)
    }

    pub fn debug(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
    ) -> TraceContext {
        self.log(ctx, Level::Debug, callsite, message, AttrMap::default())
    }

    pub fn info(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
    ) -> TraceContext {
        self.log(ctx, Level::Info, callsite, message, AttrMap::default())
    }

    pub fn warn(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
    ) -> TraceContext {
        self.log(ctx, Level::Warn, callsite, message, AttrMap::default())
    }

    pub fn error(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
    ) -> TraceContext {
        self.log(ctx, Level::Error, callsite, message, AttrMap::default())
    }

    pub fn debug_with(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
        attrs: AttrMap,
    ) -> TraceContext {
        self.log(ctx, Level::Debug, callsite, message, attrs)
    }

    pub fn info_with(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
        attrs: AttrMap,
    ) -> TraceContext {
        self.log(ctx, Level::Info, callsite, message, attrs)
    }

    pub fn warn_with(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
        attrs: AttrMap,
    ) -> TraceContext {
        self.log(ctx, Level::Warn, callsite, message, attrs)
    }

    pub fn error_with(
        &self,
        ctx: &TraceContext,
        callsite: Callsite,
        message: impl Into<String>,
        attrs: AttrMap,
    ) -> TraceContext {
        self.log(ctx, Level::Error, callsite, message, attrs)
    }
}

/// Builder for [`Logger`].
///
/// Defaults: a [`TextSink`] over stdout at [`Level::Info`], no filters,
/// and random UUID ids.
#[derive(Default)]
pub struct LoggerBuilder {
    sink: Option<Box<dyn Sink>>,
    filters: Vec<Filter>,
    ids: Option<Arc<dyn IdSource>>,
}

impl LoggerBuilder {
    /// Set the sink records are handed to. Replaces any previous sink.
    #[must_use]
    pub fn with_sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Append a filter. A record is emitted only when every filter
    /// passes.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Set the id source for record ids.
    #[must_use]
    pub fn with_ids<I: IdSource + 'static>(mut self, ids: I) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    pub fn build(self) -> Logger {
        Logger {
            sink: self
                .sink
                .unwrap_or_else(|| Box::new(TextSink::stdout(Level::Info))),
            filters: self.filters,
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidSource)),
        }
    }
}
