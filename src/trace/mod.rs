//! Causal identity tracking: who caused which log record.
//!
//! The module is organised around an immutable [`TraceContext`] value that
//! carries the current lineage id and the correlation ("aggregate") id,
//! [`IdSource`] implementations that mint ids, and HTTP helpers that move
//! both across service boundaries via the `x-logger-aggregate-id` and
//! `x-log-parent-id` headers.

pub mod context;
pub mod http;
pub mod id;

pub use context::{TraceContext, resolve_correlation_id};
pub use http::{
    AGGREGATE_ID_HEADER, PARENT_ID_HEADER, TraceMiddleware, extract_context, inject, propagate,
};
pub use id::{IdSource, SequenceIdSource, UuidSource};
