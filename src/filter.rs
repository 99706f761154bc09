//! Record predicates for selective emission.
//!
//! Filters are attached to a [`Logger`](crate::logger::Logger); a record
//! is emitted only when every filter passes. Rejected records consume no
//! id and reach no sink.

use miette::Diagnostic;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::record::LogRecord;

/// A predicate over candidate records.
pub type Filter = Box<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// A filter could not be constructed.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid filter pattern: {0}")]
#[diagnostic(
    code(logvine::filter::pattern),
    help("filter patterns must be valid regular expressions")
)]
pub struct FilterError(#[from] regex::Error);

/// Filter on the callsite's module path.
///
/// The pattern is compiled once, here; an empty pattern always passes.
///
/// ```
/// use logvine::filter::match_pkg;
/// use logvine::record::{Level, LogRecord};
/// use logvine::callsite;
///
/// let billing_only = match_pkg("billing").unwrap();
/// let record = LogRecord::new(Level::Info, "charge").with_callsite(callsite!());
/// // this test module's path does not mention billing
/// assert!(!billing_only(&record));
/// ```
pub fn match_pkg(pattern: &str) -> Result<Filter, FilterError> {
    if pattern.is_empty() {
        return Ok(Box::new(|_| true));
    }
    let re = Regex::new(pattern)?;
    Ok(Box::new(move |record: &LogRecord| {
        re.is_match(record.callsite.pkg)
    }))
}

/// Filter on the callsite's function tag. Empty pattern always passes.
pub fn match_func(pattern: &str) -> Result<Filter, FilterError> {
    if pattern.is_empty() {
        return Ok(Box::new(|_| true));
    }
    let re = Regex::new(pattern)?;
    Ok(Box::new(move |record: &LogRecord| {
        re.is_match(record.callsite.func)
    }))
}

/// Filter passing records whose attribute `key` equals any of `values`.
///
/// Records without the attribute are rejected.
pub fn attr_has_any(key: impl Into<String>, values: Vec<Value>) -> Filter {
    let key = key.into();
    Box::new(move |record: &LogRecord| {
        record
            .attrs
            .get(&key)
            .map(|value| values.contains(value))
            .unwrap_or(false)
    })
}
