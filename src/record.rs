//! Core log record types shared by every stage of the pipeline.
//!
//! A [`LogRecord`] is created once at emission time and never mutated
//! afterwards: sinks, the batcher, and the exporter all observe the same
//! immutable value. Causal identity (`id`, `parent_id`, `correlation_id`)
//! is assigned by the [`Logger`](crate::logger::Logger) from the
//! [`TraceContext`](crate::trace::TraceContext) it was handed.

use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute map attached to a record.
///
/// Keys are caller-chosen; values are arbitrary JSON.
pub type AttrMap = FxHashMap<String, Value>;

/// Convenience constructor for an empty [`AttrMap`].
pub fn new_attr_map() -> AttrMap {
    AttrMap::default()
}

/// Severity of a log record, ordered from least to most severe.
///
/// The ordering makes level thresholds a plain comparison:
///
/// ```
/// use logvine::record::Level;
///
/// assert!(Level::Debug < Level::Info);
/// assert!(Level::Error >= Level::Warn);
/// assert_eq!(Level::Warn.as_str(), "WARN");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Wire representation of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static origin of an emission: the module path and function name of the
/// code that produced the record.
///
/// Captured at compile time via the [`callsite!`](crate::callsite) macro
/// rather than by walking the call stack at runtime. `pkg` is therefore a
/// Rust module path (`my_app::billing`), and `func` is whatever tag the
/// caller chose for the enclosing function.
///
/// ```
/// let here = logvine::callsite!("handle_payment");
/// assert!(!here.pkg.is_empty());
/// assert_eq!(here.func, "handle_payment");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Callsite {
    pub pkg: &'static str,
    pub func: &'static str,
}

impl Callsite {
    /// A callsite with no origin information. Filters that match on
    /// package or function treat the empty strings as "unknown".
    pub const UNKNOWN: Callsite = Callsite { pkg: "", func: "" };
}

/// Capture the current module path as a [`Callsite`](crate::record::Callsite).
///
/// With no argument only the module path is recorded; pass a function tag
/// to make the record filterable by function as well.
///
/// ```
/// use logvine::callsite;
///
/// let anonymous = callsite!();
/// assert_eq!(anonymous.func, "");
///
/// let tagged = callsite!("refresh_cache");
/// assert_eq!(tagged.func, "refresh_cache");
/// assert_eq!(tagged.pkg, anonymous.pkg);
/// ```
#[macro_export]
macro_rules! callsite {
    () => {
        $crate::record::Callsite {
            pkg: ::core::module_path!(),
            func: "",
        }
    };
    ($func:expr) => {
        $crate::record::Callsite {
            pkg: ::core::module_path!(),
            func: $func,
        }
    };
}

/// One emitted log occurrence.
///
/// `id` is globally unique. `parent_id` is the id of the causally
/// preceding record on the same lineage (`None` for a chain root), and
/// `correlation_id` groups every record belonging to one logical
/// request or session. Records are immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub correlation_id: Option<String>,
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub attrs: AttrMap,
    pub callsite: Callsite,
}

impl LogRecord {
    /// Build a bare record with no causal identity attached.
    ///
    /// Intended for tests and sinks that want a record outside the
    /// [`Logger`](crate::logger::Logger) emission path; normal code
    /// receives fully-populated records from the logger.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            parent_id: None,
            correlation_id: None,
            level,
            message: message.into(),
            timestamp: Utc::now(),
            attrs: AttrMap::default(),
            callsite: Callsite::UNKNOWN,
        }
    }

    /// Attach attributes to the record.
    #[must_use]
    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attrs = attrs;
        self
    }

    /// Attach a callsite to the record.
    #[must_use]
    pub fn with_callsite(mut self, callsite: Callsite) -> Self {
        self.callsite = callsite;
        self
    }

    /// Convert the record to the collector wire schema.
    ///
    /// Returns a JSON object with the following structure:
    /// ```json
    /// {
    ///   "id": "e1",
    ///   "parent_id": "",
    ///   "level": "INFO",
    ///   "message": "payment accepted",
    ///   "meta": { "pkg": "...", "fn": "...", "aggregate_id": "...", /* attrs */ },
    ///   "timestamp": "2025-11-03T12:34:56.789+00:00"
    /// }
    /// ```
    ///
    /// A root record serializes its `parent_id` as the empty string, and
    /// `meta` carries the callsite and correlation id alongside the
    /// caller's attributes. The `pkg` and `fn` keys are always present,
    /// empty when the record was emitted without a callsite.
    ///
    /// # Example
    ///
    /// ```
    /// use logvine::record::{Level, LogRecord};
    ///
    /// let record = LogRecord::new(Level::Info, "hello");
    /// let wire = record.to_wire();
    ///
    /// assert_eq!(wire["level"], "INFO");
    /// assert_eq!(wire["message"], "hello");
    /// assert_eq!(wire["parent_id"], "");
    /// assert_eq!(wire["meta"]["pkg"], "");
    /// ```
    pub fn to_wire(&self) -> Value {
        use serde_json::json;

        let mut meta = serde_json::Map::new();
        for (key, value) in &self.attrs {
            meta.insert(key.clone(), value.clone());
        }
        meta.insert("pkg".to_string(), json!(self.callsite.pkg));
        meta.insert("fn".to_string(), json!(self.callsite.func));
        if let Some(correlation_id) = &self.correlation_id {
            meta.insert("aggregate_id".to_string(), json!(correlation_id));
        }

        json!({
            "id": self.id,
            "parent_id": self.parent_id.as_deref().unwrap_or(""),
            "level": self.level.as_str(),
            "message": self.message,
            "meta": Value::Object(meta),
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }

    /// Serialize the wire schema to a compact JSON string.
    pub fn to_wire_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_ordering_matches_severity() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_wire_strings() {
        assert_eq!(Level::Debug.to_string(), "DEBUG");
        assert_eq!(Level::Info.to_string(), "INFO");
        assert_eq!(Level::Warn.to_string(), "WARN");
        assert_eq!(Level::Error.to_string(), "ERROR");
    }

    #[test]
    fn wire_root_record_has_empty_parent() {
        let record = LogRecord::new(Level::Info, "boot");
        let wire = record.to_wire();
        assert_eq!(wire["parent_id"], "");
        assert_eq!(wire["id"], "");

        // callsite keys are present even when nothing was captured
        let meta = wire["meta"].as_object().unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(wire["meta"]["pkg"], "");
        assert_eq!(wire["meta"]["fn"], "");
    }

    #[test]
    fn wire_folds_identity_into_meta() {
        let mut attrs = new_attr_map();
        attrs.insert("amount".to_string(), json!(42));

        let mut record = LogRecord::new(Level::Warn, "charge retried")
            .with_attrs(attrs)
            .with_callsite(callsite!("charge"));
        record.id = "e2".to_string();
        record.parent_id = Some("e1".to_string());
        record.correlation_id = Some("agg-7".to_string());

        let wire = record.to_wire();
        assert_eq!(wire["id"], "e2");
        assert_eq!(wire["parent_id"], "e1");
        assert_eq!(wire["level"], "WARN");
        assert_eq!(wire["meta"]["amount"], 42);
        assert_eq!(wire["meta"]["aggregate_id"], "agg-7");
        assert_eq!(wire["meta"]["fn"], "charge");
        assert!(
            wire["meta"]["pkg"]
                .as_str()
                .unwrap()
                .contains("record::tests")
        );
    }

    #[test]
    fn wire_string_is_single_line_json() {
        let record = LogRecord::new(Level::Debug, "compact");
        let line = record.to_wire_string().unwrap();
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["message"], "compact");
    }
}
