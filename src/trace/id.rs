//! Id sources for record and correlation ids.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Mints unique ids for records and correlation groups.
///
/// Uniqueness is the only property the pipeline relies on; ids are opaque
/// strings everywhere else. Implementations must be cheap enough to call
/// once per emitted record.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs. The default source.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `{prefix}-{n}` ids from an atomic counter, starting at 1.
///
/// Useful in tests, and for deployments that prefer monotonic ids over
/// random ones.
///
/// ```
/// use logvine::trace::{IdSource, SequenceIdSource};
///
/// let ids = SequenceIdSource::new("req");
/// assert_eq!(ids.next_id(), "req-1");
/// assert_eq!(ids.next_id(), "req-2");
/// ```
#[derive(Debug)]
pub struct SequenceIdSource {
    prefix: String,
    counter: AtomicU64,
}

impl SequenceIdSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequenceIdSource {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}
