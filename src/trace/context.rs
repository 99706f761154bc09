//! The trace context value and correlation-id resolution.

use super::id::IdSource;

/// Immutable causal position within a log lineage.
///
/// A `TraceContext` holds two pieces of identity:
///
/// - the **lineage id**: the id of the most recent record emitted on this
///   chain, which the next record will use as its `parent_id`. Empty for
///   a chain root.
/// - the **correlation id**: shared by every record of one logical
///   request or session. Once resolved it never changes along the chain.
///
/// Contexts are values, not handles: deriving a child returns a new
/// context and leaves the original untouched. Two tasks that clone the
/// same ancestor context extend the chain independently; their records
/// become causal siblings with no relative order between the branches.
///
/// Absent ids are simply `None`. There are no failure modes here.
///
/// # Examples
///
/// ```
/// use logvine::trace::TraceContext;
///
/// let root = TraceContext::new().with_correlation_id("agg-1");
/// assert_eq!(root.parent_id(), None);
///
/// let after_first = root.child("e1");
/// assert_eq!(after_first.parent_id(), Some("e1"));
/// assert_eq!(after_first.correlation_id(), Some("agg-1"));
///
/// // Branching: both siblings descend from e1.
/// let branch_a = after_first.child("e2");
/// let branch_b = after_first.child("e3");
/// assert_eq!(branch_a.correlation_id(), branch_b.correlation_id());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceContext {
    parent_id: Option<String>,
    correlation_id: Option<String>,
}

impl TraceContext {
    /// An empty chain root with no correlation id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a context from already-known ids, e.g. ones read off an
    /// inbound request.
    pub fn from_parts(parent_id: Option<String>, correlation_id: Option<String>) -> Self {
        Self {
            parent_id,
            correlation_id,
        }
    }

    /// Id the next emitted record will use as its parent.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Correlation id shared by the whole lineage, if resolved.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Derive the context that follows a record with the given id.
    ///
    /// The correlation id is preserved; the lineage id becomes `id`.
    #[must_use]
    pub fn child(&self, id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(id.into()),
            correlation_id: self.correlation_id.clone(),
        }
    }

    /// Return a copy of this context with the correlation id set.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Resolve the correlation id for a lineage.
///
/// Priority order: a value already present on the context wins, then a
/// non-empty inbound header value, and only when both are absent is a
/// fresh id generated. The winner is what gets attached to derived
/// contexts and echoed on outbound headers.
pub fn resolve_correlation_id(
    ctx: &TraceContext,
    header: Option<&str>,
    ids: &dyn IdSource,
) -> String {
    if let Some(id) = ctx.correlation_id() {
        return id.to_string();
    }
    if let Some(id) = header.filter(|value| !value.is_empty()) {
        return id.to_string();
    }
    ids.next_id()
}
