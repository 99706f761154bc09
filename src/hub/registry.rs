//! Subscriber bookkeeping and line fan-out.

use std::sync::RwLock;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::warn;

/// Delivery failed for some subscribers.
///
/// The line still reached every healthy subscriber; the failed ones were
/// removed from the registry before this error was returned.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to deliver to {failed} of {total} subscribers")]
#[diagnostic(
    code(logvine::hub::broadcast),
    help("disconnected subscribers are removed automatically; the line reached every healthy one")
)]
pub struct BroadcastError {
    pub failed: usize,
    pub total: usize,
}

/// Registered SSE subscribers, keyed by a monotonically increasing id.
///
/// Ids are never reused for the lifetime of the registry. Reads (the
/// broadcast pass) take the lock shared; registration and removal take
/// it exclusively, so new subscribers briefly wait out an in-flight
/// broadcast and then observe all later lines.
pub struct SubscriberRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: FxHashMap<u64, flume::Sender<String>>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a subscriber and return its id plus the receiving end of
    /// its delivery channel.
    pub fn subscribe(&self) -> (u64, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let mut inner = self.write();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(id, tx);
        (id, rx)
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: u64) -> bool {
        self.write().subscribers.remove(&id).is_some()
    }

    /// Number of currently registered subscribers.
    pub fn len(&self) -> usize {
        self.read().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one line to every registered subscriber.
    ///
    /// Each subscriber is attempted independently; a failed push (the
    /// receiving side is gone) never prevents delivery to the others.
    /// Failed subscribers are pruned and reported in the returned error.
    pub fn broadcast(&self, line: &str) -> Result<(), BroadcastError> {
        let mut failed: Vec<u64> = Vec::new();
        let total;
        {
            let inner = self.read();
            total = inner.subscribers.len();
            for (id, tx) in &inner.subscribers {
                if tx.send(line.to_owned()).is_err() {
                    failed.push(*id);
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }

        {
            let mut inner = self.write();
            for id in &failed {
                inner.subscribers.remove(id);
            }
        }
        warn!(
            failed = failed.len(),
            total, "pruned subscribers that could not be delivered to"
        );
        Err(BroadcastError {
            failed: failed.len(),
            total,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().expect("subscriber registry lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner
            .write()
            .expect("subscriber registry lock poisoned")
    }
}
