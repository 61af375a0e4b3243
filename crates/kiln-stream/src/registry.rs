//! Listener registry: per-prompt buckets with capacity caps.
//!
//! The registry is the only state mutated from more than one logical
//! actor (registering callers vs. the router evicting dead listeners), so
//! every mutation goes through methods that take the internal lock.
//! Lookups return copy-on-read snapshots: a concurrent register or
//! unregister during a routing pass can neither corrupt the pass nor
//! cause duplicate delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use kiln_core::errors::RegistryError;
use kiln_core::ids::{ListenerId, PromptId};

use crate::listener::{DeliveryTarget, ListenerHandle, PromptFilter};

/// One registered listener.
///
/// The registration sequence number gives a stable delivery order:
/// earlier registrations for the same prompt are attempted first.
pub struct RegisteredListener {
    id: ListenerId,
    seq: u64,
    filter: PromptFilter,
    target: DeliveryTarget,
    consecutive_drops: AtomicU32,
}

impl RegisteredListener {
    /// The handle identifying this registration.
    #[must_use]
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            id: self.id.clone(),
            filter: self.filter.clone(),
        }
    }

    /// The delivery target.
    #[must_use]
    pub fn target(&self) -> &DeliveryTarget {
        &self.target
    }

    /// Record a dropped delivery; returns the new consecutive-drop count.
    pub fn record_drop(&self) -> u32 {
        self.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reset the consecutive-drop counter after a successful delivery.
    pub fn reset_drops(&self) {
        self.consecutive_drops.store(0, Ordering::Relaxed);
    }

    /// Current consecutive-drop count.
    #[must_use]
    pub fn drop_count(&self) -> u32 {
        self.consecutive_drops.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Inner {
    prompts: HashMap<PromptId, Vec<Arc<RegisteredListener>>>,
    wildcard: Vec<Arc<RegisteredListener>>,
    total: usize,
}

/// Concurrency-safe listener table with independent per-prompt and global
/// capacity caps.
pub struct ListenerRegistry {
    max_per_prompt: usize,
    max_total: usize,
    next_seq: AtomicU64,
    inner: RwLock<Inner>,
}

impl ListenerRegistry {
    /// Create a registry with the given caps.
    #[must_use]
    pub fn new(max_per_prompt: usize, max_total: usize) -> Self {
        Self {
            max_per_prompt,
            max_total,
            next_seq: AtomicU64::new(0),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a listener.
    ///
    /// Fails with `PerPromptCapacityExceeded` when the prompt's bucket is
    /// full, or `GlobalCapacityExceeded` when the table as a whole is.
    /// The two caps are independent and a failure mutates nothing, so one
    /// prompt hitting its cap never affects listeners of another prompt.
    /// Wildcard listeners are bounded by the global cap only.
    pub fn register(
        &self,
        filter: PromptFilter,
        target: DeliveryTarget,
    ) -> Result<ListenerHandle, RegistryError> {
        let mut inner = self.inner.write();

        if let PromptFilter::Prompt(ref prompt) = filter {
            let bucket_len = inner.prompts.get(prompt).map_or(0, Vec::len);
            if bucket_len >= self.max_per_prompt {
                return Err(RegistryError::PerPromptCapacityExceeded {
                    prompt: prompt.clone(),
                    limit: self.max_per_prompt,
                });
            }
        }

        if inner.total >= self.max_total {
            return Err(RegistryError::GlobalCapacityExceeded {
                limit: self.max_total,
            });
        }

        let listener = Arc::new(RegisteredListener {
            id: ListenerId::new(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            filter: filter.clone(),
            target,
            consecutive_drops: AtomicU32::new(0),
        });
        let handle = listener.handle();

        match filter {
            PromptFilter::Prompt(prompt) => {
                inner.prompts.entry(prompt).or_default().push(listener);
            }
            PromptFilter::All => inner.wildcard.push(listener),
        }
        inner.total += 1;

        debug!(listener_id = %handle.id, total = inner.total, "listener registered");
        Ok(handle)
    }

    /// Remove a listener. Removing one that is already gone is a no-op.
    pub fn unregister(&self, handle: &ListenerHandle) {
        if self.remove(handle) {
            debug!(listener_id = %handle.id, "listener unregistered");
        }
    }

    /// Remove a listener whose target failed terminally.
    ///
    /// Called by the router when a delivery target is closed or has
    /// exhausted its drop budget. Idempotent.
    pub fn dispatch_failure(&self, handle: &ListenerHandle) {
        if self.remove(handle) {
            warn!(listener_id = %handle.id, "listener evicted after delivery failure");
        }
    }

    fn remove(&self, handle: &ListenerHandle) -> bool {
        let mut inner = self.inner.write();
        let removed = match &handle.filter {
            PromptFilter::Prompt(prompt) => {
                let Some(bucket) = inner.prompts.get_mut(prompt) else {
                    return false;
                };
                let before = bucket.len();
                bucket.retain(|l| l.id != handle.id);
                let removed = bucket.len() < before;
                if bucket.is_empty() {
                    let _ = inner.prompts.remove(prompt);
                }
                removed
            }
            PromptFilter::All => {
                let before = inner.wildcard.len();
                inner.wildcard.retain(|l| l.id != handle.id);
                inner.wildcard.len() < before
            }
        };
        if removed {
            inner.total -= 1;
        }
        removed
    }

    /// Snapshot of the listeners interested in `prompt`, in registration
    /// order: the prompt's own bucket merged with wildcard listeners.
    #[must_use]
    pub fn listeners_for(&self, prompt: &PromptId) -> Vec<Arc<RegisteredListener>> {
        let inner = self.inner.read();
        let mut snapshot: Vec<Arc<RegisteredListener>> = inner
            .prompts
            .get(prompt)
            .into_iter()
            .flatten()
            .chain(inner.wildcard.iter())
            .cloned()
            .collect();
        snapshot.sort_by_key(|l| l.seq);
        snapshot
    }

    /// Snapshot of every registered listener, in registration order.
    ///
    /// Used for connection-level events, which carry no prompt ID.
    #[must_use]
    pub fn all_listeners(&self) -> Vec<Arc<RegisteredListener>> {
        let inner = self.inner.read();
        let mut snapshot: Vec<Arc<RegisteredListener>> = inner
            .prompts
            .values()
            .flatten()
            .chain(inner.wildcard.iter())
            .cloned()
            .collect();
        snapshot.sort_by_key(|l| l.seq);
        snapshot
    }

    /// Total registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().total
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listeners registered for one prompt (excluding wildcards).
    #[must_use]
    pub fn prompt_listener_count(&self, prompt: &PromptId) -> usize {
        self.inner.read().prompts.get(prompt).map_or(0, Vec::len)
    }

    /// Drop every registration. Used on client shutdown.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.prompts.clear();
        inner.wildcard.clear();
        inner.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn registry(per_prompt: usize, total: usize) -> ListenerRegistry {
        ListenerRegistry::new(per_prompt, total)
    }

    fn noop() -> DeliveryTarget {
        DeliveryTarget::callback(|_| {})
    }

    fn prompt(id: &str) -> PromptFilter {
        PromptFilter::Prompt(PromptId::from(id))
    }

    #[test]
    fn register_and_count() {
        let reg = registry(10, 100);
        let _h1 = reg.register(prompt("a"), noop()).unwrap();
        let _h2 = reg.register(prompt("a"), noop()).unwrap();
        let _h3 = reg.register(prompt("b"), noop()).unwrap();

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.prompt_listener_count(&PromptId::from("a")), 2);
        assert_eq!(reg.prompt_listener_count(&PromptId::from("b")), 1);
    }

    #[test]
    fn per_prompt_cap_rejects_excess() {
        let reg = registry(3, 100);
        for _ in 0..3 {
            let _ = reg.register(prompt("a"), noop()).unwrap();
        }

        let err = reg.register(prompt("a"), noop()).unwrap_err();
        assert_matches!(err, RegistryError::PerPromptCapacityExceeded { prompt, limit: 3 } => {
            assert_eq!(prompt.as_str(), "a");
        });
    }

    #[test]
    fn per_prompt_cap_isolated_between_prompts() {
        let reg = registry(2, 100);
        let _ = reg.register(prompt("a"), noop()).unwrap();
        let _ = reg.register(prompt("a"), noop()).unwrap();
        assert!(reg.register(prompt("a"), noop()).is_err());

        // Prompt "b" is unaffected by "a" hitting its cap.
        assert!(reg.register(prompt("b"), noop()).is_ok());
        assert_eq!(reg.prompt_listener_count(&PromptId::from("b")), 1);
        // And the failed registration did not change "a"'s count.
        assert_eq!(reg.prompt_listener_count(&PromptId::from("a")), 2);
    }

    #[test]
    fn global_cap_rejects_excess() {
        let reg = registry(10, 2);
        let _ = reg.register(prompt("a"), noop()).unwrap();
        let _ = reg.register(prompt("b"), noop()).unwrap();

        let err = reg.register(prompt("c"), noop()).unwrap_err();
        assert_matches!(err, RegistryError::GlobalCapacityExceeded { limit: 2 });
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn global_cap_applies_to_wildcards() {
        let reg = registry(10, 1);
        let _ = reg.register(PromptFilter::All, noop()).unwrap();
        let err = reg.register(PromptFilter::All, noop()).unwrap_err();
        assert_matches!(err, RegistryError::GlobalCapacityExceeded { .. });
    }

    #[test]
    fn full_bucket_reports_per_prompt_not_global() {
        // Both caps are at their limit for prompt "a"; the per-prompt error
        // must win so the caller knows which cap it hit.
        let reg = registry(1, 1);
        let _ = reg.register(prompt("a"), noop()).unwrap();
        let err = reg.register(prompt("a"), noop()).unwrap_err();
        assert_matches!(err, RegistryError::PerPromptCapacityExceeded { .. });
    }

    #[test]
    fn unregister_removes_listener() {
        let reg = registry(10, 100);
        let h = reg.register(prompt("a"), noop()).unwrap();
        assert_eq!(reg.len(), 1);

        reg.unregister(&h);
        assert_eq!(reg.len(), 0);
        assert!(reg.listeners_for(&PromptId::from("a")).is_empty());
    }

    #[test]
    fn unregister_twice_is_noop() {
        let reg = registry(10, 100);
        let h1 = reg.register(prompt("a"), noop()).unwrap();
        let h2 = reg.register(prompt("a"), noop()).unwrap();

        reg.unregister(&h1);
        reg.unregister(&h1);

        assert_eq!(reg.len(), 1);
        let remaining = reg.listeners_for(&PromptId::from("a"));
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].handle(), h2);
    }

    #[test]
    fn unregister_frees_cap_space() {
        let reg = registry(1, 100);
        let h = reg.register(prompt("a"), noop()).unwrap();
        assert!(reg.register(prompt("a"), noop()).is_err());

        reg.unregister(&h);
        assert!(reg.register(prompt("a"), noop()).is_ok());
    }

    #[test]
    fn dispatch_failure_removes_and_is_idempotent() {
        let reg = registry(10, 100);
        let h = reg.register(prompt("a"), noop()).unwrap();

        reg.dispatch_failure(&h);
        assert!(reg.listeners_for(&PromptId::from("a")).is_empty());

        // Second call for the same handle is a no-op.
        reg.dispatch_failure(&h);
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn listeners_for_includes_wildcards_in_registration_order() {
        let reg = registry(10, 100);
        let h1 = reg.register(prompt("a"), noop()).unwrap();
        let h2 = reg.register(PromptFilter::All, noop()).unwrap();
        let h3 = reg.register(prompt("a"), noop()).unwrap();

        let snapshot = reg.listeners_for(&PromptId::from("a"));
        let handles: Vec<ListenerHandle> = snapshot.iter().map(|l| l.handle()).collect();
        assert_eq!(handles, vec![h1, h2, h3]);
    }

    #[test]
    fn listeners_for_excludes_other_prompts() {
        let reg = registry(10, 100);
        let _a = reg.register(prompt("a"), noop()).unwrap();
        let b = reg.register(prompt("b"), noop()).unwrap();

        let snapshot = reg.listeners_for(&PromptId::from("b"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].handle(), b);
    }

    #[test]
    fn snapshot_is_stable_against_later_mutation() {
        let reg = registry(10, 100);
        let h1 = reg.register(prompt("a"), noop()).unwrap();

        let snapshot = reg.listeners_for(&PromptId::from("a"));
        reg.unregister(&h1);

        // The snapshot still holds the entry taken before the unregister.
        assert_eq!(snapshot.len(), 1);
        assert!(reg.listeners_for(&PromptId::from("a")).is_empty());
    }

    #[test]
    fn all_listeners_spans_prompts_and_wildcards() {
        let reg = registry(10, 100);
        let h1 = reg.register(prompt("a"), noop()).unwrap();
        let h2 = reg.register(prompt("b"), noop()).unwrap();
        let h3 = reg.register(PromptFilter::All, noop()).unwrap();

        let all = reg.all_listeners();
        let handles: Vec<ListenerHandle> = all.iter().map(|l| l.handle()).collect();
        assert_eq!(handles, vec![h1, h2, h3]);
    }

    #[test]
    fn clear_empties_everything() {
        let reg = registry(10, 100);
        let _ = reg.register(prompt("a"), noop()).unwrap();
        let _ = reg.register(PromptFilter::All, noop()).unwrap();

        reg.clear();
        assert!(reg.is_empty());
        assert!(reg.all_listeners().is_empty());
    }

    #[test]
    fn drop_counter_round_trip() {
        let reg = registry(10, 100);
        let _h = reg.register(prompt("a"), noop()).unwrap();
        let listener = &reg.listeners_for(&PromptId::from("a"))[0];

        assert_eq!(listener.drop_count(), 0);
        assert_eq!(listener.record_drop(), 1);
        assert_eq!(listener.record_drop(), 2);
        listener.reset_drops();
        assert_eq!(listener.drop_count(), 0);
    }

    #[test]
    fn concurrent_registration_is_safe() {
        let reg = Arc::new(registry(1000, 10_000));
        let mut threads = Vec::new();
        for t in 0..8 {
            let reg = Arc::clone(&reg);
            threads.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let filter = prompt(&format!("p{}", (t * 50 + i) % 4));
                    let _ = reg.register(filter, noop()).unwrap();
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(reg.len(), 400);
    }
}
