use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::SystemError;

#[derive(Default)]
struct StoreInner {
    errors: HashMap<String, SystemError>,
    /// Insertion order of ids
    order: Vec<String>,
}

/// In-memory store of reported errors and their resolution state.
///
/// Nothing is evicted implicitly; `purge_resolved_before` exists for an
/// external retention policy.
#[derive(Default)]
pub struct ErrorStore {
    inner: RwLock<StoreInner>,
}

impl ErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an error as unresolved with no retries recorded.
    pub fn put(&self, mut error: SystemError) {
        error.resolved = false;
        error.resolved_at = None;
        error.resolution_method = None;
        error.retry_count = 0;

        let mut inner = self.inner.write();
        if !inner.errors.contains_key(&error.id) {
            inner.order.push(error.id.clone());
        }
        inner.errors.insert(error.id.clone(), error);
    }

    pub fn get(&self, id: &str) -> Option<SystemError> {
        self.inner.read().errors.get(id).cloned()
    }

    /// All errors in the order they were reported
    pub fn list(&self) -> Vec<SystemError> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.errors.get(id).cloned())
            .collect()
    }

    /// Returns false when the id is unknown
    pub fn mark_resolved(&self, id: &str, method: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.errors.get_mut(id) {
            Some(error) => {
                error.resolved = true;
                error.resolved_at = Some(Utc::now());
                error.resolution_method = Some(method.to_string());
                true
            }
            None => false,
        }
    }

    /// Bump the retry counter, returning the new value
    pub fn increment_retry(&self, id: &str) -> Option<u32> {
        let mut inner = self.inner.write();
        let error = inner.errors.get_mut(id)?;
        error.retry_count = error.retry_count.saturating_add(1);
        Some(error.retry_count)
    }

    pub fn len(&self) -> usize {
        self.inner.read().errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolved_count(&self) -> usize {
        self.inner
            .read()
            .errors
            .values()
            .filter(|e| e.resolved)
            .count()
    }

    /// Drop resolved errors whose resolution is older than `cutoff`.
    pub fn purge_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .errors
            .values()
            .filter(|e| e.resolved && e.resolved_at.map(|t| t < cutoff).unwrap_or(false))
            .map(|e| e.id.clone())
            .collect();

        for id in &expired {
            inner.errors.remove(id);
        }
        inner.order.retain(|id| !expired.contains(id));
        expired.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.errors.clear();
        inner.order.clear();
    }
}
