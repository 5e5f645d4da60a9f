//! In-memory expectation registry and request history.
//!
//! [`Store`] is shared between connection tasks as `Arc<Store>`. A single
//! reader/writer lock guards both the ordered expectations and the history:
//! lookups and snapshots take the read side, every mutation the write side.
//! Compilation (including reading `@file` mock bodies) happens before the
//! write lock is taken, so a rejected expectation never touches the store.

use crate::error::{Result, StoreError};
use crate::expectation::{CompiledExpectation, Expectation, ExpectationRecord, MatchedExpectation};
use crate::history::HistoryItem;
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::{debug, info};
use uuid::Uuid;

/// Concurrency-safe collection of expectations plus request history.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
    /// Maximum number of history items kept (0 = unbounded)
    history_limit: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Registration order is the match order
    expectations: Vec<Entry>,
    history: VecDeque<HistoryItem>,
}

#[derive(Debug)]
struct Entry {
    id: Uuid,
    matched_count: u64,
    rule: CompiledExpectation,
}

impl Entry {
    fn record(&self) -> ExpectationRecord {
        ExpectationRecord {
            id: self.id,
            matched_count: self.matched_count,
            expectation: self.rule.expectation().clone(),
        }
    }
}

impl Store {
    /// Create an empty store with unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store keeping at most `limit` history items.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::default(),
            history_limit: limit,
        }
    }

    /// Compile and register an expectation, returning its new ID.
    pub fn add_expectation(&self, expectation: Expectation) -> Result<Uuid> {
        let rule = expectation.compile()?;
        let id = Uuid::new_v4();

        info!(%id, expectation = %rule.expectation(), "Expectation added");

        self.inner.write().expectations.push(Entry {
            id,
            matched_count: 0,
            rule,
        });
        Ok(id)
    }

    /// Register expectations in order, stopping at the first failure.
    ///
    /// Expectations added before the failing one stay registered.
    pub fn add_expectations(
        &self,
        expectations: impl IntoIterator<Item = Expectation>,
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for (index, expectation) in expectations.into_iter().enumerate() {
            match self.add_expectation(expectation) {
                Ok(id) => ids.push(id),
                Err(StoreError::Expectation(source)) => {
                    return Err(StoreError::Batch { index, source })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    /// Get a registered expectation by ID.
    pub fn get_expectation(&self, id: Uuid) -> Result<ExpectationRecord> {
        self.inner
            .read()
            .expectations
            .iter()
            .find(|entry| entry.id == id)
            .map(Entry::record)
            .ok_or(StoreError::NotFound(id))
    }

    /// Replace an expectation in place, keeping its ID, position and match count.
    pub fn update_expectation(&self, id: Uuid, expectation: Expectation) -> Result<()> {
        if !self.contains(id) {
            return Err(StoreError::NotFound(id));
        }

        let rule = expectation.compile()?;

        let mut inner = self.inner.write();
        let entry = inner
            .expectations
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;

        info!(%id, expectation = %rule.expectation(), "Expectation updated");
        entry.rule = rule;
        Ok(())
    }

    /// Remove an expectation by ID.
    pub fn remove_expectation(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        let index = inner
            .expectations
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;

        inner.expectations.remove(index);
        info!(%id, "Expectation removed");
        Ok(())
    }

    /// Find the first expectation, in registration order, matching a request.
    ///
    /// Does not touch match counts; see [`Store::record_match`].
    pub fn find_match(&self, method: &str, path: &str, body: &str) -> Option<MatchedExpectation> {
        let inner = self.inner.read();
        let entry = inner
            .expectations
            .iter()
            .find(|entry| entry.rule.matches(method, path, body))?;

        debug!(id = %entry.id, method, path, "Expectation matched");

        Some(MatchedExpectation {
            id: entry.id,
            status: entry.rule.status(),
            headers: entry.rule.expectation().headers.clone(),
            body: entry.rule.mock_body().to_string(),
        })
    }

    /// Count one served match against an expectation, returning the new count.
    pub fn record_match(&self, id: Uuid) -> Result<u64> {
        let mut inner = self.inner.write();
        let entry = inner
            .expectations
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::NotFound(id))?;

        entry.matched_count += 1;
        Ok(entry.matched_count)
    }

    /// Snapshot of all expectations in registration order.
    ///
    /// File-backed mocks are reported by their `@file` reference.
    pub fn dump_available_expectations(&self) -> Vec<ExpectationRecord> {
        self.inner
            .read()
            .expectations
            .iter()
            .map(Entry::record)
            .collect()
    }

    /// Append a processed request to the history.
    pub fn add_history(&self, item: HistoryItem) {
        let mut inner = self.inner.write();
        inner.history.push_back(item);
        if self.history_limit > 0 {
            while inner.history.len() > self.history_limit {
                inner.history.pop_front();
            }
        }
    }

    /// Snapshot of the history, oldest first or (with `reverse`) newest first.
    pub fn get_history(&self, reverse: bool) -> Vec<HistoryItem> {
        let inner = self.inner.read();
        if reverse {
            inner.history.iter().rev().cloned().collect()
        } else {
            inner.history.iter().cloned().collect()
        }
    }

    /// Number of registered expectations.
    pub fn len(&self) -> usize {
        self.inner.read().expectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, id: Uuid) -> bool {
        self.inner
            .read()
            .expectations
            .iter()
            .any(|entry| entry.id == id)
    }
}
