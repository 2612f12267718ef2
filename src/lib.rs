//! # Idlink
//!
//! A customer-identity reconciliation engine.
//!
//! Purchases may each supply a different email and/or phone number; this
//! library maintains a union-find-like linkage over contact records and
//! consolidates them into a single logical identity per customer, with
//! deterministic "oldest wins" merge semantics.

pub mod config;
pub mod http;
pub mod listing;
pub mod model;
pub mod reconciler;
pub mod store;
pub mod test_support;
pub mod view;

// Re-export main types for convenience
pub use listing::{ContactPage, PageRequest};
pub use model::{
    ConsolidatedIdentity, ContactId, ContactRecord, LinkPrecedence, Observation, Timestamp,
};
pub use reconciler::LinkOutcome;
pub use store::{Clock, ContactStore, MemoryStore, SystemClock};

use anyhow::Result;
use parking_lot::Mutex;
use std::path::Path;

/// Main API for identity reconciliation.
///
/// The engine owns the record store behind one mutex and holds it across the
/// full read-decide-write sequence of every identify call, which is the
/// serialization strategy for overlapping identity groups: two observations
/// that would touch the same records can never interleave. Writes are issued
/// only against ids read under the same lock, so a call's mutations commit
/// together or not at all.
pub struct IdentityEngine {
    store: Mutex<Box<dyn ContactStore>>,
}

impl IdentityEngine {
    /// Create an engine over an empty in-memory store.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Create an engine with a custom store implementation.
    pub fn with_store<S>(store: S) -> Self
    where
        S: ContactStore + 'static,
    {
        Self {
            store: Mutex::new(Box::new(store)),
        }
    }

    /// Reconcile one observation and return the consolidated identity view.
    pub fn identify(&self, observation: &Observation) -> Result<ConsolidatedIdentity> {
        let mut store = self.store.lock();
        reconciler::reconcile(store.as_mut(), observation)
    }

    /// As [`IdentityEngine::identify`], additionally reporting what changed.
    pub fn identify_with_outcome(
        &self,
        observation: &Observation,
    ) -> Result<(ConsolidatedIdentity, LinkOutcome)> {
        let mut store = self.store.lock();
        reconciler::reconcile_with_outcome(store.as_mut(), observation)
    }

    /// List active contact records, newest first.
    pub fn list_contacts(&self, request: &PageRequest) -> Result<ContactPage> {
        let store = self.store.lock();
        listing::paginate(store.as_ref(), request)
    }

    /// Get a record by id.
    pub fn get_contact(&self, id: ContactId) -> Option<ContactRecord> {
        self.store.lock().get(id)
    }

    /// Number of active contact records.
    pub fn contact_count(&self) -> usize {
        self.store.lock().len()
    }

    /// Write a durable snapshot of the store.
    pub fn checkpoint(&self, path: &Path) -> Result<()> {
        self.store.lock().checkpoint(path)
    }
}

impl Default for IdentityEngine {
    fn default() -> Self {
        Self::new()
    }
}
