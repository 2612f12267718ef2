//! # Store Module
//!
//! The record-store collaborator consumed by the reconciler: a narrow trait
//! plus the in-memory implementation with JSON snapshot support.

use crate::model::{ContactId, ContactRecord, LinkPrecedence, Timestamp};
use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::OffsetDateTime;

/// Source of record timestamps.
///
/// The system clock is the production implementation; tests substitute a
/// manual clock to pin `created_at` ordering and force ties.
pub trait Clock: Send {
    fn now_ms(&self) -> Timestamp;
}

/// Wall-clock time in UTC epoch milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as Timestamp
    }
}

/// Storage interface for contact records.
///
/// Implementations answer membership lookups and apply the reconciler's
/// create/update instructions. Query results never include removed records,
/// and are returned in ascending `(created_at, id)` order.
pub trait ContactStore: Send {
    /// Active records whose email or phone equals the given values.
    /// Empty when both fields are absent.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<ContactRecord>>;

    /// The primary plus all of its active direct secondaries.
    ///
    /// Fails if `primary_id` is unknown or does not name a primary record.
    fn identity_members(&self, primary_id: ContactId) -> Result<Vec<ContactRecord>>;

    /// Create a record, assigning its id and timestamps.
    ///
    /// `linked_id` must be present iff `precedence` is secondary.
    fn create_record(
        &mut self,
        email: Option<String>,
        phone: Option<String>,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
    ) -> Result<ContactRecord>;

    /// Rewrite a record to be a secondary of `new_primary`, bumping
    /// `updated_at`. Covers both merge mutations: demoting a former primary
    /// and repointing a stale secondary.
    fn update_link(&mut self, id: ContactId, new_primary: ContactId) -> Result<()>;

    /// Get a record by id, removed or not.
    fn get(&self, id: ContactId) -> Option<ContactRecord>;

    /// All active records, in unspecified order.
    fn active_records(&self) -> Vec<ContactRecord>;

    /// Number of active records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark a record as removed, excluding it from all subsequent queries.
    fn mark_removed(&mut self, id: ContactId) -> Result<()>;

    /// Write a durable snapshot of the store to `path`.
    fn checkpoint(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_id: u32,
    records: Vec<ContactRecord>,
}

/// In-memory contact store.
pub struct MemoryStore {
    records: HashMap<ContactId, ContactRecord>,
    next_id: u32,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store with a custom clock.
    pub fn with_clock<C>(clock: C) -> Self
    where
        C: Clock + 'static,
    {
        Self {
            records: HashMap::new(),
            next_id: 1,
            clock: Box::new(clock),
        }
    }

    /// Load a store from a snapshot written by [`ContactStore::checkpoint`].
    pub fn restore(path: &Path) -> Result<Self> {
        Self::restore_with_clock(path, SystemClock)
    }

    pub fn restore_with_clock<C>(path: &Path, clock: C) -> Result<Self>
    where
        C: Clock + 'static,
    {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot at {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("malformed snapshot at {}", path.display()))?;

        let mut records = HashMap::with_capacity(snapshot.records.len());
        let mut next_id = snapshot.next_id;
        for record in snapshot.records {
            next_id = next_id.max(record.id.0 + 1);
            records.insert(record.id, record);
        }
        Ok(Self {
            records,
            next_id,
            clock: Box::new(clock),
        })
    }

    fn active(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.values().filter(|record| record.is_active())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactStore for MemoryStore {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<ContactRecord>> {
        if email.is_none() && phone.is_none() {
            return Ok(Vec::new());
        }
        let mut matches: Vec<ContactRecord> = self
            .active()
            .filter(|record| {
                (email.is_some() && record.email.as_deref() == email)
                    || (phone.is_some() && record.phone.as_deref() == phone)
            })
            .cloned()
            .collect();
        matches.sort_by_key(ContactRecord::age_key);
        Ok(matches)
    }

    fn identity_members(&self, primary_id: ContactId) -> Result<Vec<ContactRecord>> {
        let primary = self
            .records
            .get(&primary_id)
            .with_context(|| format!("unknown contact {}", primary_id))?;
        if !primary.is_primary() {
            bail!("contact {} is not a primary record", primary_id);
        }

        let mut members: Vec<ContactRecord> = self
            .active()
            .filter(|record| record.linked_id == Some(primary_id))
            .cloned()
            .collect();
        if primary.is_active() {
            members.push(primary.clone());
        }
        members.sort_by_key(ContactRecord::age_key);
        Ok(members)
    }

    fn create_record(
        &mut self,
        email: Option<String>,
        phone: Option<String>,
        precedence: LinkPrecedence,
        linked_id: Option<ContactId>,
    ) -> Result<ContactRecord> {
        match (precedence, linked_id) {
            (LinkPrecedence::Primary, Some(linked)) => {
                bail!("primary record cannot link to {}", linked)
            }
            (LinkPrecedence::Secondary, None) => {
                bail!("secondary record requires a linked primary")
            }
            _ => {}
        }
        if let Some(linked) = linked_id {
            if !self.records.contains_key(&linked) {
                bail!("cannot link new record to unknown contact {}", linked);
            }
        }

        let now = self.clock.now_ms();
        let record = ContactRecord {
            id: ContactId(self.next_id),
            email,
            phone,
            link_precedence: precedence,
            linked_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.next_id += 1;
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn update_link(&mut self, id: ContactId, new_primary: ContactId) -> Result<()> {
        if id == new_primary {
            bail!("contact {} cannot link to itself", id);
        }
        if !self.records.contains_key(&new_primary) {
            bail!("cannot link {} to unknown contact {}", id, new_primary);
        }
        let now = self.clock.now_ms();
        let record = self
            .records
            .get_mut(&id)
            .with_context(|| format!("unknown contact {}", id))?;
        record.link_precedence = LinkPrecedence::Secondary;
        record.linked_id = Some(new_primary);
        record.updated_at = now;
        Ok(())
    }

    fn get(&self, id: ContactId) -> Option<ContactRecord> {
        self.records.get(&id).cloned()
    }

    fn active_records(&self) -> Vec<ContactRecord> {
        self.active().cloned().collect()
    }

    fn len(&self) -> usize {
        self.active().count()
    }

    fn mark_removed(&mut self, id: ContactId) -> Result<()> {
        let now = self.clock.now_ms();
        let record = self
            .records
            .get_mut(&id)
            .with_context(|| format!("unknown contact {}", id))?;
        record.deleted_at = Some(now);
        Ok(())
    }

    fn checkpoint(&self, path: &Path) -> Result<()> {
        let mut records: Vec<ContactRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|record| record.id);
        let snapshot = Snapshot {
            next_id: self.next_id,
            records,
        };
        let raw = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write snapshot at {}", path.display()))?;
        Ok(())
    }
}
