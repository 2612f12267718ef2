//! # Listing Module
//!
//! Bounded pagination over active contact records, newest first.

use crate::config::defaults::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MIN_PAGE_LIMIT};
use crate::model::ContactRecord;
use crate::store::ContactStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A page request: bounded page size and 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: u32,
    pub page: u32,
}

impl PageRequest {
    pub fn new(limit: u32, page: u32) -> Self {
        Self { limit, page }
    }

    /// Page size after clamping to the allowed bounds.
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(MIN_PAGE_LIMIT, MAX_PAGE_LIMIT) as usize
    }

    /// Page number, with 0 treated as the first page.
    pub fn effective_page(&self) -> usize {
        self.page.max(1) as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            page: 1,
        }
    }
}

/// One page of contact records plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPage {
    pub contacts: Vec<ContactRecord>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Slice the active records for the requested page, ordered by `created_at`
/// descending (id descending on ties).
///
/// A page past the end yields an empty slice with correct totals; concurrent
/// writes may or may not be visible, which is acceptable here.
pub fn paginate(store: &dyn ContactStore, request: &PageRequest) -> Result<ContactPage> {
    let mut records = store.active_records();
    records.sort_by(|a, b| b.age_key().cmp(&a.age_key()));

    let limit = request.effective_limit();
    let page = request.effective_page();
    let total = records.len();
    let total_pages = total.div_ceil(limit);

    let start = (page - 1).saturating_mul(limit);
    let contacts: Vec<ContactRecord> = records.into_iter().skip(start).take(limit).collect();

    Ok(ContactPage {
        contacts,
        page,
        limit,
        total,
        total_pages,
        has_prev: page > 1,
        has_next: page < total_pages,
    })
}
