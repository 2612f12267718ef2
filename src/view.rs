//! # Consolidated View Assembly
//!
//! Folds the full membership of one identity into its consolidated form:
//! a single primary id, deduplicated contact values with the primary's first,
//! and the secondary ids in creation order.

use crate::model::{ConsolidatedIdentity, ContactRecord, LinkPrecedence};
use anyhow::{bail, Context, Result};

/// Assemble the consolidated view from an identity's full membership.
///
/// Input order is irrelevant. Exactly one member must be primary; anything
/// else means the graph is corrupted and the request fails.
pub fn consolidate(members: &[ContactRecord]) -> Result<ConsolidatedIdentity> {
    let mut ordered: Vec<&ContactRecord> = members.iter().collect();
    ordered.sort_by_key(|record| record.age_key());

    let mut primaries = ordered
        .iter()
        .filter(|record| record.link_precedence == LinkPrecedence::Primary);
    let primary = *primaries
        .next()
        .context("consolidated identity has no primary contact")?;
    if let Some(extra) = primaries.next() {
        bail!(
            "consolidated identity has more than one primary contact ({} and {})",
            primary.id,
            extra.id
        );
    }

    let mut emails = Vec::new();
    let mut phones = Vec::new();
    push_unique(&mut emails, primary.email.as_deref());
    push_unique(&mut phones, primary.phone.as_deref());

    let mut secondary_ids = Vec::with_capacity(ordered.len() - 1);
    for record in &ordered {
        if record.id == primary.id {
            continue;
        }
        push_unique(&mut emails, record.email.as_deref());
        push_unique(&mut phones, record.phone.as_deref());
        secondary_ids.push(record.id);
    }

    Ok(ConsolidatedIdentity {
        primary_id: primary.id,
        emails,
        phones,
        secondary_ids,
    })
}

// First occurrence wins position; equality is exact string equality.
fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}
