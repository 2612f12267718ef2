//! # Identity Reconciler
//!
//! The core linkage decision: given one observation and the stored contact
//! graph, create a new identity, attach an alias to an existing identity, or
//! merge previously-separate identities, then hand the full membership to the
//! view assembler.

use crate::model::{ConsolidatedIdentity, ContactId, ContactRecord, LinkPrecedence, Observation};
use crate::store::ContactStore;
use crate::view;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;

/// What a single reconciliation did to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// No candidate matched; a fresh primary was created.
    CreatedPrimary,
    /// One identity matched and the observation carried a new value.
    AttachedSecondary,
    /// One identity matched and the observation carried nothing new.
    NoChange,
    /// The observation bridged separate identities.
    Merged {
        /// Former primaries demoted to secondaries
        demoted: usize,
        /// Secondaries repointed at the surviving primary
        repointed: usize,
        /// Whether the observation also produced a new secondary
        attached: bool,
    },
}

/// Reconcile one observation against the store and return the consolidated
/// view of the identity it resolved to.
pub fn reconcile(
    store: &mut dyn ContactStore,
    observation: &Observation,
) -> Result<ConsolidatedIdentity> {
    let (identity, _) = reconcile_with_outcome(store, observation)?;
    Ok(identity)
}

/// As [`reconcile`], but also report what changed. The outcome is what the
/// property tests assert on.
pub fn reconcile_with_outcome(
    store: &mut dyn ContactStore,
    observation: &Observation,
) -> Result<(ConsolidatedIdentity, LinkOutcome)> {
    if observation.is_empty() {
        bail!("observation carries neither email nor phone");
    }

    let candidates = store.find_by_email_or_phone(
        observation.email.as_deref(),
        observation.phone.as_deref(),
    )?;

    if candidates.is_empty() {
        let record = store.create_record(
            observation.email.clone(),
            observation.phone.clone(),
            LinkPrecedence::Primary,
            None,
        )?;
        let identity = view::consolidate(std::slice::from_ref(&record))?;
        return Ok((identity, LinkOutcome::CreatedPrimary));
    }

    let governing = governing_primary_ids(&candidates)?;
    if governing.len() == 1 {
        let primary_id = *governing.iter().next().expect("non-empty governing set");
        attach_to_identity(store, observation, primary_id)
    } else {
        merge_identities(store, observation, &governing)
    }
}

/// Resolve the set of primary ids governing the candidate records.
///
/// Each primary candidate contributes its own id, each secondary its
/// `linked_id`. A secondary without a link, or an empty result for a
/// non-empty candidate set, means the graph is corrupted.
fn governing_primary_ids(candidates: &[ContactRecord]) -> Result<BTreeSet<ContactId>> {
    let mut governing = BTreeSet::new();
    for record in candidates {
        match record.link_precedence {
            LinkPrecedence::Primary => {
                governing.insert(record.id);
            }
            LinkPrecedence::Secondary => match record.linked_id {
                Some(primary_id) => {
                    governing.insert(primary_id);
                }
                None => bail!("secondary contact {} has no governing primary", record.id),
            },
        }
    }
    if governing.is_empty() {
        bail!(
            "{} matching contacts but no resolvable governing primary",
            candidates.len()
        );
    }
    Ok(governing)
}

/// Single-identity path: attach one new secondary if the observation carries
/// new information, otherwise leave the graph untouched.
fn attach_to_identity(
    store: &mut dyn ContactStore,
    observation: &Observation,
    primary_id: ContactId,
) -> Result<(ConsolidatedIdentity, LinkOutcome)> {
    let mut members = store
        .identity_members(primary_id)
        .with_context(|| format!("fetching members of identity {}", primary_id))?;
    if members.is_empty() {
        bail!("identity {} has no members", primary_id);
    }

    let outcome = if needs_new_secondary(&members, observation) {
        let created = store.create_record(
            observation.email.clone(),
            observation.phone.clone(),
            LinkPrecedence::Secondary,
            Some(primary_id),
        )?;
        members.push(created);
        LinkOutcome::AttachedSecondary
    } else {
        LinkOutcome::NoChange
    };

    Ok((view::consolidate(&members)?, outcome))
}

/// Merge path: the observation bridges two or more identities.
///
/// The primary with the earliest `(created_at, id)` survives; every other
/// primary is demoted in place and every secondary is repointed at the
/// survivor, flattening any two-level chain a demotion would otherwise leave.
fn merge_identities(
    store: &mut dyn ContactStore,
    observation: &Observation,
    governing: &BTreeSet<ContactId>,
) -> Result<(ConsolidatedIdentity, LinkOutcome)> {
    let mut membership: Vec<ContactRecord> = Vec::new();
    for &primary_id in governing {
        let members = store
            .identity_members(primary_id)
            .with_context(|| format!("fetching members of identity {}", primary_id))?;
        if members.is_empty() {
            bail!("identity {} has no members", primary_id);
        }
        membership.extend(members);
    }

    let survivor = membership
        .iter()
        .filter(|record| record.is_primary())
        .min_by_key(|record| record.age_key())
        .context("merge found no primary record")?
        .id;

    let mut demoted = 0usize;
    let mut repointed = 0usize;
    for record in &mut membership {
        if record.id == survivor {
            continue;
        }
        match record.link_precedence {
            LinkPrecedence::Primary => {
                store.update_link(record.id, survivor)?;
                record.link_precedence = LinkPrecedence::Secondary;
                record.linked_id = Some(survivor);
                demoted += 1;
            }
            LinkPrecedence::Secondary if record.linked_id != Some(survivor) => {
                store.update_link(record.id, survivor)?;
                record.linked_id = Some(survivor);
                repointed += 1;
            }
            LinkPrecedence::Secondary => {}
        }
    }

    let attached = needs_new_secondary(&membership, observation);
    if attached {
        let created = store.create_record(
            observation.email.clone(),
            observation.phone.clone(),
            LinkPrecedence::Secondary,
            Some(survivor),
        )?;
        membership.push(created);
    }

    tracing::debug!(
        survivor = %survivor,
        identities = governing.len(),
        demoted,
        repointed,
        attached,
        "merged identities"
    );

    Ok((
        view::consolidate(&membership)?,
        LinkOutcome::Merged {
            demoted,
            repointed,
            attached,
        },
    ))
}

/// The new-information test.
///
/// A new secondary is warranted only when the observation supplies an email
/// or a phone not present anywhere in the membership. An exact duplicate of
/// an existing (email, phone) pair therefore never creates a record, and
/// neither does an observation whose values all appear somewhere across the
/// membership, even in records the observation did not directly match.
fn needs_new_secondary(members: &[ContactRecord], observation: &Observation) -> bool {
    let novel_email = observation.email.as_deref().is_some_and(|email| {
        !members
            .iter()
            .any(|member| member.email.as_deref() == Some(email))
    });
    let novel_phone = observation.phone.as_deref().is_some_and(|phone| {
        !members
            .iter()
            .any(|member| member.phone.as_deref() == Some(phone))
    });
    novel_email || novel_phone
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{observation, ManualClock};

    fn record(
        id: u32,
        email: Option<&str>,
        phone: Option<&str>,
        precedence: LinkPrecedence,
        linked: Option<u32>,
        created_at: i64,
    ) -> ContactRecord {
        ContactRecord {
            id: ContactId(id),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            link_precedence: precedence,
            linked_id: linked.map(ContactId),
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_governing_ids_union_of_primaries_and_links() {
        let candidates = vec![
            record(1, Some("a@x"), None, LinkPrecedence::Primary, None, 10),
            record(3, Some("b@x"), None, LinkPrecedence::Secondary, Some(2), 30),
            record(4, None, Some("123"), LinkPrecedence::Secondary, Some(1), 40),
        ];
        let governing = governing_primary_ids(&candidates).unwrap();
        assert_eq!(
            governing.into_iter().collect::<Vec<_>>(),
            vec![ContactId(1), ContactId(2)]
        );
    }

    #[test]
    fn test_governing_ids_rejects_unlinked_secondary() {
        let candidates = vec![record(
            5,
            Some("a@x"),
            None,
            LinkPrecedence::Secondary,
            None,
            10,
        )];
        assert!(governing_primary_ids(&candidates).is_err());
    }

    #[test]
    fn test_new_information_exact_duplicate_is_noop() {
        let members = vec![record(
            1,
            Some("a@x"),
            Some("123"),
            LinkPrecedence::Primary,
            None,
            10,
        )];
        assert!(!needs_new_secondary(&members, &observation(Some("a@x"), Some("123"))));
    }

    #[test]
    fn test_new_information_novel_value_in_either_field() {
        let members = vec![record(
            1,
            Some("a@x"),
            Some("123"),
            LinkPrecedence::Primary,
            None,
            10,
        )];
        assert!(needs_new_secondary(&members, &observation(Some("b@x"), Some("123"))));
        assert!(needs_new_secondary(&members, &observation(Some("a@x"), Some("999"))));
        assert!(needs_new_secondary(&members, &observation(None, Some("999"))));
        assert!(!needs_new_secondary(&members, &observation(Some("a@x"), None)));
        assert!(!needs_new_secondary(&members, &observation(None, Some("123"))));
    }

    #[test]
    fn test_new_information_cross_branch_values_create_nothing() {
        // Email known from one branch, phone from another: both values are
        // present somewhere in the combined membership, so the novel pairing
        // alone does not warrant a record.
        let members = vec![
            record(1, Some("a@x"), Some("111"), LinkPrecedence::Primary, None, 10),
            record(2, Some("b@x"), Some("222"), LinkPrecedence::Secondary, Some(1), 20),
        ];
        assert!(!needs_new_secondary(&members, &observation(Some("a@x"), Some("222"))));
    }

    #[test]
    fn test_reconcile_rejects_empty_observation() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        assert!(reconcile(&mut store, &Observation::default()).is_err());
    }

    #[test]
    fn test_no_match_creates_primary() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        let (identity, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("a@x"), Some("123"))).unwrap();

        assert_eq!(outcome, LinkOutcome::CreatedPrimary);
        assert_eq!(identity.primary_id, ContactId(1));
        assert_eq!(identity.emails, vec!["a@x"]);
        assert_eq!(identity.phones, vec!["123"]);
        assert!(identity.secondary_ids.is_empty());
    }

    #[test]
    fn test_single_identity_attach_and_noop() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        reconcile(&mut store, &observation(Some("a@x"), Some("123"))).unwrap();

        let (_, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("b@x"), Some("123"))).unwrap();
        assert_eq!(outcome, LinkOutcome::AttachedSecondary);

        // Same pair again: idempotent.
        let (identity, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("b@x"), Some("123"))).unwrap();
        assert_eq!(outcome, LinkOutcome::NoChange);
        assert_eq!(identity.primary_id, ContactId(1));
        assert_eq!(identity.secondary_ids, vec![ContactId(2)]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_merge_demotes_younger_primary() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        reconcile(&mut store, &observation(Some("george@x"), Some("919191"))).unwrap();
        reconcile(&mut store, &observation(Some("biff@x"), Some("717171"))).unwrap();

        let (identity, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("george@x"), Some("717171")))
                .unwrap();
        assert_eq!(
            outcome,
            LinkOutcome::Merged {
                demoted: 1,
                repointed: 0,
                attached: false,
            }
        );
        assert_eq!(identity.primary_id, ContactId(1));
        assert_eq!(identity.secondary_ids, vec![ContactId(2)]);

        let demoted = store.get(ContactId(2)).unwrap();
        assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(demoted.linked_id, Some(ContactId(1)));
    }

    #[test]
    fn test_merge_flattens_chains_from_demoted_primary() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        // Identity A: primary 1 + secondary 2.
        reconcile(&mut store, &observation(Some("a@x"), Some("111"))).unwrap();
        reconcile(&mut store, &observation(Some("a2@x"), Some("111"))).unwrap();
        // Identity B: primary 3 + secondary 4.
        reconcile(&mut store, &observation(Some("b@x"), Some("222"))).unwrap();
        reconcile(&mut store, &observation(Some("b2@x"), Some("222"))).unwrap();

        let (identity, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("a@x"), Some("222"))).unwrap();
        assert_eq!(
            outcome,
            LinkOutcome::Merged {
                demoted: 1,
                repointed: 1,
                attached: false,
            }
        );
        assert_eq!(identity.primary_id, ContactId(1));
        assert_eq!(
            identity.secondary_ids,
            vec![ContactId(2), ContactId(3), ContactId(4)]
        );

        // Depth 1 everywhere: every secondary points straight at the survivor.
        for id in [2, 3, 4] {
            assert_eq!(store.get(ContactId(id)).unwrap().linked_id, Some(ContactId(1)));
        }
    }

    #[test]
    fn test_merge_tie_on_created_at_breaks_by_smaller_id() {
        // Frozen clock: both primaries share created_at.
        let mut store = MemoryStore::with_clock(ManualClock::frozen(500));
        reconcile(&mut store, &observation(Some("a@x"), Some("111"))).unwrap();
        reconcile(&mut store, &observation(Some("b@x"), Some("222"))).unwrap();

        let (identity, _) =
            reconcile_with_outcome(&mut store, &observation(Some("a@x"), Some("222"))).unwrap();
        assert_eq!(identity.primary_id, ContactId(1));
    }

    #[test]
    fn test_merge_of_known_values_attaches_nothing() {
        let mut store = MemoryStore::with_clock(ManualClock::starting_at(0));
        reconcile(&mut store, &observation(Some("a@x"), None)).unwrap();
        reconcile(&mut store, &observation(None, Some("222"))).unwrap();

        // Bridges both identities and carries a novel pairing of known values;
        // nothing new is attached, the graphs just merge.
        let (identity, outcome) =
            reconcile_with_outcome(&mut store, &observation(Some("a@x"), Some("222"))).unwrap();
        assert_eq!(
            outcome,
            LinkOutcome::Merged {
                demoted: 1,
                repointed: 0,
                attached: false,
            }
        );
        assert_eq!(identity.emails, vec!["a@x"]);
        assert_eq!(identity.phones, vec!["222"]);
    }
}
