//! # Data Model
//!
//! Core data structures for contact identity reconciliation: contact records,
//! link precedence, observations, and the consolidated identity view.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamps are UTC epoch milliseconds.
///
/// Using i64 keeps ordering comparisons exact and avoids floating point issues;
/// ties are broken by [`ContactId`] wherever ordering matters.
pub type Timestamp = i64;

/// Compact identifier for contact records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub u32);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Place of a record in the identity graph.
///
/// Every consolidated identity has exactly one `Primary` root; all other
/// members are `Secondary` and point at it through [`ContactRecord::linked_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkPrecedence::Primary => write!(f, "primary"),
            LinkPrecedence::Secondary => write!(f, "secondary"),
        }
    }
}

/// One observed (email, phone) pairing plus its place in the identity graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    /// Store-assigned identifier, stable for the record's lifetime
    pub id: ContactId,
    /// Observed email, if any
    pub email: Option<String>,
    /// Observed phone number, if any
    pub phone: Option<String>,
    /// Whether this record is the root of its identity or an alias
    pub link_precedence: LinkPrecedence,
    /// Identifier of the governing primary; present iff precedence is secondary
    pub linked_id: Option<ContactId>,
    /// Creation time; establishes the "oldest wins" ordering
    pub created_at: Timestamp,
    /// Last mutation time
    pub updated_at: Timestamp,
    /// Removal marker; removed records are excluded from all queries
    pub deleted_at: Option<Timestamp>,
}

impl ContactRecord {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Whether this record participates in queries.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Ordering key for "oldest wins" decisions.
    pub fn age_key(&self) -> (Timestamp, ContactId) {
        (self.created_at, self.id)
    }

    /// Check whether this record carries exactly the given (email, phone) pair.
    pub fn matches_pair(&self, email: Option<&str>, phone: Option<&str>) -> bool {
        self.email.as_deref() == email && self.phone.as_deref() == phone
    }
}

/// A single identify request: an optional email and an optional phone.
///
/// The HTTP layer guarantees at least one field is present; construction
/// normalizes empty or whitespace-only strings to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Observation {
    /// Create an observation, dropping empty or whitespace-only fields.
    pub fn new(email: Option<String>, phone: Option<String>) -> Self {
        Self {
            email: normalize(email),
            phone: normalize(phone),
        }
    }

    /// True when neither field is present.
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

fn normalize(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})",
            self.email.as_deref().unwrap_or("-"),
            self.phone.as_deref().unwrap_or("-")
        )
    }
}

/// The consolidated view of one identity: one primary id, deduplicated
/// contact values, and the alias record ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedIdentity {
    pub primary_id: ContactId,
    /// Unique emails, the primary's first, then by owning record's creation
    pub emails: Vec<String>,
    /// Unique phones, ordered the same way as emails
    pub phones: Vec<String>,
    /// Secondary record ids, ascending by creation
    pub secondary_ids: Vec<ContactId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_normalization() {
        let obs = Observation::new(Some("  a@x.com ".to_string()), Some("   ".to_string()));
        assert_eq!(obs.email.as_deref(), Some("a@x.com"));
        assert_eq!(obs.phone, None);
        assert!(!obs.is_empty());

        let empty = Observation::new(Some(String::new()), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_precedence_serde() {
        let json = serde_json::to_string(&LinkPrecedence::Primary).unwrap();
        assert_eq!(json, "\"primary\"");

        let precedence: LinkPrecedence = serde_json::from_str("\"secondary\"").unwrap();
        assert_eq!(precedence, LinkPrecedence::Secondary);
    }

    #[test]
    fn test_contact_id_serializes_as_number() {
        let json = serde_json::to_string(&ContactId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_matches_pair() {
        let record = ContactRecord {
            id: ContactId(1),
            email: Some("a@x.com".to_string()),
            phone: None,
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        assert!(record.matches_pair(Some("a@x.com"), None));
        assert!(!record.matches_pair(Some("a@x.com"), Some("123")));
        assert!(!record.matches_pair(None, None));
    }

    #[test]
    fn test_age_key_breaks_ties_by_id() {
        let mut a = ContactRecord {
            id: ContactId(1),
            email: None,
            phone: Some("123".to_string()),
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
            created_at: 50,
            updated_at: 50,
            deleted_at: None,
        };
        let mut b = a.clone();
        b.id = ContactId(2);
        assert!(a.age_key() < b.age_key());

        a.created_at = 60;
        assert!(a.age_key() > b.age_key());
    }
}
