//! Participants and their identifiers.

use std::{collections::BTreeMap, fmt, hash::Hash};

use serde::{Deserialize, Serialize};

/// Identifier of a participant, unique within one competition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Wrap any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// What the caller provides to enrol a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantSpec {
    /// Unique id.
    pub id: ParticipantId,
    /// Display name used in narration.
    pub name: String,
    /// Initial relationship weights toward other participants, in [-1, 1].
    #[serde(default)]
    pub relationships: BTreeMap<ParticipantId, f64>,
}

impl ParticipantSpec {
    /// A participant without any initial relationship.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            name: name.into(),
            relationships: BTreeMap::new(),
        }
    }

    /// Set an initial relationship weight, clamped to [-1, 1].
    pub fn with_relationship(mut self, other: impl Into<String>, weight: f64) -> Self {
        self.relationships
            .insert(ParticipantId::new(other), weight.clamp(-1.0, 1.0));
        self
    }
}

/// A participant as tracked by the competition record.
///
/// Only the record mutates it: `score` moves through `record_score`, `turn_count`
/// and `last_turn` through `append_exchange`, `active` through `eliminate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Unique id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Cumulative score, the sum of this participant's scored exchanges.
    pub score: f64,
    /// Number of exchanges produced, openings and final words included.
    pub turn_count: u32,
    /// Turn number of this participant's latest exchange.
    pub last_turn: Option<u64>,
    /// Relationship weights toward other participants, in [-1, 1].
    pub relationships: BTreeMap<ParticipantId, f64>,
    /// False once eliminated.
    pub active: bool,
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Participant {
    pub(crate) fn new(spec: ParticipantSpec) -> Participant {
        Participant {
            id: spec.id,
            name: spec.name,
            score: 0.0,
            turn_count: 0,
            last_turn: None,
            relationships: spec.relationships,
            active: true,
        }
    }

    /// Relationship weight toward `other`, 0 when none was ever set.
    pub fn relationship_with(&self, other: &ParticipantId) -> f64 {
        self.relationships.get(other).copied().unwrap_or(0.0)
    }

    pub(crate) fn shift_relationship(&mut self, other: &ParticipantId, delta: f64) {
        let weight = self.relationships.entry(other.clone()).or_insert(0.0);
        *weight = (*weight + delta).clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationships_are_clamped() {
        let spec = ParticipantSpec::new("a", "Ada").with_relationship("b", 3.0);
        let mut participant = Participant::new(spec);
        assert_eq!(participant.relationship_with(&"b".into()), 1.0);

        participant.shift_relationship(&"b".into(), -0.5);
        assert_eq!(participant.relationship_with(&"b".into()), 0.5);

        participant.shift_relationship(&"c".into(), -4.0);
        assert_eq!(participant.relationship_with(&"c".into()), -1.0);
        assert_eq!(participant.relationship_with(&"d".into()), 0.0);
    }

    #[test]
    fn test_equality_uses_id_only() {
        let a = Participant::new(ParticipantSpec::new("a", "Ada"));
        let mut b = Participant::new(ParticipantSpec::new("a", "Someone else"));
        b.score = 4.0;
        assert_eq!(a, b);
    }
}
