//! When and whom to eliminate.
//!
//! The driver asks its [`EliminationPolicy`] after every discussion turn. The default
//! [`ThresholdPolicy`] removes the lowest scorer once someone's cumulative score has fallen
//! to the elimination threshold.

use tracing::debug;

use crate::{
    competition::CompetitionRecord,
    error::{CompetitionError, Result},
    participant::{Participant, ParticipantId},
};

/// Decides eliminations from the state of a record.
pub trait EliminationPolicy: Send + Sync {
    /// Whether someone must be eliminated now.
    ///
    /// Must return `false` when one participant or fewer is active.
    fn should_eliminate(&self, record: &CompetitionRecord) -> bool;

    /// Who must be eliminated.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::NoEliminationCandidate`] when nobody qualifies.
    fn select_eliminee(&self, record: &CompetitionRecord) -> Result<ParticipantId>;

    /// Human readable reason stored in the elimination record.
    fn reason(&self, record: &CompetitionRecord, eliminee: &ParticipantId) -> String {
        let score = record.participant(eliminee).map_or(0.0, |p| p.score);
        format!(
            "score {score:.2} at or below threshold {:.2}",
            record.elimination_threshold()
        )
    }
}

/// Eliminates the lowest scorer among participants at or below the threshold.
///
/// Ties go to the earliest participant in participant order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy;

impl ThresholdPolicy {
    fn candidates<'a>(record: &'a CompetitionRecord) -> impl Iterator<Item = &'a Participant> {
        let threshold = record.elimination_threshold();
        record
            .active_participant_ids()
            .iter()
            .filter_map(|id| record.participant(id))
            .filter(move |p| p.score <= threshold)
    }
}

impl EliminationPolicy for ThresholdPolicy {
    fn should_eliminate(&self, record: &CompetitionRecord) -> bool {
        record.active_participant_ids().len() > 1 && Self::candidates(record).next().is_some()
    }

    fn select_eliminee(&self, record: &CompetitionRecord) -> Result<ParticipantId> {
        if record.active_participant_ids().len() <= 1 {
            return Err(CompetitionError::NoEliminationCandidate);
        }
        // active ids are in participant order, so the first minimum wins ties
        let lowest = Self::candidates(record).fold(None, |lowest: Option<&Participant>, p| {
            match lowest {
                Some(l) if l.score <= p.score => Some(l),
                _ => Some(p),
            }
        });
        let lowest = lowest.ok_or(CompetitionError::NoEliminationCandidate)?;
        debug!(participant = %lowest.id, score = lowest.score, "elimination candidate");
        Ok(lowest.id.clone())
    }
}
