//! Serializable summary of a finished (or aborted) competition.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    competition::{CompetitionRecord, EliminationRecord, Exchange, NarratorInterjection, Phase},
    participant::ParticipantId,
};

/// Final position of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStanding {
    /// 1 for the winner.
    pub rank: usize,
    /// Participant id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Cumulative score.
    pub score: f64,
    /// Exchanges produced, opening and final words included.
    pub turn_count: u32,
    /// Still active at the end.
    pub active: bool,
}

/// Everything worth persisting about one competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionReport {
    /// Competition id.
    pub competition_id: Uuid,
    /// Discussion topic.
    pub topic: String,
    /// Phase reached, `COMPLETE` unless the competition was aborted.
    pub phase: Phase,
    /// Exchanges in turn order, with their scores.
    pub exchanges: Vec<Exchange>,
    /// Active participants by score, then eliminated ones, last eliminated first.
    pub standings: Vec<FinalStanding>,
    /// Elimination history.
    pub eliminations: Vec<EliminationRecord>,
    /// Narrator log.
    pub interjections: Vec<NarratorInterjection>,
    /// Leader of a completed competition.
    pub winner: Option<ParticipantId>,
}

impl CompetitionReport {
    /// Summarize `record`.
    pub fn from_record(record: &CompetitionRecord) -> Self {
        let mut survivors: Vec<_> = record
            .active_participant_ids()
            .iter()
            .filter_map(|id| record.participant(id))
            .collect();
        // stable sort keeps participant order among equal scores
        survivors.sort_by(|a, b| b.score.total_cmp(&a.score));
        let eliminated = record
            .eliminated_participant_ids()
            .iter()
            .rev()
            .filter_map(|id| record.participant(id));

        let standings = survivors
            .into_iter()
            .chain(eliminated)
            .enumerate()
            .map(|(i, p)| FinalStanding {
                rank: i + 1,
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                turn_count: p.turn_count,
                active: p.active,
            })
            .collect();

        Self {
            competition_id: record.competition_id(),
            topic: record.topic().to_string(),
            phase: record.phase(),
            exchanges: record.exchanges().to_vec(),
            standings,
            eliminations: record.eliminations().to_vec(),
            interjections: record.interjections().to_vec(),
            winner: record
                .is_complete()
                .then(|| record.leader().map(|p| p.id.clone()))
                .flatten(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl From<&CompetitionRecord> for CompetitionReport {
    fn from(record: &CompetitionRecord) -> Self {
        Self::from_record(record)
    }
}
