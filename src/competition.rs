//! The competition record: participants, exchange log, phase and scores.
//!
//! [`CompetitionRecord`] owns all mutable state of one competition and only exposes
//! mutations that keep its invariants:
//!
//! - the k-th exchange has turn number k, exchanges are never reordered or removed;
//! - every participant is either active or eliminated, never both, and an eliminated
//!   participant never speaks again;
//! - a participant's score changes only through [`CompetitionRecord::record_score`],
//!   incrementally, and each turn is scored at most once;
//! - once the phase is [`Phase::Complete`] every mutation fails with
//!   [`CompetitionError::Sealed`].

use std::{collections::BTreeMap, fmt};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{CompetitionError, Result},
    participant::{Participant, ParticipantId, ParticipantSpec},
    scoring::NOVELTY_DIMENSION,
};

/// Phases of a competition.
///
/// ```text
/// Initialization -> OpeningStatements -> FreeDiscussion
/// FreeDiscussion -> EliminationPending -> EliminationAnnouncement -> FinalWords -> FreeDiscussion
/// FreeDiscussion -> Synthesis -> Complete
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Participants are being introduced.
    Initialization,
    /// Every participant gives one unscored opening statement.
    OpeningStatements,
    /// Scheduled, scored turns.
    FreeDiscussion,
    /// An at-risk participant has been selected for removal.
    EliminationPending,
    /// The narrator announces the elimination.
    EliminationAnnouncement,
    /// The eliminee gives a last, unscored remark.
    FinalWords,
    /// Closing synthesis by the narrator.
    Synthesis,
    /// Terminal. The record is read-only.
    Complete,
}

impl Phase {
    /// Whether the state machine allows `self -> to`.
    pub fn can_transition_to(self, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, to),
            (Initialization, OpeningStatements)
                | (OpeningStatements, FreeDiscussion)
                | (FreeDiscussion, EliminationPending)
                | (FreeDiscussion, Synthesis)
                | (EliminationPending, EliminationAnnouncement)
                | (EliminationAnnouncement, FinalWords)
                | (FinalWords, FreeDiscussion)
                | (Synthesis, Complete)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initialization => "INITIALIZATION",
            Phase::OpeningStatements => "OPENING_STATEMENTS",
            Phase::FreeDiscussion => "FREE_DISCUSSION",
            Phase::EliminationPending => "ELIMINATION_PENDING",
            Phase::EliminationAnnouncement => "ELIMINATION_ANNOUNCEMENT",
            Phase::FinalWords => "FINAL_WORDS",
            Phase::Synthesis => "SYNTHESIS",
            Phase::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

/// Why an exchange was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Opening statement, never scored.
    Opening,
    /// Scheduled free-discussion turn, scored.
    Discussion,
    /// Last remark of an eliminated participant, never scored.
    FinalWords,
}

/// One participant's contribution and, once judged, its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// 1-indexed position in the exchange log.
    pub turn_number: u64,
    /// Speaker.
    pub participant_id: ParticipantId,
    /// Opening, discussion or final words.
    pub kind: TurnKind,
    /// Opaque text.
    pub content: String,
    /// Opaque classification reported by the generator.
    pub move_type: String,
    /// Scores the generator expected, kept for bookkeeping only.
    #[serde(default)]
    pub predicted_scores: BTreeMap<String, f64>,
    /// Judge's per-dimension scores, `None` until scored.
    pub dimension_scores: Option<BTreeMap<String, f64>>,
    /// Novelty in `[0, 1]`, `None` until scored or when the judge gave none.
    pub novelty_score: Option<f64>,
    /// Aggregate score credited to the speaker, `None` until scored.
    pub total_score: Option<f64>,
}

impl Exchange {
    /// Whether the judge has scored this exchange.
    pub fn is_scored(&self) -> bool {
        self.total_score.is_some()
    }

    /// Novelty if the exchange was scored with a strictly positive novelty.
    ///
    /// Zero or missing novelty means "not yet scored" for the progression monitor.
    pub fn scored_novelty(&self) -> Option<f64> {
        self.novelty_score.filter(|n| *n > 0.0)
    }
}

/// Trace of one elimination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminationRecord {
    /// Who was removed.
    pub participant_id: ParticipantId,
    /// Display name at the time.
    pub name: String,
    /// Human readable reason.
    pub reason: String,
    /// Cumulative score when removed.
    pub final_score: f64,
    /// `turn_number` of the record when removed.
    pub after_turn: u64,
    /// Wall-clock time of the removal.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// What made the narrator speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationTrigger {
    /// Before the opening statements.
    Introduction,
    /// Regular cadence.
    Periodic,
    /// The discussion is repeating itself.
    Orbiting,
    /// Novelty has stalled.
    Stagnation,
    /// A participant is leaving.
    Elimination,
    /// Closing synthesis.
    Synthesis,
}

/// A narrator text, stored in the record, never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarratorInterjection {
    /// `turn_number` of the record when the narrator spoke.
    pub after_turn: u64,
    /// Cause of the interjection.
    pub trigger: NarrationTrigger,
    /// Text produced by the narrator.
    pub text: String,
}

/// Standing of one participant, as shown to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// Participant id.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Cumulative score.
    pub score: f64,
    /// Exchanges produced so far.
    pub turn_count: u32,
    /// False once eliminated.
    pub active: bool,
}

/// Owned, read-only snapshot handed to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionView {
    /// Competition id.
    pub competition_id: Uuid,
    /// Discussion topic.
    pub topic: String,
    /// Current phase.
    pub phase: Phase,
    /// Number of exchanges so far.
    pub turn_number: u64,
    /// Free-discussion turns played so far.
    pub discussion_turns: u64,
    /// Free-discussion turn budget.
    pub max_turns: u64,
    /// Latest exchanges, oldest first.
    pub recent_exchanges: Vec<Exchange>,
    /// Every participant, in participant order.
    pub standings: Vec<Standing>,
    /// Latest orbiting flag from the progression monitor.
    pub orbiting_detected: bool,
    /// Latest stagnation count from the progression monitor.
    pub stagnation_turns: usize,
}

/// Summary of an opponent from one speaker's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentSummary {
    /// Opponent id.
    pub id: ParticipantId,
    /// Opponent display name.
    pub name: String,
    /// Opponent's cumulative score.
    pub score: f64,
    /// False once eliminated.
    pub active: bool,
    /// The speaker's relationship weight toward this opponent.
    pub relationship: f64,
    /// Opponent's latest content, if any.
    pub last_content: Option<String>,
}

/// All state of one competition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionRecord {
    pub(crate) competition_id: Uuid,
    pub(crate) topic: String,
    pub(crate) phase: Phase,
    pub(crate) turn_number: u64,
    pub(crate) discussion_turns: u64,
    pub(crate) exchanges: Vec<Exchange>,
    pub(crate) participants: BTreeMap<ParticipantId, Participant>,
    pub(crate) participant_order: Vec<ParticipantId>,
    pub(crate) active_participant_ids: Vec<ParticipantId>,
    pub(crate) eliminated_participant_ids: Vec<ParticipantId>,
    pub(crate) eliminations: Vec<EliminationRecord>,
    pub(crate) interjections: Vec<NarratorInterjection>,
    pub(crate) elimination_threshold: f64,
    pub(crate) max_turns: u64,
    pub(crate) orbiting_detected: bool,
    pub(crate) stagnation_turns: usize,
}

impl CompetitionRecord {
    /// Create a record with every participant active, in the given order.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::Configuration`] when fewer than two participants are given or
    /// when an id appears twice.
    pub fn new(
        topic: impl Into<String>,
        participants: Vec<ParticipantSpec>,
        elimination_threshold: f64,
        max_turns: u64,
    ) -> Result<Self> {
        if participants.len() < 2 {
            return Err(CompetitionError::Configuration(format!(
                "a competition needs at least 2 participants, got {}",
                participants.len()
            )));
        }

        let mut map = BTreeMap::new();
        let mut order = Vec::with_capacity(participants.len());
        for spec in participants {
            if map.contains_key(&spec.id) {
                return Err(CompetitionError::Configuration(format!(
                    "duplicate participant id '{}'",
                    spec.id
                )));
            }
            order.push(spec.id.clone());
            map.insert(spec.id.clone(), Participant::new(spec));
        }

        Ok(Self {
            competition_id: Uuid::new_v4(),
            topic: topic.into(),
            phase: Phase::Initialization,
            turn_number: 0,
            discussion_turns: 0,
            exchanges: vec![],
            participants: map,
            active_participant_ids: order.clone(),
            participant_order: order,
            eliminated_participant_ids: vec![],
            eliminations: vec![],
            interjections: vec![],
            elimination_threshold,
            max_turns,
            orbiting_detected: false,
            stagnation_turns: 0,
        })
    }

    /// Competition id.
    pub fn competition_id(&self) -> Uuid {
        self.competition_id
    }

    /// Discussion topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of exchanges recorded so far.
    pub fn turn_number(&self) -> u64 {
        self.turn_number
    }

    /// Number of free-discussion turns played so far.
    pub fn discussion_turns(&self) -> u64 {
        self.discussion_turns
    }

    /// Free-discussion turn budget.
    pub fn max_turns(&self) -> u64 {
        self.max_turns
    }

    /// Cumulative score at or below which a participant is at risk.
    pub fn elimination_threshold(&self) -> f64 {
        self.elimination_threshold
    }

    /// Exchange log in turn order.
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Exchange with the given turn number.
    pub fn exchange(&self, turn_number: u64) -> Option<&Exchange> {
        let index = usize::try_from(turn_number.checked_sub(1)?).ok()?;
        self.exchanges.get(index)
    }

    /// Participant by id.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    /// Every participant in participant order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participant_order
            .iter()
            .filter_map(|id| self.participants.get(id))
    }

    /// Fixed participant order, used for rotation and tie-breaks.
    pub fn participant_order(&self) -> &[ParticipantId] {
        &self.participant_order
    }

    /// Position of `id` in the participant order.
    pub fn order_position(&self, id: &ParticipantId) -> Option<usize> {
        self.participant_order.iter().position(|p| p == id)
    }

    /// Active participants, in participant order.
    pub fn active_participant_ids(&self) -> &[ParticipantId] {
        &self.active_participant_ids
    }

    /// Eliminated participants, in elimination order.
    pub fn eliminated_participant_ids(&self) -> &[ParticipantId] {
        &self.eliminated_participant_ids
    }

    /// Elimination history.
    pub fn eliminations(&self) -> &[EliminationRecord] {
        &self.eliminations
    }

    /// Narrator interjection log.
    pub fn interjections(&self) -> &[NarratorInterjection] {
        &self.interjections
    }

    /// Latest orbiting flag written from the progression monitor.
    pub fn orbiting_detected(&self) -> bool {
        self.orbiting_detected
    }

    /// Latest stagnation count written from the progression monitor.
    pub fn stagnation_turns(&self) -> usize {
        self.stagnation_turns
    }

    /// Whether the competition reached `COMPLETE`.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Termination predicate: turn budget spent or at most one participant left.
    pub fn should_terminate(&self) -> bool {
        self.discussion_turns >= self.max_turns || self.active_participant_ids.len() <= 1
    }

    /// Last remaining participant, or the best scorer among the active ones.
    ///
    /// Ties go to the earliest participant in participant order.
    pub fn leader(&self) -> Option<&Participant> {
        self.active_participant_ids
            .iter()
            .filter_map(|id| self.participants.get(id))
            .fold(None, |best: Option<&Participant>, p| match best {
                Some(b) if b.score >= p.score => Some(b),
                _ => Some(p),
            })
    }

    /// Sum of the scored exchanges of `id`, recomputed from history. For audits and tests.
    pub fn audit_score(&self, id: &ParticipantId) -> f64 {
        self.exchanges
            .iter()
            .filter(|e| &e.participant_id == id)
            .filter_map(|e| e.total_score)
            .sum()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_complete() {
            return Err(CompetitionError::Sealed);
        }
        Ok(())
    }

    fn ensure_active(&self, id: &ParticipantId) -> Result<()> {
        match self.participants.get(id) {
            None => Err(CompetitionError::UnknownParticipant(id.clone())),
            Some(p) if !p.active => Err(CompetitionError::ParticipantInactive(id.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Move to phase `to`.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::InvalidTransition`] if the state machine has no such edge,
    /// [`CompetitionError::Sealed`] from `COMPLETE`.
    pub fn set_phase(&mut self, to: Phase) -> Result<()> {
        self.ensure_open()?;
        if !self.phase.can_transition_to(to) {
            return Err(CompetitionError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!(from = %self.phase, %to, "phase transition");
        self.phase = to;
        Ok(())
    }

    /// Append an unscored exchange for an active participant and return its turn number.
    pub fn append_exchange(
        &mut self,
        participant_id: &ParticipantId,
        kind: TurnKind,
        content: String,
        move_type: String,
        predicted_scores: BTreeMap<String, f64>,
    ) -> Result<u64> {
        self.ensure_open()?;
        self.ensure_active(participant_id)?;

        let turn_number = self.turn_number + 1;
        self.exchanges.push(Exchange {
            turn_number,
            participant_id: participant_id.clone(),
            kind,
            content,
            move_type,
            predicted_scores,
            dimension_scores: None,
            novelty_score: None,
            total_score: None,
        });
        self.turn_number = turn_number;
        if kind == TurnKind::Discussion {
            self.discussion_turns += 1;
        }

        if let Some(p) = self.participants.get_mut(participant_id) {
            p.turn_count += 1;
            p.last_turn = Some(turn_number);
        }
        Ok(turn_number)
    }

    /// Score the exchange of `turn_number` and credit `total_score` to its speaker.
    ///
    /// The `novelty` dimension, when present, becomes the exchange's novelty score. Opening
    /// statements and final words stay unscored.
    ///
    /// # Errors
    ///
    /// - [`CompetitionError::UnknownTurn`] if no such exchange exists or it is not a
    ///   [`TurnKind::Discussion`] turn;
    /// - [`CompetitionError::DuplicateScore`] if it was already scored (the first score is kept);
    /// - [`CompetitionError::Scoring`] if `total_score` is not finite.
    pub fn record_score(
        &mut self,
        turn_number: u64,
        dimension_scores: BTreeMap<String, f64>,
        total_score: f64,
    ) -> Result<()> {
        self.ensure_open()?;
        if !total_score.is_finite() {
            return Err(CompetitionError::Scoring {
                turn: turn_number,
                source: anyhow!("total score {total_score} is not finite"),
            });
        }
        let index = turn_number
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.exchanges.len())
            .ok_or(CompetitionError::UnknownTurn(turn_number))?;

        let exchange = &mut self.exchanges[index];
        if exchange.kind != TurnKind::Discussion {
            return Err(CompetitionError::UnknownTurn(turn_number));
        }
        if exchange.is_scored() {
            return Err(CompetitionError::DuplicateScore(turn_number));
        }
        exchange.novelty_score = dimension_scores
            .get(NOVELTY_DIMENSION)
            .map(|n| n.clamp(0.0, 1.0));
        exchange.dimension_scores = Some(dimension_scores);
        exchange.total_score = Some(total_score);

        let speaker = exchange.participant_id.clone();
        let participant = self
            .participants
            .get_mut(&speaker)
            .ok_or(CompetitionError::UnknownParticipant(speaker))?;
        participant.score += total_score;
        Ok(())
    }

    /// Move `id` from the active to the eliminated set and log why.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::ParticipantInactive`] if `id` was already eliminated, in which case
    /// nothing changes.
    pub fn eliminate(
        &mut self,
        id: &ParticipantId,
        reason: impl Into<String>,
    ) -> Result<&EliminationRecord> {
        self.ensure_open()?;
        self.ensure_active(id)?;

        self.active_participant_ids.retain(|p| p != id);
        self.eliminated_participant_ids.push(id.clone());

        let participant = self
            .participants
            .get_mut(id)
            .ok_or_else(|| CompetitionError::UnknownParticipant(id.clone()))?;
        participant.active = false;

        let record = EliminationRecord {
            participant_id: id.clone(),
            name: participant.name.clone(),
            reason: reason.into(),
            final_score: participant.score,
            after_turn: self.turn_number,
            timestamp: OffsetDateTime::now_utc(),
        };
        info!(
            participant = %id,
            score = record.final_score,
            remaining = self.active_participant_ids.len(),
            "participant eliminated"
        );
        self.eliminations.push(record);
        Ok(&self.eliminations[self.eliminations.len() - 1])
    }

    /// Store the progression monitor's latest flags.
    pub(crate) fn set_progression_flags(&mut self, orbiting: bool, stagnation_turns: usize) {
        self.orbiting_detected = orbiting;
        self.stagnation_turns = stagnation_turns;
    }

    /// Log a narrator text.
    pub fn add_interjection(&mut self, trigger: NarrationTrigger, text: String) -> Result<()> {
        self.ensure_open()?;
        self.interjections.push(NarratorInterjection {
            after_turn: self.turn_number,
            trigger,
            text,
        });
        Ok(())
    }

    /// Shift `from`'s relationship toward `to` by `delta`, clamped to [-1, 1].
    pub fn shift_relationship(
        &mut self,
        from: &ParticipantId,
        to: &ParticipantId,
        delta: f64,
    ) -> Result<()> {
        self.ensure_open()?;
        if from == to || !self.participants.contains_key(to) {
            return Err(CompetitionError::UnknownParticipant(to.clone()));
        }
        self.participants
            .get_mut(from)
            .ok_or_else(|| CompetitionError::UnknownParticipant(from.clone()))?
            .shift_relationship(to, delta);
        Ok(())
    }

    /// Snapshot for collaborators, with the `window` latest exchanges.
    pub fn view(&self, window: usize) -> CompetitionView {
        let start = self.exchanges.len().saturating_sub(window);
        CompetitionView {
            competition_id: self.competition_id,
            topic: self.topic.clone(),
            phase: self.phase,
            turn_number: self.turn_number,
            discussion_turns: self.discussion_turns,
            max_turns: self.max_turns,
            recent_exchanges: self.exchanges[start..].to_vec(),
            standings: self
                .participants()
                .map(|p| Standing {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    score: p.score,
                    turn_count: p.turn_count,
                    active: p.active,
                })
                .collect(),
            orbiting_detected: self.orbiting_detected,
            stagnation_turns: self.stagnation_turns,
        }
    }

    /// Every other participant as seen by `speaker`.
    pub fn opponent_summaries(&self, speaker: &ParticipantId) -> Vec<OpponentSummary> {
        let me = self.participants.get(speaker);
        self.participants()
            .filter(|p| &p.id != speaker)
            .map(|p| OpponentSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                active: p.active,
                relationship: me.map_or(0.0, |m| m.relationship_with(&p.id)),
                last_content: p
                    .last_turn
                    .and_then(|t| self.exchange(t))
                    .map(|e| e.content.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> CompetitionRecord {
        let specs = (0..n)
            .map(|i| ParticipantSpec::new(format!("p{i}"), format!("Player {i}")))
            .collect();
        CompetitionRecord::new("topic", specs, -10.0, 10).unwrap()
    }

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s)
    }

    fn speak(record: &mut CompetitionRecord, who: &str) -> u64 {
        record
            .append_exchange(
                &id(who),
                TurnKind::Discussion,
                format!("{who} speaks"),
                "argue".into(),
                BTreeMap::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_construction_errors() {
        let one = vec![ParticipantSpec::new("a", "A")];
        assert!(matches!(
            CompetitionRecord::new("t", one, -10.0, 5),
            Err(CompetitionError::Configuration(_))
        ));
        let dup = vec![ParticipantSpec::new("a", "A"), ParticipantSpec::new("a", "B")];
        assert!(matches!(
            CompetitionRecord::new("t", dup, -10.0, 5),
            Err(CompetitionError::Configuration(_))
        ));
    }

    #[test]
    fn test_turn_numbers_are_gapless() {
        let mut r = record(3);
        let turns: Vec<u64> = ["p0", "p1", "p2", "p0", "p1"]
            .iter()
            .map(|p| speak(&mut r, p))
            .collect();
        assert_eq!(turns, vec![1, 2, 3, 4, 5]);
        for (k, e) in r.exchanges().iter().enumerate() {
            assert_eq!(e.turn_number, k as u64 + 1);
        }
        assert_eq!(r.turn_number(), 5);
        assert_eq!(r.participant(&id("p0")).unwrap().last_turn, Some(4));
        assert_eq!(r.participant(&id("p0")).unwrap().turn_count, 2);
    }

    #[test]
    fn test_cumulative_score_matches_history() {
        let mut r = record(2);
        let scores = [1.5, -4.0, 2.25, 0.0];
        for s in scores {
            let t = speak(&mut r, "p0");
            r.record_score(t, BTreeMap::new(), s).unwrap();
        }
        let p0 = r.participant(&id("p0")).unwrap();
        assert_eq!(p0.score, scores.iter().sum::<f64>());
        assert_eq!(p0.score, r.audit_score(&id("p0")));
    }

    #[test]
    fn test_duplicate_and_unknown_scores() {
        let mut r = record(2);
        let t = speak(&mut r, "p1");
        let dims: BTreeMap<String, f64> = [("novelty".to_string(), 0.4)].into();
        r.record_score(t, dims, 3.0).unwrap();

        let err = r.record_score(t, BTreeMap::new(), 9.0).unwrap_err();
        assert!(matches!(err, CompetitionError::DuplicateScore(1)));
        assert_eq!(r.exchange(t).unwrap().total_score, Some(3.0));
        assert_eq!(r.exchange(t).unwrap().novelty_score, Some(0.4));
        assert_eq!(r.participant(&id("p1")).unwrap().score, 3.0);

        assert!(matches!(
            r.record_score(0, BTreeMap::new(), 1.0),
            Err(CompetitionError::UnknownTurn(0))
        ));
        assert!(matches!(
            r.record_score(7, BTreeMap::new(), 1.0),
            Err(CompetitionError::UnknownTurn(7))
        ));
        assert!(r.record_score(t, BTreeMap::new(), f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_only_discussion_turns_are_scored() {
        let mut r = record(2);
        for (who, kind) in [("p0", TurnKind::Opening), ("p1", TurnKind::FinalWords)] {
            let t = r
                .append_exchange(&id(who), kind, "hi".into(), "open".into(), BTreeMap::new())
                .unwrap();
            assert!(matches!(
                r.record_score(t, BTreeMap::new(), 4.0),
                Err(CompetitionError::UnknownTurn(n)) if n == t
            ));
            assert!(!r.exchange(t).unwrap().is_scored());
        }
        assert_eq!(r.participant(&id("p0")).unwrap().score, 0.0);
        assert_eq!(r.participant(&id("p1")).unwrap().score, 0.0);
    }

    #[test]
    fn test_elimination_moves_between_sets_once() {
        let mut r = record(3);
        r.eliminate(&id("p1"), "too quiet").unwrap();
        assert!(matches!(
            r.eliminate(&id("p1"), "again"),
            Err(CompetitionError::ParticipantInactive(_))
        ));
        assert_eq!(r.active_participant_ids(), &[id("p0"), id("p2")]);
        assert_eq!(r.eliminated_participant_ids(), &[id("p1")]);
        assert_eq!(r.eliminations().len(), 1);
        assert!(!r.participant(&id("p1")).unwrap().active);

        let mut all: Vec<_> = r
            .active_participant_ids()
            .iter()
            .chain(r.eliminated_participant_ids())
            .cloned()
            .collect();
        all.sort();
        assert_eq!(all, r.participant_order().to_vec());
    }

    #[test]
    fn test_eliminated_participant_cannot_speak() {
        let mut r = record(2);
        r.eliminate(&id("p0"), "out").unwrap();
        let err = r
            .append_exchange(
                &id("p0"),
                TurnKind::Discussion,
                "hello?".into(),
                "plea".into(),
                BTreeMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CompetitionError::ParticipantInactive(_)));
        assert!(r.exchanges().is_empty());
    }

    #[test]
    fn test_phase_machine_and_sealing() {
        let mut r = record(2);
        assert!(matches!(
            r.set_phase(Phase::FreeDiscussion),
            Err(CompetitionError::InvalidTransition { .. })
        ));
        for phase in [
            Phase::OpeningStatements,
            Phase::FreeDiscussion,
            Phase::EliminationPending,
            Phase::EliminationAnnouncement,
            Phase::FinalWords,
            Phase::FreeDiscussion,
            Phase::Synthesis,
            Phase::Complete,
        ] {
            r.set_phase(phase).unwrap();
        }
        assert!(r.is_complete());
        assert!(matches!(
            r.set_phase(Phase::FreeDiscussion),
            Err(CompetitionError::Sealed)
        ));
        assert!(matches!(
            r.add_interjection(NarrationTrigger::Periodic, "late".into()),
            Err(CompetitionError::Sealed)
        ));
    }

    #[test]
    fn test_termination_predicate() {
        let mut r = record(3);
        assert!(!r.should_terminate());
        r.eliminate(&id("p0"), "x").unwrap();
        assert!(!r.should_terminate());
        r.eliminate(&id("p1"), "y").unwrap();
        assert!(r.should_terminate());
        assert_eq!(r.leader().unwrap().id, id("p2"));
    }

    #[test]
    fn test_opponent_summaries_carry_relationships() {
        let specs = vec![
            ParticipantSpec::new("a", "A").with_relationship("b", -0.5),
            ParticipantSpec::new("b", "B"),
        ];
        let mut r = CompetitionRecord::new("t", specs, -10.0, 5).unwrap();
        speak(&mut r, "b");
        r.shift_relationship(&id("a"), &id("b"), -0.25).unwrap();

        let summaries = r.opponent_summaries(&id("a"));
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].relationship, -0.75);
        assert_eq!(summaries[0].last_content.as_deref(), Some("b speaks"));
        assert!(r.shift_relationship(&id("a"), &id("a"), 0.1).is_err());
    }
}
