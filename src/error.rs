//! Error taxonomy for the competition engine.
//!
//! Construction-time problems ([`CompetitionError::Configuration`]) and caller misuse
//! ([`CompetitionError::UnknownTurn`], [`CompetitionError::DuplicateScore`], ...) are fatal.
//! Collaborator failures are retried by the driver before being surfaced as
//! [`CompetitionError::Generation`], [`CompetitionError::Scoring`] or
//! [`CompetitionError::Timeout`].

use std::time::Duration;

use crate::competition::{CompetitionRecord, Phase};
use crate::participant::ParticipantId;

/// Every error the engine can report.
#[derive(Debug, thiserror::Error)]
pub enum CompetitionError {
    /// Invalid thresholds, weights or participant set. Raised at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The scheduler was asked for a speaker while nobody is active.
    #[error("no active participant to choose from")]
    EmptyPool,

    /// Scoring referenced a turn that does not exist or is not a discussion turn.
    #[error("no scorable exchange recorded for turn {0}")]
    UnknownTurn(u64),

    /// Scoring referenced a turn that was already scored. Scores are write-once.
    #[error("turn {0} has already been scored")]
    DuplicateScore(u64),

    /// An id that is not part of this competition.
    #[error("unknown participant '{0}'")]
    UnknownParticipant(ParticipantId),

    /// The participant exists but has been eliminated.
    #[error("participant '{0}' is no longer active")]
    ParticipantInactive(ParticipantId),

    /// `select_eliminee` was called while nobody is at or below the threshold.
    #[error("no active participant is at or below the elimination threshold")]
    NoEliminationCandidate,

    /// A phase change that the state machine does not allow.
    #[error("illegal phase transition {from} -> {to}")]
    InvalidTransition {
        /// Phase the record was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
    },

    /// The record reached `COMPLETE` and is read-only.
    #[error("competition is complete, record is read-only")]
    Sealed,

    /// The content generator kept failing for a speaker.
    #[error("content generation failed for '{participant}'")]
    Generation {
        /// Speaker whose turn could not be produced.
        participant: ParticipantId,
        /// Last collaborator error.
        #[source]
        source: anyhow::Error,
    },

    /// The judge kept failing for a turn.
    #[error("scoring failed for turn {turn}")]
    Scoring {
        /// Turn left unscored.
        turn: u64,
        /// Last collaborator error.
        #[source]
        source: anyhow::Error,
    },

    /// A blocking collaborator call ran past its deadline on every attempt.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Which call timed out.
        operation: &'static str,
        /// Per-attempt deadline.
        after: Duration,
    },

    /// The embedding service could not produce a vector. Never aborts a competition.
    #[error("embedding service unavailable: {0:#}")]
    EmbeddingUnavailable(anyhow::Error),

    /// Cooperative cancellation was requested between turns.
    #[error("competition cancelled")]
    Cancelled,

    /// Playing the competition panicked. The record keeps everything played so far.
    #[error("competition thread panicked: {0}")]
    Panicked(String),
}

/// Shorthand used across the crate.
pub type Result<T, E = CompetitionError> = std::result::Result<T, E>;

/// A competition that stopped before `COMPLETE`.
///
/// Holds the record as it was when the error happened: every exchange that was
/// scored before the failure keeps its score.
#[derive(Debug, thiserror::Error)]
#[error("competition {} aborted at turn {}: {error}", .record.competition_id, .record.turn_number)]
pub struct Aborted {
    /// Partial record.
    pub record: Box<CompetitionRecord>,
    /// What stopped the competition.
    #[source]
    pub error: CompetitionError,
}
