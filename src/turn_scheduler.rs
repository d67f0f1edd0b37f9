//! Chooses who speaks next.
//!
//! Every active participant gets an urgency score:
//!
//! ```text
//! urgency = fairness_weight   * fairness     // in [0, 1]
//!         + tension_weight    * proximity    // in [0, 1]
//!         + randomness_weight * U[0, 1)
//! ```
//!
//! - `fairness` averages how long the participant has been silent (relative to the longest
//!   silence) and how few turns it took (relative to the most talkative).
//! - `proximity` rises from 0 to 1 as the cumulative score falls from
//!   `threshold + tension_band` down to the elimination threshold.
//!
//! The highest urgency wins; ties go to the earliest participant in participant order.
//! Everything is derived from the record, so selection is a pure function of the record
//! and the random source.

use rand::Rng;
use tracing::trace;

use crate::{
    competition::CompetitionRecord,
    configuration::SchedulerConfig,
    error::{CompetitionError, Result},
    participant::{Participant, ParticipantId},
};

/// Urgency breakdown of one candidate, mostly useful for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Urgency {
    /// Candidate.
    pub participant_id: ParticipantId,
    /// Recency and turn-count term, in [0, 1].
    pub fairness: f64,
    /// Closeness to the elimination threshold, in [0, 1].
    pub proximity: f64,
    /// Random draw, in [0, 1).
    pub noise: f64,
    /// Weighted sum.
    pub total: f64,
}

/// Stateless speaker selection.
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    config: SchedulerConfig,
}

impl TurnScheduler {
    /// Scheduler with the given weights.
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Pick the next speaker among the active participants.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::EmptyPool`] when nobody is active.
    pub fn select_next_speaker<R: Rng>(
        &self,
        record: &CompetitionRecord,
        rng: &mut R,
    ) -> Result<ParticipantId> {
        let urgencies = self.urgencies(record, rng);
        let mut best: Option<&Urgency> = None;
        for candidate in &urgencies {
            // strict comparison keeps the earliest in participant order on ties
            match best {
                Some(b) if candidate.total <= b.total => {}
                _ => best = Some(candidate),
            }
        }
        let chosen = best.ok_or(CompetitionError::EmptyPool)?;
        trace!(?urgencies, chosen = %chosen.participant_id, "speaker selected");
        Ok(chosen.participant_id.clone())
    }

    /// Urgency of every active participant, in participant order.
    pub fn urgencies<R: Rng>(&self, record: &CompetitionRecord, rng: &mut R) -> Vec<Urgency> {
        let active: Vec<&Participant> = record
            .active_participant_ids()
            .iter()
            .filter_map(|id| record.participant(id))
            .collect();

        let now = record.turn_number();
        let silence = |p: &Participant| match p.last_turn {
            Some(t) => now.saturating_sub(t),
            None => now + 1,
        };
        let longest_silence = active.iter().map(|p| silence(p)).max().unwrap_or(0);
        let most_turns = active.iter().map(|p| p.turn_count).max().unwrap_or(0);

        let threshold = record.elimination_threshold();
        let band = self.config.tension_band;

        active
            .into_iter()
            .map(|p| {
                let recency = ratio(silence(p) as f64, longest_silence as f64);
                let quietness = if most_turns == 0 {
                    0.0
                } else {
                    1.0 - p.turn_count as f64 / most_turns as f64
                };
                let fairness = (recency + quietness) / 2.0;

                let distance = p.score - threshold;
                let proximity = if distance <= 0.0 {
                    1.0
                } else {
                    (1.0 - distance / band).max(0.0)
                };

                let noise: f64 = rng.random();
                let total = self.config.fairness_weight * fairness
                    + self.config.tension_weight * proximity
                    + self.config.randomness_weight * noise;
                Urgency {
                    participant_id: p.id.clone(),
                    fairness,
                    proximity,
                    noise,
                    total,
                }
            })
            .collect()
    }
}

fn ratio(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        0.0
    } else {
        value / max
    }
}
