//! Detects discussions that go in circles or run out of ideas.
//!
//! [`ProgressionMonitor::analyze`] looks at the exchange log and reports:
//!
//! - **orbiting**: the mean pairwise cosine similarity of the embeddings of the latest
//!   `orbiting_window` exchanges is above `orbiting_threshold`;
//! - **stagnation**: at least `stagnation_ratio` of the latest `stagnation_window` exchanges
//!   were scored with a novelty in `(0, novelty_floor)`;
//! - the average novelty of the latest `trend_window` exchanges and its trend;
//! - each participant's mean novelty, and which participants are declining.
//!
//! Orbiting takes priority over stagnation, which takes priority over low average novelty
//! when choosing an [`InterventionKind`]. Fewer than 3 exchanges never trigger anything.
//!
//! Embeddings are cached by turn number for the lifetime of the monitor, which lives as long
//! as one competition. Without an embedding service orbiting detection is disabled and
//! reported as such (`orbiting_enabled == false`). Embedding failures never abort: the
//! analysis reports no orbiting signal, and after `embedding_failure_limit` consecutive
//! failures orbiting detection is switched off.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    call_guard::{call_with_timeout, CallError},
    collaborators::EmbeddingService,
    competition::{CompetitionRecord, Exchange},
    configuration::ProgressionConfig,
    error::CompetitionError,
    participant::ParticipantId,
};

/// Fewer exchanges than this and no analysis is attempted.
const MIN_EXCHANGES: usize = 3;

/// Tolerance used when comparing a count against a share of the window.
const RATIO_EPSILON: f64 = 1e-9;

/// Action recommended by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// The narrator should step in before the next turn.
    NarratorPrompt,
    /// The next speaker should change the subject.
    ForcePivot,
}

impl InterventionKind {
    /// Stable name, as used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionKind::NarratorPrompt => "narrator_prompt",
            InterventionKind::ForcePivot => "force_pivot",
        }
    }
}

/// Direction of the average novelty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyTrend {
    /// The latest half is clearly more novel than the earlier half.
    Improving,
    /// The latest half is clearly less novel than the earlier half.
    Declining,
    /// Within the dead band, or too few samples.
    Stable,
}

/// Result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionAnalysis {
    /// False when no embedding service is configured or it was switched off after failures.
    pub orbiting_enabled: bool,
    /// Mean similarity above the threshold.
    pub is_orbiting: bool,
    /// Mean pairwise cosine similarity of the window, reported as computed.
    pub orbiting_score: f64,
    /// Enough low-novelty exchanges in the stagnation window.
    pub is_stagnant: bool,
    /// Number of low-novelty exchanges in the stagnation window.
    pub stagnation_turns: usize,
    /// Average novelty of the scored exchanges in the trend window, `None` if none were scored.
    pub average_novelty: Option<f64>,
    /// Trend of the novelty in the trend window.
    pub novelty_trend: NoveltyTrend,
    /// Mean novelty per participant over its scored exchanges.
    pub per_participant_novelty: BTreeMap<ParticipantId, f64>,
    /// Participants whose recent novelty fell clearly below their earlier mean.
    pub declining_participants: Vec<ParticipantId>,
    /// Whether an intervention is recommended.
    pub should_intervene: bool,
    /// Which intervention, if any.
    pub intervention_kind: Option<InterventionKind>,
}

impl ProgressionAnalysis {
    /// The "nothing to report" analysis.
    pub fn quiet(orbiting_enabled: bool) -> Self {
        Self {
            orbiting_enabled,
            is_orbiting: false,
            orbiting_score: 0.0,
            is_stagnant: false,
            stagnation_turns: 0,
            average_novelty: None,
            novelty_trend: NoveltyTrend::Stable,
            per_participant_novelty: BTreeMap::new(),
            declining_participants: vec![],
            should_intervene: false,
            intervention_kind: None,
        }
    }
}

struct OrbitingSignal {
    enabled: bool,
    score: f64,
}

/// Progression analysis for one competition.
pub struct ProgressionMonitor {
    config: ProgressionConfig,
    embeddings: Option<Arc<dyn EmbeddingService>>,
    embedding_timeout: Duration,
    cache: HashMap<u64, Vec<f32>>,
    consecutive_failures: u32,
}

impl ProgressionMonitor {
    /// Monitor with the given thresholds. `embeddings == None` disables orbiting detection.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::Configuration`] when `config` does not validate.
    pub fn new(
        config: ProgressionConfig,
        embeddings: Option<Arc<dyn EmbeddingService>>,
        embedding_timeout: Duration,
    ) -> Result<Self, CompetitionError> {
        config.validate()?;
        Ok(Self {
            config,
            embeddings,
            embedding_timeout,
            cache: HashMap::new(),
            consecutive_failures: 0,
        })
    }

    /// Whether orbiting detection is currently possible.
    pub fn orbiting_enabled(&self) -> bool {
        self.embeddings.is_some()
    }

    /// Number of cached embeddings.
    pub fn cached_embeddings(&self) -> usize {
        self.cache.len()
    }

    /// Analyze the exchange log of `record`.
    pub fn analyze(&mut self, record: &CompetitionRecord) -> ProgressionAnalysis {
        let exchanges = record.exchanges();
        let mut analysis = ProgressionAnalysis::quiet(self.orbiting_enabled());

        let (average, trend) = self.novelty_trend(exchanges);
        analysis.average_novelty = average;
        analysis.novelty_trend = trend;
        let (per_participant, declining) = self.participant_novelty(exchanges);
        analysis.per_participant_novelty = per_participant;
        analysis.declining_participants = declining;

        if exchanges.len() < MIN_EXCHANGES {
            return analysis;
        }

        let orbiting = self.orbiting(exchanges);
        analysis.orbiting_enabled = orbiting.enabled;
        analysis.orbiting_score = orbiting.score;
        analysis.is_orbiting = orbiting.score.max(0.0) > self.config.orbiting_threshold;

        let (stagnant, stagnation_turns) = self.stagnation(exchanges);
        analysis.is_stagnant = stagnant;
        analysis.stagnation_turns = stagnation_turns;

        analysis.intervention_kind = if analysis.is_orbiting || analysis.is_stagnant {
            Some(InterventionKind::NarratorPrompt)
        } else if average.is_some_and(|a| a < self.config.low_novelty_threshold) {
            Some(InterventionKind::ForcePivot)
        } else {
            None
        };
        analysis.should_intervene = analysis.intervention_kind.is_some();

        debug!(
            orbiting = analysis.is_orbiting,
            orbiting_score = analysis.orbiting_score,
            stagnation_turns,
            ?average,
            ?trend,
            intervention = ?analysis.intervention_kind.map(|k| k.as_str()),
            "progression analysed"
        );
        analysis
    }

    fn orbiting(&mut self, exchanges: &[Exchange]) -> OrbitingSignal {
        let Some(service) = self.embeddings.clone() else {
            return OrbitingSignal {
                enabled: false,
                score: 0.0,
            };
        };

        let start = exchanges
            .len()
            .saturating_sub(self.config.orbiting_window);
        let window = &exchanges[start..];
        self.cache.retain(|turn, _| *turn >= window[0].turn_number);

        let mut vectors = Vec::with_capacity(window.len());
        for exchange in window {
            match self.embedding(&service, exchange) {
                Ok(v) => vectors.push(v),
                Err(e) => {
                    self.consecutive_failures += 1;
                    warn!(
                        turn = exchange.turn_number,
                        failures = self.consecutive_failures,
                        "no orbiting signal this turn: {e}"
                    );
                    if self.consecutive_failures >= self.config.embedding_failure_limit {
                        warn!("too many embedding failures, orbiting detection disabled");
                        self.embeddings = None;
                        self.cache.clear();
                    }
                    return OrbitingSignal {
                        enabled: self.embeddings.is_some(),
                        score: 0.0,
                    };
                }
            }
        }
        self.consecutive_failures = 0;

        OrbitingSignal {
            enabled: true,
            score: mean_pairwise_similarity(&vectors),
        }
    }

    fn embedding(
        &mut self,
        service: &Arc<dyn EmbeddingService>,
        exchange: &Exchange,
    ) -> Result<Vec<f32>, CompetitionError> {
        if let Some(v) = self.cache.get(&exchange.turn_number) {
            return Ok(v.clone());
        }
        let service = Arc::clone(service);
        let text = exchange.content.clone();
        let vector = call_with_timeout(self.embedding_timeout, move || service.embed(&text))
            .map_err(|e| match e {
                CallError::TimedOut(after) => CompetitionError::Timeout {
                    operation: "embedding",
                    after,
                },
                CallError::Failed(source) => CompetitionError::EmbeddingUnavailable(source),
            })?;
        self.cache.insert(exchange.turn_number, vector.clone());
        Ok(vector)
    }

    fn stagnation(&self, exchanges: &[Exchange]) -> (bool, usize) {
        let start = exchanges
            .len()
            .saturating_sub(self.config.stagnation_window);
        let window = &exchanges[start..];
        let stagnant = window
            .iter()
            .filter_map(Exchange::scored_novelty)
            .filter(|n| *n < self.config.novelty_floor)
            .count();
        let required = self.config.stagnation_ratio * window.len() as f64;
        (stagnant as f64 + RATIO_EPSILON >= required, stagnant)
    }

    fn novelty_trend(&self, exchanges: &[Exchange]) -> (Option<f64>, NoveltyTrend) {
        let start = exchanges.len().saturating_sub(self.config.trend_window);
        let samples: Vec<f64> = exchanges[start..]
            .iter()
            .filter_map(Exchange::scored_novelty)
            .collect();
        let average = mean(&samples);
        if samples.len() < 2 {
            return (average, NoveltyTrend::Stable);
        }
        let (first, second) = samples.split_at(samples.len() / 2);
        let delta = mean(second).unwrap_or(0.0) - mean(first).unwrap_or(0.0);
        let trend = if delta > self.config.trend_dead_band {
            NoveltyTrend::Improving
        } else if delta < -self.config.trend_dead_band {
            NoveltyTrend::Declining
        } else {
            NoveltyTrend::Stable
        };
        (average, trend)
    }

    fn participant_novelty(
        &self,
        exchanges: &[Exchange],
    ) -> (BTreeMap<ParticipantId, f64>, Vec<ParticipantId>) {
        let mut by_participant: BTreeMap<&ParticipantId, Vec<f64>> = BTreeMap::new();
        for exchange in exchanges {
            if let Some(n) = exchange.scored_novelty() {
                by_participant
                    .entry(&exchange.participant_id)
                    .or_default()
                    .push(n);
            }
        }

        let mut means = BTreeMap::new();
        let mut declining = vec![];
        for (id, samples) in by_participant {
            if let Some(m) = mean(&samples) {
                means.insert(id.clone(), m);
            }
            if samples.len() < self.config.decline_min_samples {
                continue;
            }
            if let Some(split) = samples.len().checked_sub(self.config.decline_recent) {
                let (earlier, recent) = samples.split_at(split);
                if let (Some(earlier), Some(recent)) = (mean(earlier), mean(recent)) {
                    if recent < earlier - self.config.decline_margin {
                        declining.push(id.clone());
                    }
                }
            }
        }
        (means, declining)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Cosine similarity, 0 for empty, zero or mismatched vectors.
fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, na, nb) = a
        .iter()
        .zip(b)
        .fold((0.0f64, 0.0f64, 0.0f64), |(dot, na, nb), (x, y)| {
            let (x, y) = (f64::from(*x), f64::from(*y));
            (dot + x * y, na + x * x, nb + y * y)
        });
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

fn mean_pairwise_similarity(vectors: &[Vec<f32>]) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            sum += cosine(&vectors[i], &vectors[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        0.0
    } else {
        sum / pairs as f64
    }
}
