//! Configuration for a competition.
//!
//! A [`CompetitionConfig`] gathers every threshold and weight the engine uses. It can be
//! created programmatically with [`CompetitionConfig::new()`] and the `with_*` methods, read
//! from environment variables with [`CompetitionConfig::from_env()`], or deserialized (every
//! field has a default). It is checked by [`CompetitionConfig::validate()`] before a driver is
//! built; an out-of-range value is a [`CompetitionError::Configuration`].
//!
//! # Environment Variables
//!
//! Values that fail to parse are ignored and the default is kept.
//!
//! - `ARENA_MAX_TURNS`: Free-discussion turn budget (default: `30`)
//! - `ARENA_ELIMINATION_THRESHOLD`: Cumulative score at or below which a participant is at risk (default: `-10`)
//! - `ARENA_NARRATOR_CADENCE`: Narrator comment every N discussion turns, `0` disables (default: `5`)
//! - `ARENA_ORBITING_THRESHOLD`: Mean similarity above which discussion is orbiting (default: `0.75`)
//! - `ARENA_NOVELTY_FLOOR`: Novelty below which an exchange counts as stagnant (default: `0.3`)
//! - `ARENA_RANDOMNESS_WEIGHT`: Weight of the scheduler's random perturbation (default: `0.2`)
//! - `ARENA_GENERATION_TIMEOUT_SECS`: Deadline for one generation attempt (default: `60`)
//! - `ARENA_LOG_DIR`: Write logs to a file in this directory (default: unset)

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    call_guard::RetryPolicy,
    error::{CompetitionError, Result},
    scoring::ScoringWeights,
};

/// Weights of the three urgency components used by the turn scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Weight of the fairness term (recency and turn count), itself in `[0, 1]`.
    pub fairness_weight: f64,
    /// Weight of the uniform random perturbation in `[0, 1)`.
    pub randomness_weight: f64,
    /// Weight of the dramatic-tension boost for participants close to elimination.
    pub tension_weight: f64,
    /// Score distance above the elimination threshold within which tension starts rising.
    pub tension_band: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fairness_weight: 1.0,
            randomness_weight: 0.2,
            tension_weight: 0.5,
            tension_band: 10.0,
        }
    }
}

/// Thresholds used by the progression monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// Number of latest exchanges compared for orbiting.
    pub orbiting_window: usize,
    /// Mean pairwise similarity above which the discussion is orbiting.
    pub orbiting_threshold: f64,
    /// Number of latest exchanges inspected for stagnation.
    pub stagnation_window: usize,
    /// Novelty below which a scored exchange is stagnant.
    pub novelty_floor: f64,
    /// Share of the stagnation window that must be stagnant.
    pub stagnation_ratio: f64,
    /// Number of latest exchanges used for the novelty average and trend.
    pub trend_window: usize,
    /// Half-difference below which the trend is stable.
    pub trend_dead_band: f64,
    /// How far a participant's recent novelty must fall below its earlier mean to be declining.
    pub decline_margin: f64,
    /// Scored exchanges a participant needs before decline is evaluated.
    pub decline_min_samples: usize,
    /// Number of latest exchanges forming a participant's "recent" sample.
    pub decline_recent: usize,
    /// Average novelty below which a pivot is forced.
    pub low_novelty_threshold: f64,
    /// Consecutive embedding failures after which orbiting detection is switched off.
    pub embedding_failure_limit: u32,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            orbiting_window: 5,
            orbiting_threshold: 0.75,
            stagnation_window: 8,
            novelty_floor: 0.3,
            stagnation_ratio: 0.7,
            trend_window: 10,
            trend_dead_band: 0.1,
            decline_margin: 0.15,
            decline_min_samples: 6,
            decline_recent: 3,
            low_novelty_threshold: 0.25,
            embedding_failure_limit: 3,
        }
    }
}

impl ProgressionConfig {
    /// Check every threshold is in `[0, 1]` and every window is large enough.
    ///
    /// # Errors
    ///
    /// Returns [`CompetitionError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("progression.orbiting_threshold", self.orbiting_threshold),
            ("progression.novelty_floor", self.novelty_floor),
            ("progression.stagnation_ratio", self.stagnation_ratio),
            ("progression.trend_dead_band", self.trend_dead_band),
            ("progression.decline_margin", self.decline_margin),
            ("progression.low_novelty_threshold", self.low_novelty_threshold),
        ] {
            unit_interval(name, value)?;
        }
        for (name, value) in [
            ("progression.orbiting_window", self.orbiting_window),
            ("progression.stagnation_window", self.stagnation_window),
            ("progression.trend_window", self.trend_window),
            ("progression.decline_recent", self.decline_recent),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }
        if self.orbiting_window < 2 {
            return invalid("progression.orbiting_window must cover at least 2 exchanges".into());
        }
        if self.decline_min_samples <= self.decline_recent {
            return invalid(format!(
                "progression.decline_min_samples ({}) must exceed progression.decline_recent ({})",
                self.decline_min_samples, self.decline_recent
            ));
        }
        Ok(())
    }
}

/// Deadlines and retry policy for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallLimits {
    /// Deadline of one content generation attempt.
    pub generation_timeout: Duration,
    /// Deadline of one scoring attempt.
    pub scoring_timeout: Duration,
    /// Deadline of one embedding call.
    pub embedding_timeout: Duration,
    /// Deadline of one narrator call.
    pub narration_timeout: Duration,
    /// Retries for generation and scoring.
    pub retry: RetryPolicy,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            scoring_timeout: Duration::from_secs(30),
            embedding_timeout: Duration::from_secs(10),
            narration_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Full configuration of one competition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionConfig {
    /// Turn scheduler weights.
    pub scheduler: SchedulerConfig,
    /// Progression monitor thresholds.
    pub progression: ProgressionConfig,
    /// Scoring dimension weights.
    pub scoring: ScoringWeights,
    /// Collaborator deadlines and retries.
    pub limits: CallLimits,
    /// Cumulative score at or below which a participant is at risk.
    pub elimination_threshold: f64,
    /// Free-discussion turn budget.
    pub max_turns: u64,
    /// Periodic narrator comment every N discussion turns. `0` disables periodic comments.
    pub narrator_cadence: u64,
    /// Number of latest exchanges included in collaborator views.
    pub context_window: usize,
    /// When set, logs go to a timestamped file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for CompetitionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CompetitionConfig {
    /// Create a configuration with default parameters.
    ///
    /// By default:
    /// - At most 30 free-discussion turns are played.
    /// - A participant is at risk at a cumulative score of -10 or below.
    /// - The narrator comments every 5 discussion turns.
    /// - Collaborators see the 10 latest exchanges.
    /// - Logging to file is disabled.
    pub fn new() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            progression: ProgressionConfig::default(),
            scoring: ScoringWeights::default(),
            limits: CallLimits::default(),
            elimination_threshold: -10.0,
            max_turns: 30,
            narrator_cadence: 5,
            context_window: 10,
            log_dir: None,
        }
    }

    /// Create a configuration from defaults overridden by `ARENA_*` environment variables.
    ///
    /// See the module documentation for the recognized variables.
    pub fn from_env() -> Self {
        fn get_env<T: FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.trim().parse().ok()
        }

        let mut config = Self::new();
        if let Some(v) = get_env("ARENA_MAX_TURNS") {
            config.max_turns = v;
        }
        if let Some(v) = get_env("ARENA_ELIMINATION_THRESHOLD") {
            config.elimination_threshold = v;
        }
        if let Some(v) = get_env("ARENA_NARRATOR_CADENCE") {
            config.narrator_cadence = v;
        }
        if let Some(v) = get_env("ARENA_ORBITING_THRESHOLD") {
            config.progression.orbiting_threshold = v;
        }
        if let Some(v) = get_env("ARENA_NOVELTY_FLOOR") {
            config.progression.novelty_floor = v;
        }
        if let Some(v) = get_env("ARENA_RANDOMNESS_WEIGHT") {
            config.scheduler.randomness_weight = v;
        }
        if let Some(v) = get_env::<u64>("ARENA_GENERATION_TIMEOUT_SECS") {
            config.limits.generation_timeout = Duration::from_secs(v);
        }
        if let Ok(dir) = env::var("ARENA_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        config
    }

    /// Set the free-discussion turn budget.
    pub fn with_max_turns(mut self, value: u64) -> Self {
        self.max_turns = value;
        self
    }

    /// Set the elimination threshold.
    pub fn with_elimination_threshold(mut self, value: f64) -> Self {
        self.elimination_threshold = value;
        self
    }

    /// Set the narrator cadence. `0` disables periodic comments.
    pub fn with_narrator_cadence(mut self, value: u64) -> Self {
        self.narrator_cadence = value;
        self
    }

    /// Replace the scheduler weights.
    pub fn with_scheduler(mut self, value: SchedulerConfig) -> Self {
        self.scheduler = value;
        self
    }

    /// Replace the progression thresholds.
    pub fn with_progression(mut self, value: ProgressionConfig) -> Self {
        self.progression = value;
        self
    }

    /// Replace the scoring weights.
    pub fn with_scoring(mut self, value: ScoringWeights) -> Self {
        self.scoring = value;
        self
    }

    /// Replace the collaborator deadlines and retries.
    pub fn with_limits(mut self, value: CallLimits) -> Self {
        self.limits = value;
        self
    }

    /// Enable logging to a timestamped file in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`CompetitionError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        for (name, value) in [
            ("scheduler.fairness_weight", s.fairness_weight),
            ("scheduler.randomness_weight", s.randomness_weight),
            ("scheduler.tension_weight", s.tension_weight),
        ] {
            non_negative(name, value)?;
        }
        if !s.tension_band.is_finite() || s.tension_band <= 0.0 {
            return invalid(format!(
                "scheduler.tension_band must be positive, got {}",
                s.tension_band
            ));
        }

        self.progression.validate()?;
        self.scoring.validate()?;

        let l = &self.limits;
        for (name, value) in [
            ("limits.generation_timeout", l.generation_timeout),
            ("limits.scoring_timeout", l.scoring_timeout),
            ("limits.embedding_timeout", l.embedding_timeout),
            ("limits.narration_timeout", l.narration_timeout),
        ] {
            if value.is_zero() {
                return invalid(format!("{name} must be non-zero"));
            }
        }
        if l.retry.max_attempts == 0 {
            return invalid("limits.retry.max_attempts must be at least 1".into());
        }
        if !l.retry.backoff_multiplier.is_finite() || l.retry.backoff_multiplier < 1.0 {
            return invalid(format!(
                "limits.retry.backoff_multiplier must be >= 1, got {}",
                l.retry.backoff_multiplier
            ));
        }

        if !self.elimination_threshold.is_finite() {
            return invalid("elimination_threshold must be finite".into());
        }
        if self.max_turns == 0 {
            return invalid("max_turns must be at least 1".into());
        }
        if self.context_window == 0 {
            return invalid("context_window must be at least 1".into());
        }
        Ok(())
    }
}

fn invalid(message: String) -> Result<()> {
    Err(CompetitionError::Configuration(message))
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return invalid(format!("{name} must be a non-negative number, got {value}"));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return invalid(format!("{name} must lie in [0, 1], got {value}"));
    }
    Ok(())
}
