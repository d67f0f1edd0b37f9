//! Weighting of the judge's per-dimension scores into a single total.
//!
//! The judge reports named dimensions in `[0, 1]`. When it does not also report an aggregate,
//! the total is the weighted mean of the known dimensions, multiplied by
//! [`ScoringWeights::scale`]:
//!
//! ```text
//! total = scale * Σ(wᵢ · dᵢ) / Σ(wᵢ)
//! ```
//!
//! Dimensions the weights do not name are ignored. Dimensions the judge left out count as
//! [`NEUTRAL_SCORE`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CompetitionError, Result};

/// Value used for a weighted dimension the judge did not report.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Name of the dimension copied into [`Exchange::novelty_score`](crate::competition::Exchange).
pub const NOVELTY_DIMENSION: &str = "novelty";

/// Named dimension weights plus the factor mapping the weighted mean to the score range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Dimension name -> weight. Weights must be non-negative and sum to a positive value.
    pub weights: BTreeMap<String, f64>,
    /// Multiplier applied to the weighted mean. `10.0` maps `[0, 1]` onto `[0, 10]`.
    pub scale: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        let weights = ["logic", "rhetoric", NOVELTY_DIMENSION, "engagement"]
            .into_iter()
            .map(|name| (name.to_string(), 1.0))
            .collect();
        Self {
            weights,
            scale: 10.0,
        }
    }
}

impl ScoringWeights {
    /// Weights from `(dimension, weight)` pairs with the default scale.
    pub fn new<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            weights: weights.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::default()
        }
    }

    /// Replace the scale factor.
    #[must_use]
    pub fn with_scale(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    /// Reject negative or non-finite weights, a non-positive weight sum and a non-positive scale.
    pub fn validate(&self) -> Result<()> {
        if let Some((name, w)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(CompetitionError::Configuration(format!(
                "scoring weight '{name}' must be a finite non-negative number, got {w}"
            )));
        }
        let sum: f64 = self.weights.values().sum();
        if sum <= 0.0 {
            return Err(CompetitionError::Configuration(
                "scoring weights must sum to a positive value".to_string(),
            ));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(CompetitionError::Configuration(format!(
                "scoring scale must be positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Keep only the dimensions these weights know about, clamped to `[0, 1]`.
    pub fn known_dimensions(&self, reported: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        reported
            .iter()
            .filter(|(name, _)| self.weights.contains_key(*name))
            .map(|(name, value)| (name.clone(), value.clamp(0.0, 1.0)))
            .collect()
    }

    /// Weighted total of the reported dimensions.
    pub fn aggregate(&self, reported: &BTreeMap<String, f64>) -> f64 {
        let (weighted, total_weight) =
            self.weights
                .iter()
                .fold((0.0, 0.0), |(acc, sum), (name, weight)| {
                    let value = reported
                        .get(name)
                        .map_or(NEUTRAL_SCORE, |v| v.clamp(0.0, 1.0));
                    (acc + weight * value, sum + weight)
                });
        if total_weight <= 0.0 {
            return 0.0;
        }
        self.scale * weighted / total_weight
    }
}
