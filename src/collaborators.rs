//! Traits implemented by the external services the engine relies on.
//!
//! The engine never produces content, scores or embeddings itself. It calls:
//! - a [`ContentGenerator`] for every participant turn,
//! - a [`Scorer`] for every discussion turn,
//! - an optional [`EmbeddingService`] for orbiting detection,
//! - an optional [`Narrator`] for interjections.
//!
//! Calls are made from helper threads with a deadline, so implementations must be
//! `Send + Sync` and are shared behind an [`Arc`](std::sync::Arc). Every method gets owned or
//! borrowed snapshots, never the live record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    competition::{CompetitionView, Exchange, NarrationTrigger, OpponentSummary, TurnKind},
    participant::ParticipantId,
    progression::InterventionKind,
};

/// Everything a generator needs to produce one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    /// Who must speak.
    pub speaker: ParticipantId,
    /// Opening, discussion or final words.
    pub kind: TurnKind,
    /// Set when the progression monitor asked for a change of direction.
    pub directive: Option<InterventionKind>,
    /// The other participants from the speaker's point of view.
    pub opponents: Vec<OpponentSummary>,
    /// Snapshot of the competition.
    pub view: CompetitionView,
}

/// What a generator returns for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    /// Text of the contribution.
    pub content: String,
    /// Opaque move classification.
    pub move_type: String,
    /// Scores the generator expects the judge to give.
    #[serde(default)]
    pub predicted_scores: BTreeMap<String, f64>,
    /// Changes to the speaker's relationship weights caused by this move.
    #[serde(default)]
    pub relationship_shifts: BTreeMap<ParticipantId, f64>,
}

impl GeneratedContent {
    /// Content with a move type and nothing else.
    pub fn new(content: impl Into<String>, move_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            move_type: move_type.into(),
            ..Self::default()
        }
    }
}

/// The judge's verdict on one exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    /// Named dimensions in `[0, 1]`.
    pub dimensions: BTreeMap<String, f64>,
    /// Aggregate total. When `None`, the configured [`ScoringWeights`](crate::scoring::ScoringWeights) compute it.
    pub total: Option<f64>,
    /// Novelty in `[0, 1]`. Overrides the `novelty` dimension when set.
    pub novelty: Option<f64>,
}

/// Produces participant contributions.
pub trait ContentGenerator: Send + Sync {
    /// Produce the contribution of `context.speaker`.
    ///
    /// # Error
    /// Any error is treated as retryable by the driver.
    fn generate(&self, context: &TurnContext) -> anyhow::Result<GeneratedContent>;
}

/// Scores exchanges.
pub trait Scorer: Send + Sync {
    /// Judge `exchange` given the competition so far.
    ///
    /// # Error
    /// Any error is treated as retryable by the driver.
    fn score(&self, exchange: &Exchange, view: &CompetitionView) -> anyhow::Result<Judgement>;
}

/// Turns text into fixed-dimension vectors.
pub trait EmbeddingService: Send + Sync {
    /// Embed `text`.
    ///
    /// # Error
    /// Failures never abort a competition: orbiting detection degrades to "no signal".
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Produces narration. Every failure is logged and skipped.
pub trait Narrator: Send + Sync {
    /// Introduce the competition before the opening statements.
    fn introduce(&self, view: &CompetitionView) -> anyhow::Result<String>;

    /// Comment on the discussion.
    fn comment(&self, view: &CompetitionView, trigger: NarrationTrigger) -> anyhow::Result<String>;

    /// Announce that `name` is eliminated.
    fn announce_elimination(
        &self,
        name: &str,
        reason: &str,
        view: &CompetitionView,
    ) -> anyhow::Result<String>;

    /// Close the competition.
    fn synthesize(&self, view: &CompetitionView) -> anyhow::Result<String>;
}

#[cfg(test)]
mod interface_tests {
    use std::sync::Arc;

    use super::*;
    use crate::{competition::CompetitionRecord, participant::ParticipantSpec};

    struct Echo;

    impl ContentGenerator for Echo {
        fn generate(&self, context: &TurnContext) -> anyhow::Result<GeneratedContent> {
            Ok(GeneratedContent::new(
                format!("{} on {}", context.speaker, context.view.topic),
                "echo",
            ))
        }
    }

    struct Flat;

    impl Scorer for Flat {
        fn score(&self, _exchange: &Exchange, _view: &CompetitionView) -> anyhow::Result<Judgement> {
            Ok(Judgement {
                total: Some(1.0),
                ..Judgement::default()
            })
        }
    }

    fn context() -> TurnContext {
        let record = CompetitionRecord::new(
            "tea",
            vec![ParticipantSpec::new("a", "A"), ParticipantSpec::new("b", "B")],
            -10.0,
            5,
        )
        .unwrap();
        TurnContext {
            speaker: "a".into(),
            kind: TurnKind::Opening,
            directive: None,
            opponents: record.opponent_summaries(&"a".into()),
            view: record.view(10),
        }
    }

    #[test]
    fn test_dyn_generator() {
        let generator: Arc<dyn ContentGenerator> = Arc::new(Echo);
        let out = generator.generate(&context()).unwrap();
        assert_eq!(out.content, "a on tea");
        assert!(out.relationship_shifts.is_empty());
    }

    #[test]
    fn test_dyn_scorer() {
        let scorer: Arc<dyn Scorer> = Arc::new(Flat);
        let ctx = context();
        let exchange = Exchange {
            turn_number: 1,
            participant_id: "a".into(),
            kind: TurnKind::Discussion,
            content: String::new(),
            move_type: String::new(),
            predicted_scores: BTreeMap::new(),
            dimension_scores: None,
            novelty_score: None,
            total_score: None,
        };
        assert_eq!(scorer.score(&exchange, &ctx.view).unwrap().total, Some(1.0));
    }

    #[test]
    fn test_generated_content_deserializes_with_defaults() {
        let out: GeneratedContent =
            serde_json::from_str(r#"{"content": "hi", "move_type": "greet"}"#).unwrap();
        assert_eq!(out, GeneratedContent::new("hi", "greet"));
    }
}
