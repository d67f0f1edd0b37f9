//! # Ai Arena
//!
//! A Rust crate for scheduling and refereeing multi-agent discussion competitions.
//!
//! Several participants take turns on a topic. Every turn, the engine picks who speaks,
//! asks an external generator for the content, asks an external judge for a score,
//! watches the discussion for repetition or stalling, and removes participants whose
//! cumulative score fell too low. The competition ends when the turn budget is spent or a
//! single participant remains.
//!
//! It provides:
//! - The competition state machine ([`CompetitionDriver`](crate::driver::CompetitionDriver))
//! - Fair, tension-aware speaker selection ([`TurnScheduler`](crate::turn_scheduler::TurnScheduler))
//! - Orbiting and stagnation detection ([`ProgressionMonitor`](crate::progression::ProgressionMonitor))
//! - Pluggable elimination rules via the [`EliminationPolicy`](crate::elimination::EliminationPolicy) trait
//! - Parallel execution of independent competitions ([`Arena`](crate::arena::Arena))
//!
//! Content, scores, embeddings and narration come from collaborators implementing the
//! traits of [`collaborators`]. Every call to them has a deadline, generation and scoring
//! are retried with backoff, and narration or embedding failures never stop a competition.
//!
//! # Documentation Overview
//!
//! - For the phases and the failure semantics, see the [`driver`] module.
//! - For every threshold and weight, see [`CompetitionConfig`](crate::configuration::CompetitionConfig).
//! - For the data model and its invariants, see the [`competition`] module.
//! - For the persisted summary, see [`CompetitionReport`](crate::report::CompetitionReport).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ai_arena::prelude::*;
//!
//! struct Echo;
//!
//! impl ContentGenerator for Echo {
//!     fn generate(&self, context: &TurnContext) -> anyhow::Result<GeneratedContent> {
//!         Ok(GeneratedContent::new(
//!             format!("{} has thoughts on {}", context.speaker, context.view.topic),
//!             "statement",
//!         ))
//!     }
//! }
//!
//! struct Judge;
//!
//! impl Scorer for Judge {
//!     fn score(&self, _exchange: &Exchange, _view: &CompetitionView) -> anyhow::Result<Judgement> {
//!         Ok(Judgement {
//!             total: Some(1.0),
//!             novelty: Some(0.5),
//!             ..Judgement::default()
//!         })
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let participants = vec![
//!         ParticipantSpec::new("ada", "Ada"),
//!         ParticipantSpec::new("brook", "Brook"),
//!         ParticipantSpec::new("cyd", "Cyd"),
//!     ];
//!     let config = CompetitionConfig::new()
//!         .with_max_turns(12)
//!         .with_elimination_threshold(-10.0);
//!
//!     let driver = CompetitionDriver::builder("Is a tomato a fruit?", participants, Arc::new(Echo), Arc::new(Judge))
//!         .with_config(config)
//!         .build()?;
//!
//!     let record = driver.run()?;
//!     println!("{}", CompetitionReport::from_record(&record).to_json()?);
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod arena;
mod call_guard;
pub mod collaborators;
pub mod competition;
pub mod configuration;
pub mod driver;
pub mod elimination;
pub mod error;
mod logger;
pub mod participant;
pub mod progression;
pub mod report;
pub mod scoring;
pub mod turn_scheduler;

pub use call_guard::RetryPolicy;
pub use logger::init_logger;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use ai_arena::prelude::*;
/// ```
///
/// Includes:
/// - [`CompetitionConfig`](crate::configuration::CompetitionConfig)
/// - [`CompetitionDriver`](crate::driver::CompetitionDriver) and [`CancelFlag`](crate::driver::CancelFlag)
/// - [`Arena`](crate::arena::Arena)
/// - the collaborator traits and their input/output types
pub mod prelude {
    pub use crate::arena::{Arena, ArenaResult};
    pub use crate::collaborators::{
        ContentGenerator, EmbeddingService, GeneratedContent, Judgement, Narrator, Scorer,
        TurnContext,
    };
    pub use crate::competition::{
        CompetitionRecord, CompetitionView, Exchange, NarrationTrigger, Phase, TurnKind,
    };
    pub use crate::configuration::CompetitionConfig;
    pub use crate::driver::{CancelFlag, CompetitionDriver};
    pub use crate::elimination::{EliminationPolicy, ThresholdPolicy};
    pub use crate::error::{Aborted, CompetitionError};
    pub use crate::participant::{ParticipantId, ParticipantSpec};
    pub use crate::progression::InterventionKind;
    pub use crate::report::CompetitionReport;
}
