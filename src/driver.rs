//! The competition state machine.
//!
//! A [`CompetitionDriver`] owns one [`CompetitionRecord`] and plays it to the end:
//!
//! 1. `INITIALIZATION`: the narrator introduces the competition.
//! 2. `OPENING_STATEMENTS`: every participant, in participant order, produces one unscored
//!    opening exchange.
//! 3. `FREE_DISCUSSION`: until the record's termination predicate holds, each iteration
//!    - checks the cancel flag,
//!    - runs an elimination if the [`EliminationPolicy`] asks for one
//!      (`ELIMINATION_PENDING -> ELIMINATION_ANNOUNCEMENT -> FINAL_WORDS -> FREE_DISCUSSION`),
//!    - lets the narrator speak on its cadence or when the progression monitor asked for it,
//!    - schedules a speaker, generates and appends its exchange, scores it, and stores the
//!      progression flags on the record.
//! 4. `SYNTHESIS`: the narrator closes, then the record is sealed in `COMPLETE`.
//!
//! Content generation and scoring are retried according to [`CallLimits::retry`] and each
//! attempt has a deadline. When they are exhausted the competition stops with an [`Aborted`]
//! error holding the partial record. Narrator failures are logged and skipped.
//!
//! [`CallLimits::retry`]: crate::configuration::CallLimits

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

use crate::{
    call_guard::{call_with_timeout, CallError},
    collaborators::{ContentGenerator, EmbeddingService, Narrator, Scorer, TurnContext},
    competition::{CompetitionRecord, CompetitionView, NarrationTrigger, Phase, TurnKind},
    configuration::CompetitionConfig,
    elimination::{EliminationPolicy, ThresholdPolicy},
    error::{Aborted, CompetitionError, Result},
    logger::init_logger,
    participant::{ParticipantId, ParticipantSpec},
    progression::{InterventionKind, ProgressionAnalysis, ProgressionMonitor},
    scoring::NOVELTY_DIMENSION,
    turn_scheduler::TurnScheduler,
};

/// Shared flag used to stop a competition between turns.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the competition to stop at the next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancelFlag::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builder for a [`CompetitionDriver`].
pub struct DriverBuilder {
    topic: String,
    participants: Vec<ParticipantSpec>,
    generator: Arc<dyn ContentGenerator>,
    scorer: Arc<dyn Scorer>,
    config: CompetitionConfig,
    narrator: Option<Arc<dyn Narrator>>,
    embeddings: Option<Arc<dyn EmbeddingService>>,
    policy: Box<dyn EliminationPolicy>,
    seed: Option<u64>,
    cancel: CancelFlag,
}

impl DriverBuilder {
    /// Use `config` instead of [`CompetitionConfig::new()`].
    pub fn with_config(mut self, config: CompetitionConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a narrator. Without one, the competition runs silently.
    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    /// Enable orbiting detection with this embedding service.
    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingService>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Replace the default [`ThresholdPolicy`].
    pub fn with_policy(mut self, policy: impl EliminationPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Seed the scheduler's random source, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Share a cancel flag with the caller.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the configuration and the participant set, and create the driver.
    ///
    /// # Errors
    ///
    /// [`CompetitionError::Configuration`] for an out-of-range setting, fewer than two
    /// participants or a duplicate participant id.
    pub fn build(self) -> Result<CompetitionDriver> {
        self.config.validate()?;
        if let Some(dir) = &self.config.log_dir {
            match init_logger(dir) {
                Ok(path) => info!(path = %path.display(), "logging to file"),
                Err(e) => warn!("file logging disabled: {e:#}"),
            }
        }

        let record = CompetitionRecord::new(
            self.topic,
            self.participants,
            self.config.elimination_threshold,
            self.config.max_turns,
        )?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let monitor = ProgressionMonitor::new(
            self.config.progression.clone(),
            self.embeddings,
            self.config.limits.embedding_timeout,
        )?;
        trace!(config = ?self.config, competition = %record.competition_id(), "driver built");

        Ok(CompetitionDriver {
            scheduler: TurnScheduler::new(self.config.scheduler.clone()),
            monitor,
            record,
            config: self.config,
            generator: self.generator,
            scorer: self.scorer,
            narrator: self.narrator,
            policy: self.policy,
            rng,
            cancel: self.cancel,
            directive: None,
            pending_narration: None,
            last_periodic: None,
            last_analysis: None,
        })
    }
}

/// Plays one competition from `INITIALIZATION` to `COMPLETE`.
pub struct CompetitionDriver {
    record: CompetitionRecord,
    config: CompetitionConfig,
    scheduler: TurnScheduler,
    monitor: ProgressionMonitor,
    generator: Arc<dyn ContentGenerator>,
    scorer: Arc<dyn Scorer>,
    narrator: Option<Arc<dyn Narrator>>,
    policy: Box<dyn EliminationPolicy>,
    rng: StdRng,
    cancel: CancelFlag,
    directive: Option<InterventionKind>,
    pending_narration: Option<NarrationTrigger>,
    last_periodic: Option<u64>,
    last_analysis: Option<ProgressionAnalysis>,
}

impl CompetitionDriver {
    /// Start building a driver for `participants` discussing `topic`.
    pub fn builder(
        topic: impl Into<String>,
        participants: Vec<ParticipantSpec>,
        generator: Arc<dyn ContentGenerator>,
        scorer: Arc<dyn Scorer>,
    ) -> DriverBuilder {
        DriverBuilder {
            topic: topic.into(),
            participants,
            generator,
            scorer,
            config: CompetitionConfig::new(),
            narrator: None,
            embeddings: None,
            policy: Box::new(ThresholdPolicy),
            seed: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Id of the competition this driver plays.
    pub fn competition_id(&self) -> Uuid {
        self.record.competition_id()
    }

    /// The record as it is now.
    pub fn record(&self) -> &CompetitionRecord {
        &self.record
    }

    /// A handle on the flag this driver checks between turns.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Latest progression analysis, if a discussion turn was played.
    pub fn last_analysis(&self) -> Option<&ProgressionAnalysis> {
        self.last_analysis.as_ref()
    }

    /// Play the competition to the end.
    ///
    /// # Errors
    ///
    /// [`Aborted`] with the partial record when a collaborator kept failing, the
    /// competition was cancelled, or an invariant was violated. A panic while playing, for
    /// instance in a custom elimination policy, is reported as [`CompetitionError::Panicked`].
    #[instrument(skip_all, fields(competition = %self.record.competition_id()))]
    pub fn run(mut self) -> std::result::Result<CompetitionRecord, Aborted> {
        info!(
            topic = self.record.topic(),
            participants = self.record.participant_order().len(),
            max_turns = self.record.max_turns(),
            "competition started"
        );
        let played = panic::catch_unwind(AssertUnwindSafe(|| self.play()))
            .unwrap_or_else(|payload| Err(CompetitionError::Panicked(panic_message(&*payload))));
        match played {
            Ok(()) => {
                info!(
                    turns = self.record.turn_number(),
                    winner = ?self.record.leader().map(|p| p.id.as_str()),
                    "competition complete"
                );
                Ok(self.record)
            }
            Err(error) => {
                error!(
                    turn = self.record.turn_number(),
                    phase = %self.record.phase(),
                    "competition aborted: {error}"
                );
                Err(Aborted {
                    record: Box::new(self.record),
                    error,
                })
            }
        }
    }

    fn play(&mut self) -> Result<()> {
        self.narrate(NarrationTrigger::Introduction, |n, view| n.introduce(view));
        self.record.set_phase(Phase::OpeningStatements)?;

        let speakers = self.record.active_participant_ids().to_vec();
        for speaker in &speakers {
            self.check_cancelled()?;
            self.take_turn(speaker, TurnKind::Opening)?;
        }
        self.record.set_phase(Phase::FreeDiscussion)?;

        loop {
            self.check_cancelled()?;
            if self.record.should_terminate() {
                break;
            }
            if self.policy.should_eliminate(&self.record) {
                self.eliminate()?;
                continue;
            }
            self.interject();
            self.discussion_turn()?;
        }

        self.record.set_phase(Phase::Synthesis)?;
        self.narrate(NarrationTrigger::Synthesis, |n, view| n.synthesize(view));
        self.record.set_phase(Phase::Complete)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(turn = self.record.turn_number(), "cancellation requested");
            return Err(CompetitionError::Cancelled);
        }
        Ok(())
    }

    fn discussion_turn(&mut self) -> Result<()> {
        let speaker = self
            .scheduler
            .select_next_speaker(&self.record, &mut self.rng)?;
        let turn = self.take_turn(&speaker, TurnKind::Discussion)?;
        self.score_turn(turn)?;

        let analysis = self.monitor.analyze(&self.record);
        self.record
            .set_progression_flags(analysis.is_orbiting, analysis.stagnation_turns);
        match analysis.intervention_kind {
            Some(InterventionKind::NarratorPrompt) => {
                self.pending_narration = Some(if analysis.is_orbiting {
                    NarrationTrigger::Orbiting
                } else {
                    NarrationTrigger::Stagnation
                });
            }
            Some(InterventionKind::ForcePivot) => self.directive = Some(InterventionKind::ForcePivot),
            None => {}
        }
        self.last_analysis = Some(analysis);
        Ok(())
    }

    /// Generate and append the exchange of `speaker`. Returns its turn number.
    fn take_turn(&mut self, speaker: &ParticipantId, kind: TurnKind) -> Result<u64> {
        let directive = match kind {
            TurnKind::Discussion => self.directive.take(),
            _ => None,
        };
        let context = TurnContext {
            speaker: speaker.clone(),
            kind,
            directive,
            opponents: self.record.opponent_summaries(speaker),
            view: self.record.view(self.config.context_window),
        };

        let limits = &self.config.limits;
        let timeout = limits.generation_timeout;
        let generated = limits
            .retry
            .run("content generation", || {
                let generator = Arc::clone(&self.generator);
                let context = context.clone();
                call_with_timeout(timeout, move || generator.generate(&context))
            })
            .map_err(|e| match e {
                CallError::TimedOut(after) => CompetitionError::Timeout {
                    operation: "content generation",
                    after,
                },
                CallError::Failed(source) => CompetitionError::Generation {
                    participant: speaker.clone(),
                    source,
                },
            })?;

        let turn = self.record.append_exchange(
            speaker,
            kind,
            generated.content,
            generated.move_type,
            generated.predicted_scores,
        )?;
        for (other, delta) in generated.relationship_shifts {
            if let Err(e) = self.record.shift_relationship(speaker, &other, delta) {
                warn!(%speaker, %other, "relationship shift ignored: {e}");
            }
        }
        debug!(turn, %speaker, ?kind, "exchange recorded");
        Ok(turn)
    }

    fn score_turn(&mut self, turn: u64) -> Result<()> {
        let exchange = self
            .record
            .exchange(turn)
            .cloned()
            .ok_or(CompetitionError::UnknownTurn(turn))?;
        let view = self.record.view(self.config.context_window);

        let limits = &self.config.limits;
        let timeout = limits.scoring_timeout;
        let judgement = limits
            .retry
            .run("scoring", || {
                let scorer = Arc::clone(&self.scorer);
                let exchange = exchange.clone();
                let view = view.clone();
                call_with_timeout(timeout, move || scorer.score(&exchange, &view))
            })
            .map_err(|e| match e {
                CallError::TimedOut(after) => CompetitionError::Timeout {
                    operation: "scoring",
                    after,
                },
                CallError::Failed(source) => CompetitionError::Scoring { turn, source },
            })?;

        let weights = &self.config.scoring;
        let total = judgement
            .total
            .unwrap_or_else(|| weights.aggregate(&judgement.dimensions));
        let mut dimensions = weights.known_dimensions(&judgement.dimensions);
        let novelty = judgement
            .novelty
            .or_else(|| judgement.dimensions.get(NOVELTY_DIMENSION).copied());
        if let Some(novelty) = novelty {
            dimensions.insert(NOVELTY_DIMENSION.to_string(), novelty.clamp(0.0, 1.0));
        }

        self.record.record_score(turn, dimensions, total)?;
        debug!(turn, speaker = %exchange.participant_id, total, ?novelty, "exchange scored");
        Ok(())
    }

    fn eliminate(&mut self) -> Result<()> {
        self.record.set_phase(Phase::EliminationPending)?;
        let eliminee = self.policy.select_eliminee(&self.record)?;
        let reason = self.policy.reason(&self.record, &eliminee);
        info!(participant = %eliminee, %reason, "elimination pending");

        self.record.set_phase(Phase::EliminationAnnouncement)?;
        let name = self
            .record
            .participant(&eliminee)
            .map_or_else(|| eliminee.to_string(), |p| p.name.clone());
        let announced = reason.clone();
        self.narrate(NarrationTrigger::Elimination, move |n, view| {
            n.announce_elimination(&name, &announced, view)
        });

        self.record.set_phase(Phase::FinalWords)?;
        self.check_cancelled()?;
        self.take_turn(&eliminee, TurnKind::FinalWords)?;
        self.record.eliminate(&eliminee, reason)?;
        self.record.set_phase(Phase::FreeDiscussion)
    }

    /// Narrator comment requested by the progression monitor, or the periodic one.
    ///
    /// A requested comment stands in for a periodic comment due at the same point; that
    /// cadence multiple counts as served.
    fn interject(&mut self) {
        let played = self.record.discussion_turns();
        let cadence = self.config.narrator_cadence;
        let periodic_due = cadence > 0
            && played > 0
            && played % cadence == 0
            && self.last_periodic != Some(played);
        if periodic_due {
            self.last_periodic = Some(played);
        }
        let trigger = self
            .pending_narration
            .take()
            .or(periodic_due.then_some(NarrationTrigger::Periodic));
        if let Some(trigger) = trigger {
            self.narrate(trigger, move |n, view| n.comment(view, trigger));
        }
    }

    fn narrate<F>(&mut self, trigger: NarrationTrigger, speak: F)
    where
        F: FnOnce(&dyn Narrator, &CompetitionView) -> anyhow::Result<String> + Send + 'static,
    {
        let Some(narrator) = self.narrator.clone() else {
            trace!(?trigger, "no narrator");
            return;
        };
        let view = self.record.view(self.config.context_window);
        let spoken = call_with_timeout(self.config.limits.narration_timeout, move || {
            speak(narrator.as_ref(), &view)
        });
        match spoken {
            Ok(text) => {
                if let Err(e) = self.record.add_interjection(trigger, text) {
                    warn!(?trigger, "narration dropped: {e}");
                }
            }
            Err(e) => warn!(?trigger, "narrator failed, continuing without narration: {e}"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
