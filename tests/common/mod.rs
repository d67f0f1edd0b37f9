#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use ai_arena::{
    configuration::{CallLimits, SchedulerConfig},
    prelude::*,
    RetryPolicy,
};
use anyhow::bail;

type GenerateFn = dyn Fn(&TurnContext, usize) -> anyhow::Result<GeneratedContent> + Send + Sync;
type ScoreFn = dyn Fn(&Exchange, usize) -> anyhow::Result<Judgement> + Send + Sync;

/// Generator driven by a closure receiving the context and the 0-indexed call number.
pub struct ScriptedGenerator {
    script: Box<GenerateFn>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<TurnContext>>,
}

impl ScriptedGenerator {
    pub fn new(
        script: impl Fn(&TurnContext, usize) -> anyhow::Result<GeneratedContent> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(vec![]),
        })
    }

    /// "<speaker> #<turn>" for every turn.
    pub fn echo() -> Arc<Self> {
        Self::new(|context, _| Ok(echo(context)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<TurnContext> {
        self.contexts.lock().unwrap().clone()
    }
}

impl ContentGenerator for ScriptedGenerator {
    fn generate(&self, context: &TurnContext) -> anyhow::Result<GeneratedContent> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.clone());
        (self.script)(context, call)
    }
}

pub fn echo(context: &TurnContext) -> GeneratedContent {
    GeneratedContent::new(
        format!("{} #{}", context.speaker, context.view.turn_number + 1),
        "claim",
    )
}

/// Judge driven by a closure receiving the exchange and the 0-indexed call number.
pub struct ScriptedScorer {
    script: Box<ScoreFn>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn new(
        script: impl Fn(&Exchange, usize) -> anyhow::Result<Judgement> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    /// Same total and novelty for every exchange.
    pub fn flat(total: f64, novelty: f64) -> Arc<Self> {
        Self::new(move |_, _| Ok(judgement(total, novelty)))
    }

    /// `low` for `loser`, `high` for everybody else.
    pub fn punishing(loser: &str, low: f64, high: f64) -> Arc<Self> {
        let loser = ParticipantId::new(loser);
        Self::new(move |exchange, _| {
            let total = if exchange.participant_id == loser { low } else { high };
            Ok(judgement(total, 0.6))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Scorer for ScriptedScorer {
    fn score(&self, exchange: &Exchange, _view: &CompetitionView) -> anyhow::Result<Judgement> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(exchange, call)
    }
}

pub fn judgement(total: f64, novelty: f64) -> Judgement {
    Judgement {
        dimensions: BTreeMap::from([("logic".to_string(), 0.5)]),
        total: Some(total),
        novelty: Some(novelty),
    }
}

/// Narrator remembering what it was asked, optionally failing every call.
#[derive(Default)]
pub struct RecordingNarrator {
    fail: bool,
    triggers: Mutex<Vec<NarrationTrigger>>,
    announced: Mutex<Vec<String>>,
}

impl RecordingNarrator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn triggers(&self) -> Vec<NarrationTrigger> {
        self.triggers.lock().unwrap().clone()
    }

    pub fn announced(&self) -> Vec<String> {
        self.announced.lock().unwrap().clone()
    }

    fn say(&self, trigger: NarrationTrigger) -> anyhow::Result<String> {
        self.triggers.lock().unwrap().push(trigger);
        if self.fail {
            bail!("narrator is sulking");
        }
        Ok(format!("narration: {trigger:?}"))
    }
}

impl Narrator for RecordingNarrator {
    fn introduce(&self, _view: &CompetitionView) -> anyhow::Result<String> {
        self.say(NarrationTrigger::Introduction)
    }

    fn comment(&self, _view: &CompetitionView, trigger: NarrationTrigger) -> anyhow::Result<String> {
        self.say(trigger)
    }

    fn announce_elimination(
        &self,
        name: &str,
        _reason: &str,
        _view: &CompetitionView,
    ) -> anyhow::Result<String> {
        self.announced.lock().unwrap().push(name.to_string());
        self.say(NarrationTrigger::Elimination)
    }

    fn synthesize(&self, _view: &CompetitionView) -> anyhow::Result<String> {
        self.say(NarrationTrigger::Synthesis)
    }
}

/// Every text maps to the same vector.
pub struct ConstantEmbedder;

impl EmbeddingService for ConstantEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.6, 0.8, 0.0])
    }
}

/// Always unavailable.
#[derive(Default)]
pub struct BrokenEmbedder {
    pub calls: AtomicUsize,
}

impl EmbeddingService for BrokenEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("embedding backend unreachable")
    }
}

/// Answers, but only after `delay`.
pub struct SlowEmbedder {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

impl EmbeddingService for SlowEmbedder {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(vec![1.0, 0.0])
    }
}

pub fn specs(ids: &[&str]) -> Vec<ParticipantSpec> {
    ids.iter()
        .map(|id| ParticipantSpec::new(*id, id.to_uppercase()))
        .collect()
}

/// Default limits with millisecond backoffs.
pub fn fast_limits(max_attempts: u32) -> CallLimits {
    CallLimits {
        retry: RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 2.0,
            max_backoff_ms: 4,
        },
        ..CallLimits::default()
    }
}

/// No randomness and a strong pull toward participants close to elimination.
pub fn tense_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        randomness_weight: 0.0,
        tension_weight: 5.0,
        ..SchedulerConfig::default()
    }
}

pub fn config(max_turns: u64) -> CompetitionConfig {
    CompetitionConfig::new()
        .with_max_turns(max_turns)
        .with_elimination_threshold(-10.0)
        .with_limits(fast_limits(3))
}
