//! Runs many independent competitions in parallel.
//!
//! Each competition is sequential and owned by its own thread. The [`Arena`] starts at
//! most `max_parallel` of them, then starts a new one every time a result comes back on
//! its channel, until every driver has finished.

use std::{
    sync::mpsc::{self, Sender},
    thread,
};

use tracing::{info, instrument, trace, warn};
use uuid::Uuid;

use crate::{competition::CompetitionRecord, driver::CompetitionDriver, error::Aborted};

/// Outcome of one competition run by an [`Arena`].
#[derive(Debug)]
pub struct ArenaResult {
    /// Id of the competition.
    pub competition_id: Uuid,
    /// Full record, or the partial record and the error that stopped it.
    pub outcome: Result<CompetitionRecord, Aborted>,
}

impl ArenaResult {
    /// Whether the competition reached `COMPLETE`.
    pub fn is_complete(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Bounded pool of competition threads.
#[derive(Debug, Clone)]
pub struct Arena {
    max_parallel: usize,
}

impl Default for Arena {
    /// One competition per logical CPU.
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl Arena {
    /// Arena running at most `max_parallel` competitions at once (at least one).
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Maximum number of competitions running at the same time.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run every driver to the end and return their outcomes in input order.
    #[instrument(skip_all, fields(competitions = drivers.len(), max_parallel = self.max_parallel))]
    pub fn run(&self, drivers: Vec<CompetitionDriver>) -> Vec<ArenaResult> {
        let total = drivers.len();
        let (tx, rx) = mpsc::channel();
        let mut pending = drivers.into_iter().enumerate();
        let mut results: Vec<Option<ArenaResult>> = (0..total).map(|_| None).collect();

        let mut running = 0;
        for (index, driver) in pending.by_ref().take(self.max_parallel) {
            launch(index, driver, tx.clone());
            running += 1;
        }

        while running > 0 {
            // every launched thread sends exactly once, the driver catches its own panics
            let Ok((index, result)) = rx.recv() else {
                warn!(running, "result channel closed early");
                break;
            };
            running -= 1;
            let competition_id = result.competition_id;
            match &result.outcome {
                Ok(record) => info!(%competition_id, turns = record.turn_number(), "competition finished"),
                Err(aborted) => warn!(%competition_id, "{aborted}"),
            }
            results[index] = Some(result);

            if let Some((index, driver)) = pending.next() {
                launch(index, driver, tx.clone());
                running += 1;
            }
        }

        results.into_iter().flatten().collect()
    }
}

fn launch(index: usize, driver: CompetitionDriver, tx: Sender<(usize, ArenaResult)>) {
    let competition_id = driver.competition_id();
    trace!(%competition_id, index, "launching competition");

    thread::spawn(move || {
        let outcome = driver.run();
        // the arena may have stopped listening
        let _ = tx.send((
            index,
            ArenaResult {
                competition_id,
                outcome,
            },
        ));
    });
}
