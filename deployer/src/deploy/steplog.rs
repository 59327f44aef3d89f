//! Per-run step timing

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::deploy::fsm::DeploymentState;

/// One recorded step
#[derive(Debug, Clone)]
pub struct StepEntry {
    pub step: &'static str,
    pub at: DateTime<Utc>,
    started: Instant,
}

/// Ordered step entries of one run
#[derive(Debug)]
pub struct StepLog {
    run: u64,
    started: Instant,
    entries: Vec<StepEntry>,
}

impl StepLog {
    pub fn new(run: u64) -> Self {
        Self {
            run,
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    /// Mark the start of `step`
    pub fn record(&mut self, step: &'static str) {
        info!(step, "deployCount: {}, step: {}", self.run, step);
        self.entries.push(StepEntry {
            step,
            at: Utc::now(),
            started: Instant::now(),
        });
    }

    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    /// Name of the step in progress
    pub fn current(&self) -> Option<&'static str> {
        self.entries.last().map(|e| e.step)
    }

    /// `step=ms` pairs, each step lasting until the next one started
    pub fn summary(&self) -> String {
        let finished = Instant::now();
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let end = self
                    .entries
                    .get(i + 1)
                    .map(|next| next.started)
                    .unwrap_or(finished);
                format!(
                    "{}={}ms",
                    entry.step,
                    end.duration_since(entry.started).as_millis()
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Log the one-line summary of the run
    pub fn finish(&self, state: DeploymentState) {
        let total = self.started.elapsed().as_millis();
        match state {
            DeploymentState::Failed => error!(
                "deployCount: {}, failed at {} after {}ms: {}",
                self.run,
                self.current().unwrap_or("start"),
                total,
                self.summary()
            ),
            _ => info!(
                "deployCount: {}, {:?} after {}ms: {}",
                self.run,
                state,
                total,
                self.summary()
            ),
        }
    }
}
