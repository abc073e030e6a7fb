//! Agent main loop
//!
//! Idle -> Sampling -> Reporting -> Sleeping -> Idle, until stopped.
//! A stop request is honoured at every transition and interrupts the sleep.
//! Sampling and delivery failures are logged and the cycle is skipped;
//! nothing is buffered for later.

use crate::metrics::{MetricSnapshot, SampleError, Sampler};
use crate::reporter::Reporter;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Sampling,
    Reporting,
    Sleeping,
    Stopped,
}

/// Counters returned when the loop stops
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub delivered: u64,
    pub sample_failures: u64,
    pub delivery_failures: u64,
}

pub struct Agent<S, R> {
    sampler: Option<S>,
    reporter: R,
    interval: Duration,
    state: AgentState,
    stats: LoopStats,
}

impl<S, R> Agent<S, R>
where
    S: Sampler + Send + 'static,
    R: Reporter,
{
    pub fn new(sampler: S, reporter: R, interval: Duration) -> Self {
        Self { sampler: Some(sampler), reporter, interval, state: AgentState::Idle, stats: LoopStats::default() }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Runs until `stop` turns true (or its sender is dropped).
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> LoopStats {
        info!("Starting agent main loop (interval {}s)", self.interval.as_secs());

        loop {
            if *stop.borrow() {
                break;
            }

            self.transition(AgentState::Sampling);
            let sampled = self.take_sample().await;
            if *stop.borrow() {
                break;
            }

            match sampled {
                Ok(snapshot) => {
                    self.transition(AgentState::Reporting);
                    self.deliver(&snapshot).await;
                }
                Err(e) => {
                    error!("Failed to collect system metrics: {e}");
                    self.stats.sample_failures += 1;
                }
            }
            self.stats.cycles += 1;

            if *stop.borrow() {
                break;
            }

            self.transition(AgentState::Sleeping);
            let stop_signalled = tokio::select! {
                _ = tokio::time::sleep(self.interval) => false,
                changed = stop.changed() => changed.is_err(),
            };
            if stop_signalled || *stop.borrow() {
                break;
            }
            self.transition(AgentState::Idle);
        }

        self.transition(AgentState::Stopped);
        info!(
            "Agent stopped after {} cycles ({} delivered, {} sample failures, {} delivery failures)",
            self.stats.cycles, self.stats.delivered, self.stats.sample_failures, self.stats.delivery_failures
        );
        self.stats
    }

    fn transition(&mut self, next: AgentState) {
        debug!("Agent state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs the blocking sampler off the async workers and takes it back afterwards.
    async fn take_sample(&mut self) -> Result<MetricSnapshot, SampleError> {
        let mut sampler = self
            .sampler
            .take()
            .ok_or_else(|| SampleError::Task("sampler lost by a previous panic".to_string()))?;

        let (sampler, result) = tokio::task::spawn_blocking(move || {
            let result = sampler.sample();
            (sampler, result)
        })
        .await
        .map_err(|e| SampleError::Task(e.to_string()))?;

        self.sampler = Some(sampler);
        result
    }

    async fn deliver(&mut self, snapshot: &MetricSnapshot) {
        match self.reporter.report(snapshot).await {
            Ok(ack) => {
                self.stats.delivered += 1;
                debug!("Snapshot delivered ({})", ack.status);
            }
            Err(e) => {
                self.stats.delivery_failures += 1;
                warn!("Failed to deliver snapshot: {e}");
            }
        }
    }
}
