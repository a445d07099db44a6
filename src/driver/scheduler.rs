//! Fixed-interval sampling loop
//!
//! One tokio task ticks the sampler, then waits out the rest of the
//! interval. Pin I/O is synchronous, so each tick runs on the blocking pool
//! while the loop keeps listening for a stop request.

use crate::driver::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Whether the sampling loop is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Count-down deciding which ticks carry raw counter events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterBudget {
    every_ms: i64,
    remaining_ms: i64,
}

impl CounterBudget {
    /// `every_ms <= 0` means every tick carries counters
    pub fn new(every_ms: i64) -> Self {
        Self {
            every_ms,
            remaining_ms: every_ms,
        }
    }

    /// Advance by one tick and report whether it should send counters
    pub fn next_tick(&mut self, tick_interval_ms: u32) -> bool {
        if self.every_ms <= 0 {
            return true;
        }
        self.remaining_ms -= i64::from(tick_interval_ms);
        if self.remaining_ms <= 0 {
            self.remaining_ms = self.every_ms;
            true
        } else {
            false
        }
    }
}

/// Owner of the background sampling task
pub struct Scheduler {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            stop_tx: None,
            task: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.task {
            Some(task) if !task.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Idle,
        }
    }

    /// Spawn the sampling loop; no-op when already running
    pub fn start(&mut self, shared: SharedState, tick_interval_ms: u32, send_counters_every_ms: i64) {
        if self.state() == SchedulerState::Running {
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let budget = CounterBudget::new(send_counters_every_ms);
        self.task = Some(tokio::spawn(run_loop(shared, tick_interval_ms, budget, stop_rx)));
        self.stop_tx = Some(stop_tx);
    }

    /// Signal the loop to stop and wait for it to exit
    ///
    /// Returns without waiting for a tick that is stuck in pin I/O.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Sampling task ended abnormally: {}", e);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(
    shared: SharedState,
    tick_interval_ms: u32,
    mut budget: CounterBudget,
    mut stop_rx: watch::Receiver<bool>,
) {
    log::info!("Sampling loop started with {}ms interval", tick_interval_ms);

    let mut interval = tokio::time::interval(Duration::from_millis(u64::from(tick_interval_ms)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {}
        }

        let send_counters = budget.next_tick(tick_interval_ms);
        let state = Arc::clone(&shared);
        let tick = tokio::task::spawn_blocking(move || state.blocking_lock().tick(send_counters));

        tokio::select! {
            biased;
            _ = stop_rx.changed() => {
                log::warn!("Stop requested while a tick was in flight");
                break;
            }
            result = tick => {
                match result {
                    Ok(report) => log::debug!(
                        "tick: sampled={} skipped={} emitted={} counters={}",
                        report.sampled,
                        report.skipped,
                        report.emitted,
                        send_counters
                    ),
                    Err(e) => {
                        log::error!("Sampling tick panicked: {}", e);
                        break;
                    }
                }
            }
        }
    }

    log::info!("Sampling loop stopped");
}
