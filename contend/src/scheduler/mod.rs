//! Scheduler: ramps virtual users up, holds them, stops them.
//!
//! The scheduler owns the population of [`VirtualUser`]s for one run and walks a
//! small state machine:
//!
//! ```text
//! Idle -> RampingUp -> Steady -> RampingDown -> Stopped
//! ```
//!
//! - `Idle -> RampingUp` when [`Scheduler::run`] is called.
//! - `RampingUp -> Steady` once every user has been spawned. Users are spawned
//!   according to a [`SpawnPolicy`]: one at a time every `1 / spawn_rate` seconds,
//!   or in batches sized with fractional carrying so the long-term rate is exact.
//! - `Steady` lasts until the [`RunLimit`] duration elapses, a [`StopHandle`] asks
//!   for it, or every user has exited on its own because the behavior budget ran
//!   out.
//! - `RampingDown -> Stopped` once every spawned task has been joined.
//!
//! Stopping is broadcast over a `watch` channel. Users only look at it between
//! behaviors, so a request that is in flight when the stop arrives completes and
//! is recorded before its user exits. `Stopped` is published only after all users
//! have been joined.
//!
//! A user task that panics is logged and counted in [`RunSummary::panicked_users`];
//! it never aborts the run.

mod ramp;

pub use ramp::{SpawnPacer, SpawnPolicy, calc_spawn_count, spawn_interval};

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use tokio::{
    sync::watch::{self, Receiver},
    time::Instant,
};
use typed_builder::TypedBuilder;

use crate::{
    error::{Error, Result},
    user::{UserReport, VirtualUser},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    Idle,
    RampingUp,
    Steady,
    RampingDown,
    Stopped,
}

/// Cloneable handle that asks a run to stop.
///
/// Stopping is sticky: once requested it stays requested.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn stop(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// When a run ends on its own. With neither limit set it runs until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunLimit {
    pub duration: Option<Duration>,
    /// Total behaviors across all users.
    pub max_behaviors: Option<u64>,
}

/// Shared countdown of behaviors left in the run.
#[derive(Debug)]
pub struct Budget {
    remaining: AtomicU64,
}

impl Budget {
    pub fn new(total: u64) -> Self {
        Self {
            remaining: AtomicU64::new(total),
        }
    }

    /// Takes one behavior from the budget; false once it is exhausted.
    pub fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }
}

/// What each user task gets from the scheduler.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub shutdown: Receiver<bool>,
    pub budget: Option<Arc<Budget>>,
}

impl ExecutionContext {
    pub fn new(stop: &StopHandle, budget: Option<Arc<Budget>>) -> Self {
        Self {
            shutdown: stop.subscribe(),
            budget,
        }
    }

    /// Context for driving users outside a scheduler. The returned handle keeps
    /// the stop channel open.
    pub fn with_budget(stop: StopHandle, max_behaviors: Option<u64>) -> (Self, StopHandle) {
        let ctx = Self::new(&stop, max_behaviors.map(|n| Arc::new(Budget::new(n))));
        (ctx, stop)
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn claim_behavior(&self) -> bool {
        self.budget.as_ref().is_none_or(|budget| budget.claim())
    }

    /// Resolves once a stop is requested, or if the stop channel is gone.
    pub async fn stopped(&mut self) {
        wait_for_stop(&mut self.shutdown).await;
    }
}

async fn wait_for_stop(rx: &mut Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// How a run went, from the scheduler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub users_spawned: usize,
    pub behaviors_completed: u64,
    pub warmup_writes: u64,
    pub panicked_users: usize,
    pub elapsed: Duration,
}

#[derive(TypedBuilder)]
pub struct Scheduler {
    /// Target concurrency.
    users: usize,
    /// Users per second while ramping up.
    #[builder(default = 1.0)]
    spawn_rate: f64,
    #[builder(default)]
    spawn_policy: SpawnPolicy,
    #[builder(default)]
    limit: RunLimit,
    #[builder(default)]
    stop: StopHandle,
    #[builder(default = watch::Sender::new(SchedulerState::Idle), setter(skip))]
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn state(&self) -> Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn transition(&self, next: SchedulerState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = ?previous, to = ?next, "scheduler state changed");
    }

    /// Spawns `users` virtual users built by `make_user`, runs them until the limit
    /// or a stop, and waits for every one of them to exit.
    ///
    /// A scheduler runs once; a second call fails with [`Error::AlreadyStarted`].
    pub async fn run<F>(&self, mut make_user: F) -> Result<RunSummary>
    where
        F: FnMut(usize) -> VirtualUser,
    {
        let started = self.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::RampingUp;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(Error::AlreadyStarted);
        }

        let begin = Instant::now();
        let deadline = self.limit.duration.map(|d| begin + d);
        let budget = self.limit.max_behaviors.map(|n| Arc::new(Budget::new(n)));
        let ctx = ExecutionContext::new(&self.stop, budget);
        let mut stop_rx = self.stop.subscribe();

        tracing::info!(
            users = self.users,
            spawn_rate = self.spawn_rate,
            "ramping up virtual users"
        );
        let mut pacer = SpawnPacer::new(self.spawn_rate, self.spawn_policy, begin);
        let mut handles = Vec::with_capacity(self.users);
        let mut interrupted = false;
        while handles.len() < self.users {
            if self.stop.is_stopped() {
                interrupted = true;
                break;
            }
            let due = pacer.due().min(self.users - handles.len());
            for _ in 0..due {
                let user = make_user(handles.len());
                tracing::debug!(user = user.index(), "spawning virtual user");
                handles.push(tokio::spawn(user.run(ctx.clone())));
            }
            if handles.len() == self.users {
                break;
            }
            let next_tick = pacer.advance();
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {}
                _ = wait_for_stop(&mut stop_rx) => {
                    interrupted = true;
                    break;
                }
                _ = sleep_until_deadline(deadline) => {
                    interrupted = true;
                    break;
                }
            }
        }
        let users_spawned = handles.len();

        let mut joined = Box::pin(join_all(handles));
        let results = if interrupted {
            None
        } else {
            self.transition(SchedulerState::Steady);
            tokio::select! {
                results = &mut joined => Some(results),
                _ = wait_for_stop(&mut stop_rx) => None,
                _ = sleep_until_deadline(deadline) => None,
            }
        };

        self.transition(SchedulerState::RampingDown);
        let results = match results {
            Some(results) => results,
            None => {
                self.stop.stop();
                joined.await
            }
        };

        let mut summary = RunSummary {
            users_spawned,
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(UserReport {
                    behaviors,
                    warmup_writes,
                    ..
                }) => {
                    summary.behaviors_completed += behaviors;
                    summary.warmup_writes += warmup_writes;
                }
                Err(err) => {
                    tracing::error!(error = %err, "virtual user task failed");
                    summary.panicked_users += 1;
                }
            }
        }
        summary.elapsed = begin.elapsed();

        self.transition(SchedulerState::Stopped);
        tracing::info!(
            users = summary.users_spawned,
            behaviors = summary.behaviors_completed,
            elapsed = ?summary.elapsed,
            "all virtual users stopped"
        );
        Ok(summary)
    }
}
