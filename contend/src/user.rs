//! Virtual users.
//!
//! A [`VirtualUser`] is one simulated client. It runs its optional warm-up writes
//! once, then loops: select a behavior, execute and validate it, record the verdict,
//! think, repeat. Behaviors of one user never overlap. The stop signal is only
//! looked at between behaviors, so an in-flight request is never abandoned.

use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use tokio::time::Instant;

use crate::{
    aggregate::StatsAggregator,
    behavior::Workload,
    metric::Verdict,
    request::{Request, RequestExecutor},
    resource::ResourceRecord,
    scheduler::ExecutionContext,
    selector::WeightedSelector,
    think::ThinkTime,
    validate,
};

/// Everything users share, read-only, for the length of a run.
pub struct Population {
    pub selector: WeightedSelector,
    pub think: ThinkTime,
    pub workload: Workload,
    pub executor: Arc<dyn RequestExecutor>,
    pub stats: Arc<StatsAggregator>,
    pub seed: u64,
}

impl Population {
    /// Builds the user with the given index, with its own generator derived from the
    /// run seed.
    pub fn user(self: &Arc<Self>, index: usize) -> VirtualUser {
        VirtualUser {
            population: Arc::clone(self),
            state: UserState::new(index, user_seed(self.seed, index)),
        }
    }
}

/// Mixes the run seed with the user index so neighbouring users get unrelated
/// streams.
pub fn user_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// State owned by exactly one user.
#[derive(Debug)]
pub struct UserState {
    index: usize,
    rng: StdRng,
    running: bool,
}

impl UserState {
    fn new(index: usize, seed: u64) -> Self {
        Self {
            index,
            rng: StdRng::seed_from_u64(seed),
            running: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// What a user did before it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserReport {
    pub index: usize,
    pub behaviors: u64,
    pub warmup_writes: u64,
}

pub struct VirtualUser {
    population: Arc<Population>,
    state: UserState,
}

impl VirtualUser {
    pub fn index(&self) -> usize {
        self.state.index
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    /// Runs until the context says to stop or the behavior budget runs out.
    pub async fn run(mut self, mut ctx: ExecutionContext) -> UserReport {
        let index = self.state.index;
        let mut report = UserReport {
            index,
            ..Default::default()
        };
        self.state.running = true;
        tracing::debug!(user = index, "virtual user started");

        if !ctx.is_stopping() {
            report.warmup_writes = self.warm_up().await;
        }

        while !ctx.is_stopping() && ctx.claim_behavior() {
            let verdict = self.step().await;
            self.population.stats.record(&verdict);
            report.behaviors += 1;

            let delay = self.population.think.next_delay(&mut self.state.rng);
            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.stopped() => break,
            }
        }

        self.state.running = false;
        tracing::debug!(
            user = index,
            behaviors = report.behaviors,
            "virtual user stopped"
        );
        report
    }

    /// Selects, performs and validates one behavior.
    pub async fn step(&mut self) -> Verdict {
        let population = &*self.population;
        let behavior = population.selector.select(&mut self.state.rng);
        let start = Instant::now();
        let check = behavior
            .action()
            .perform(
                population.executor.as_ref(),
                &population.workload,
                &mut self.state.rng,
            )
            .await;
        let latency = start.elapsed();
        if let Err(reason) = &check {
            tracing::debug!(
                user = self.state.index,
                behavior = behavior.name(),
                %reason,
                "behavior failed"
            );
        }
        Verdict::from_check(behavior.name(), check, latency)
    }

    /// Writes every id of the warm-up domain once. These writes produce no
    /// verdicts; failures are only logged.
    async fn warm_up(&mut self) -> u64 {
        let Some(domain) = self.population.workload.warmup else {
            return 0;
        };
        let mut writes = 0;
        for id in domain.ids() {
            let record =
                ResourceRecord::generate(id, self.population.workload.payload, &mut self.state.rng);
            let outcome = self.population.executor.execute(Request::write(record)).await;
            if let Err(reason) = validate::validate_write(&outcome) {
                tracing::warn!(user = self.state.index, id, %reason, "warm-up write failed");
            }
            writes += 1;
        }
        writes
    }
}
