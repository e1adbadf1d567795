use std::sync::Arc;

use tokio::sync::watch::Receiver;

use crate::{
    aggregate::StatsAggregator,
    config::HarnessConfig,
    error::Result,
    report::{Lifecycle, LifecycleEvent, Snapshot},
    request::{HttpExecutor, Recorded, RequestExecutor},
    scheduler::{RunSummary, Scheduler, SchedulerState, StopHandle},
    selector::WeightedSelector,
    user::Population,
};

/// Glues a validated [`HarnessConfig`] to an executor, a scheduler and a stats sink.
///
/// Everything that can be wrong with the configuration is reported by the
/// constructors; once a `Scenario` exists, [`Scenario::run`] only fails if it is run
/// twice.
pub struct Scenario {
    name: String,
    host: String,
    users: usize,
    population: Arc<Population>,
    scheduler: Scheduler,
    lifecycle: Lifecycle,
}

/// Result of one run: the scheduler's accounting plus the final stats.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub name: String,
    pub run: RunSummary,
    pub snapshot: Snapshot,
}

impl Scenario {
    /// Scenario against `config.host` over HTTP.
    pub fn new(name: impl Into<String>, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let executor = HttpExecutor::new(config.host.clone(), config.request_timeout()?)?;
        Self::with_executor(name, config, Arc::new(executor))
    }

    /// Scenario with a caller-supplied executor, e.g. an in-process target.
    pub fn with_executor(
        name: impl Into<String>,
        config: HarnessConfig,
        executor: Arc<dyn RequestExecutor>,
    ) -> Result<Self> {
        let scheduler = config.scheduler(StopHandle::new())?;
        let stats = Arc::new(StatsAggregator::new());
        let population = Population {
            selector: WeightedSelector::new(Arc::new(config.catalog()?)),
            think: config.think_time()?,
            workload: config.workload()?,
            executor: Arc::new(Recorded::new(executor, stats.clone())),
            stats,
            seed: config.seed,
        };
        Ok(Self {
            name: name.into(),
            host: config.host,
            users: config.users,
            population: Arc::new(population),
            scheduler,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Registers a listener for run start and stop.
    pub fn on_event<F>(mut self, listener: F) -> Self
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.lifecycle.on_event(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    pub fn state(&self) -> Receiver<SchedulerState> {
        self.scheduler.state()
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.population.stats
    }

    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!(scenario = %self.name, host = %self.host, "running scenario");
        self.lifecycle.notify(&LifecycleEvent::Started {
            host: self.host.clone(),
            users: self.users,
        });

        let population = &self.population;
        let run = self.scheduler.run(|index| population.user(index)).await?;

        let snapshot = self.population.stats.snapshot();
        self.lifecycle.notify(&LifecycleEvent::Stopped {
            host: self.host.clone(),
            summary: snapshot.summary(),
        });
        tracing::info!(scenario = %self.name, "done running scenario");

        Ok(RunReport {
            name: self.name.clone(),
            run,
            snapshot,
        })
    }
}
