use std::time::Duration;

use tokio::time::Instant;

/// Stand-in for "never" when a period does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Time between interval spawns, or `None` if `1 / rate` is not a valid duration.
pub fn spawn_interval(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(rate.recip()).ok()
}

/// How new users are paced while ramping up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SpawnPolicy {
    /// One user every `1 / rate` seconds.
    #[default]
    Interval,
    /// Every `tick`, as many users as `rate * tick` allows, carrying the
    /// fractional remainder to the next tick.
    Batch { tick: Duration },
}

/// Pure function to calculate how many users to spawn this tick.
///
/// Carries any fractional users over to the next tick so the long-term average
/// matches `rate`.
///
/// Returns `(users_to_spawn, next_fractional_part)`.
pub fn calc_spawn_count(rate: f64, tick: Duration, fractional: f64) -> (usize, f64) {
    let add_f = rate * tick.as_secs_f64();
    let add_total_f = (add_f + fractional).floor();
    let fractional = (add_f + fractional) - add_total_f;

    let add_total = if add_total_f < 0.0 {
        0
    } else {
        // `as` saturates at usize::MAX
        add_total_f as usize
    };
    (add_total, fractional)
}

/// Drives the spawn loop: how many users are due now and when the next ones are.
#[derive(Debug)]
pub struct SpawnPacer {
    rate: f64,
    policy: SpawnPolicy,
    next_tick: Instant,
    fractional: f64,
}

impl SpawnPacer {
    pub fn new(rate: f64, policy: SpawnPolicy, start: Instant) -> Self {
        Self {
            rate,
            policy,
            next_tick: start,
            fractional: 0.0,
        }
    }

    /// Users due at the current tick.
    pub fn due(&mut self) -> usize {
        match self.policy {
            SpawnPolicy::Interval => 1,
            SpawnPolicy::Batch { tick } => {
                let (count, fractional) = calc_spawn_count(self.rate, tick, self.fractional);
                self.fractional = fractional;
                count
            }
        }
    }

    /// Moves to the next tick and returns when it is.
    pub fn advance(&mut self) -> Instant {
        let current = self.next_tick;
        self.next_tick = current
            .checked_add(self.period())
            .unwrap_or_else(|| current + FAR_FUTURE);
        self.next_tick
    }

    fn period(&self) -> Duration {
        match self.policy {
            // a rate this slow never spawns a second user
            SpawnPolicy::Interval => spawn_interval(self.rate).unwrap_or(Duration::MAX),
            SpawnPolicy::Batch { tick } => tick,
        }
    }
}
