use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Named think-time presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkTimeProfile {
    /// 0.5s to 2.0s between behaviors.
    #[default]
    Standard,
    /// 0.1s to 0.5s, for comparison runs. Also switches writes to a fixed record.
    ///
    /// Fast runs report under the same behavior names and endpoint labels as
    /// standard ones and keep the configured weights; compare them by running
    /// them separately.
    Fast,
}

/// Pacing between a virtual user's successive behaviors.
///
/// Every call to [`ThinkTime::next_delay`] draws a fresh delay uniformly from
/// `[min, max]`. `min == max` gives deterministic pacing, including zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    min: Duration,
    max: Duration,
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidThinkTime { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn profile(profile: ThinkTimeProfile) -> Self {
        match profile {
            ThinkTimeProfile::Standard => Self {
                min: Duration::from_millis(500),
                max: Duration::from_secs(2),
            },
            ThinkTimeProfile::Fast => Self {
                min: Duration::from_millis(100),
                max: Duration::from_millis(500),
            },
        }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self::profile(ThinkTimeProfile::Standard)
    }
}
