//! Harness configuration.
//!
//! [`HarnessConfig`] is plain data deserialized from YAML; every field has a default
//! so an empty document is a valid config. [`ConfigLoader`] reads it, applies
//! `CONTEND_*` environment overrides and validates the result. The builder methods
//! (`catalog`, `think_time`, `workload`, `scheduler`) turn it into the engine's
//! types and surface every problem as a [`ConfigError`] before a single user runs.

use std::{path::Path, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::{
    behavior::{Behavior, BehaviorCatalog, BehaviorKind, Workload},
    error::ConfigError,
    resource::{PayloadStyle, ResourceDomain, ResourceId},
    scheduler::{RunLimit, Scheduler, SpawnPolicy, StopHandle, spawn_interval},
    think::{ThinkTime, ThinkTimeProfile},
};

/// Inclusive id range as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RangeConfig {
    pub start: ResourceId,
    pub end: ResourceId,
}

impl RangeConfig {
    pub fn new(start: ResourceId, end: ResourceId) -> Self {
        Self { start, end }
    }

    pub fn domain(&self) -> Result<ResourceDomain, ConfigError> {
        ResourceDomain::new(self.start, self.end)
    }
}

/// Explicit think-time bounds in seconds; overrides the profile when set.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThinkTimeConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

/// Behavior weights. A missing weight leaves the behavior out of the catalog; a
/// zero weight is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub read: Option<u32>,
    pub write: Option<u32>,
    pub read_after_write: Option<u32>,
    pub health: Option<u32>,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            read: Some(7),
            write: Some(3),
            read_after_write: Some(1),
            health: Some(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Base url of the target, e.g. `http://localhost:8080`.
    pub host: String,
    pub users: usize,
    /// Users spawned per second while ramping up.
    pub spawn_rate: f64,
    /// Spawn in batches every this many milliseconds instead of one at a time.
    pub spawn_batch_tick_ms: Option<u64>,
    /// Wall-clock length of the run. Unset means until stopped.
    pub duration_secs: Option<f64>,
    /// Total behaviors across all users.
    pub max_behaviors: Option<u64>,
    pub profile: ThinkTimeProfile,
    pub think_time: Option<ThinkTimeConfig>,
    pub resource_ids: RangeConfig,
    /// Ids the read-after-write probe draws from.
    pub contention_ids: RangeConfig,
    /// Ids each user writes once before its loop. `null` disables warm-up.
    pub warmup_ids: Option<RangeConfig>,
    pub weights: WeightsConfig,
    pub seed: u64,
    pub request_timeout_secs: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            users: 10,
            spawn_rate: 1.0,
            spawn_batch_tick_ms: None,
            duration_secs: None,
            max_behaviors: None,
            profile: ThinkTimeProfile::Standard,
            think_time: None,
            resource_ids: RangeConfig::new(1, 20),
            contention_ids: RangeConfig::new(1, 5),
            warmup_ids: Some(RangeConfig::new(1, 5)),
            weights: WeightsConfig::default(),
            seed: 0,
            request_timeout_secs: 10.0,
        }
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { field, value })
}

impl HarnessConfig {
    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        self.catalog()?;
        self.think_time()?;
        self.workload()?;
        self.run_limit()?;
        self.request_timeout()?;
        self.spawn_policy()?;
        if self.users == 0 {
            return Err(ConfigError::InvalidUserCount);
        }
        let rate = self.spawn_rate;
        if !(rate.is_finite() && rate > 0.0) || spawn_interval(rate).is_none() {
            return Err(ConfigError::InvalidSpawnRate(self.spawn_rate));
        }
        Ok(())
    }

    /// Behaviors in a fixed order: read, write, read-after-write, health.
    pub fn catalog(&self) -> Result<BehaviorCatalog, ConfigError> {
        let w = &self.weights;
        let behaviors = [
            (BehaviorKind::Read, w.read),
            (BehaviorKind::Write, w.write),
            (BehaviorKind::ReadAfterWrite, w.read_after_write),
            (BehaviorKind::HealthCheck, w.health),
        ]
        .into_iter()
        .filter_map(|(kind, weight)| weight.map(|weight| Behavior::of(kind, weight)))
        .collect();
        BehaviorCatalog::new(behaviors)
    }

    pub fn think_time(&self) -> Result<ThinkTime, ConfigError> {
        match self.think_time {
            Some(ThinkTimeConfig { min_secs, max_secs }) => ThinkTime::new(
                seconds("think_time.min_secs", min_secs)?,
                seconds("think_time.max_secs", max_secs)?,
            ),
            None => Ok(ThinkTime::profile(self.profile)),
        }
    }

    pub fn workload(&self) -> Result<Workload, ConfigError> {
        let payload = match self.profile {
            ThinkTimeProfile::Standard => PayloadStyle::Random,
            ThinkTimeProfile::Fast => PayloadStyle::Fixed,
        };
        Ok(Workload {
            resources: self.resource_ids.domain()?,
            contention: self.contention_ids.domain()?,
            warmup: self.warmup_ids.map(|r| r.domain()).transpose()?,
            payload,
        })
    }

    pub fn run_limit(&self) -> Result<RunLimit, ConfigError> {
        Ok(RunLimit {
            duration: self
                .duration_secs
                .map(|secs| seconds("duration_secs", secs))
                .transpose()?,
            max_behaviors: self.max_behaviors,
        })
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        seconds("request_timeout_secs", self.request_timeout_secs)
    }

    pub fn spawn_policy(&self) -> Result<SpawnPolicy, ConfigError> {
        match self.spawn_batch_tick_ms {
            None => Ok(SpawnPolicy::Interval),
            Some(0) => Err(ConfigError::InvalidDuration {
                field: "spawn_batch_tick_ms",
                value: 0.0,
            }),
            Some(ms) => Ok(SpawnPolicy::Batch {
                tick: Duration::from_millis(ms),
            }),
        }
    }

    /// A scheduler for this config that listens to `stop`.
    pub fn scheduler(&self, stop: StopHandle) -> Result<Scheduler, ConfigError> {
        self.validate()?;
        Ok(Scheduler::builder()
            .users(self.users)
            .spawn_rate(self.spawn_rate)
            .spawn_policy(self.spawn_policy()?)
            .limit(self.run_limit()?)
            .stop(stop)
            .build())
    }
}

/// Loads [`HarnessConfig`] from YAML with environment overrides.
///
/// Recognised variables, with the default `CONTEND` prefix: `CONTEND_HOST`,
/// `CONTEND_USERS`, `CONTEND_SPAWN_RATE`, `CONTEND_DURATION_SECS`,
/// `CONTEND_MAX_BEHAVIORS`, `CONTEND_SEED` and `CONTEND_PROFILE` (`standard` or
/// `fast`).
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_prefix("CONTEND")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_file(&self, path: impl AsRef<Path>) -> Result<HarnessConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml_str(&content)
    }

    pub fn from_yaml_str(&self, yaml: &str) -> Result<HarnessConfig, ConfigError> {
        let config = if yaml.trim().is_empty() {
            HarnessConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        self.finish(config, |var| std::env::var(var).ok())
    }

    /// Defaults plus environment overrides.
    pub fn from_env(&self) -> Result<HarnessConfig, ConfigError> {
        self.finish(HarnessConfig::default(), |var| std::env::var(var).ok())
    }

    pub fn load(&self, path: Option<impl AsRef<Path>>) -> Result<HarnessConfig, ConfigError> {
        match path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn finish<F>(&self, mut config: HarnessConfig, lookup: F) -> Result<HarnessConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides found through `lookup`, which maps a full variable name to
    /// its value.
    pub fn apply_overrides<F>(&self, config: &mut HarnessConfig, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}_{name}", self.prefix);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, host)) = var("HOST") {
            config.host = host;
        }
        if let Some((key, value)) = var("USERS") {
            config.users = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("SPAWN_RATE") {
            config.spawn_rate = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("DURATION_SECS") {
            config.duration_secs = Some(parse(&key, &value)?);
        }
        if let Some((key, value)) = var("MAX_BEHAVIORS") {
            config.max_behaviors = Some(parse(&key, &value)?);
        }
        if let Some((key, value)) = var("SEED") {
            config.seed = parse(&key, &value)?;
        }
        if let Some((key, value)) = var("PROFILE") {
            config.profile = match value.to_ascii_lowercase().as_str() {
                "standard" => ThinkTimeProfile::Standard,
                "fast" => ThinkTimeProfile::Fast,
                other => {
                    return Err(ConfigError::Env {
                        var: key,
                        message: format!("unknown profile `{other}`, expected standard or fast"),
                    });
                }
            };
        }
        Ok(())
    }
}

fn parse<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: format!("invalid value `{value}`: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_product_api_mix() {
        let config = HarnessConfig::default();
        config.validate().unwrap();
        assert_eq!(config.catalog().unwrap(), BehaviorCatalog::standard());
        assert_eq!(config.think_time().unwrap(), ThinkTime::profile(ThinkTimeProfile::Standard));
        let workload = config.workload().unwrap();
        assert_eq!(workload.resources.len(), 20);
        assert_eq!(workload.contention.len(), 5);
        assert_eq!(workload.warmup.map(|d| d.len()), Some(5));
        assert_eq!(config.run_limit().unwrap(), RunLimit::default());
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn parses_yaml() {
        let yaml = r#"
host: http://target:9000
users: 5
spawn_rate: 2.5
duration_secs: 30
profile: fast
resource_ids: { start: 1, end: 5 }
warmup_ids: null
weights:
  read: 7
  write: 3
  read_after_write: 1
  health: null
seed: 42
"#;
        let config = ConfigLoader::with_prefix("CONTEND_TEST_UNSET")
            .from_yaml_str(yaml)
            .unwrap();
        assert_eq!(config.host, "http://target:9000");
        assert_eq!(config.users, 5);
        assert_eq!(config.seed, 42);
        assert_eq!(config.catalog().unwrap().len(), 3);
        assert_eq!(config.catalog().unwrap().total_weight(), 11);
        assert_eq!(config.workload().unwrap().warmup, None);
        assert_eq!(config.workload().unwrap().payload, PayloadStyle::Fixed);
        assert_eq!(config.think_time().unwrap().max(), Duration::from_millis(500));
        assert_eq!(
            config.run_limit().unwrap().duration,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn empty_document_is_default() {
        let config = ConfigLoader::with_prefix("CONTEND_TEST_UNSET")
            .from_yaml_str("")
            .unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = ConfigLoader::with_prefix("CONTEND_TEST_UNSET")
            .from_yaml_str("userz: 3")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let loader = ConfigLoader::new();
        let mut config = HarnessConfig::default();
        loader
            .apply_overrides(
                &mut config,
                env(&[
                    ("CONTEND_HOST", "https://staging.example"),
                    ("CONTEND_USERS", "25"),
                    ("CONTEND_SPAWN_RATE", "5"),
                    ("CONTEND_SEED", "7"),
                    ("CONTEND_PROFILE", "FAST"),
                    ("CONTEND_MAX_BEHAVIORS", "1000"),
                ]),
            )
            .unwrap();
        assert_eq!(config.host, "https://staging.example");
        assert_eq!(config.users, 25);
        assert_eq!(config.spawn_rate, 5.0);
        assert_eq!(config.seed, 7);
        assert_eq!(config.profile, ThinkTimeProfile::Fast);
        assert_eq!(config.max_behaviors, Some(1000));
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let mut config = HarnessConfig::default();
        let err = ConfigLoader::new()
            .apply_overrides(&mut config, env(&[("CONTEND_USERS", "many")]))
            .unwrap_err();
        match err {
            ConfigError::Env { var, .. } => assert_eq!(var, "CONTEND_USERS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_configs_are_rejected() {
        fn rejected(config: HarnessConfig) -> ConfigError {
            config.validate().unwrap_err()
        }

        assert!(matches!(
            rejected(HarnessConfig {
                host: "localhost:8080".into(),
                ..Default::default()
            }),
            ConfigError::InvalidHost(_)
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                users: 0,
                ..Default::default()
            }),
            ConfigError::InvalidUserCount
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                spawn_rate: 0.0,
                ..Default::default()
            }),
            ConfigError::InvalidSpawnRate(_)
        ));
        // 1 / rate overflows a Duration
        assert!(matches!(
            rejected(HarnessConfig {
                spawn_rate: 1e-20,
                ..Default::default()
            }),
            ConfigError::InvalidSpawnRate(_)
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                weights: WeightsConfig {
                    write: Some(0),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ConfigError::ZeroWeight { behavior } if behavior == "write"
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                weights: WeightsConfig {
                    read: None,
                    write: None,
                    read_after_write: None,
                    health: None,
                },
                ..Default::default()
            }),
            ConfigError::EmptyCatalog
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                resource_ids: RangeConfig::new(10, 1),
                ..Default::default()
            }),
            ConfigError::EmptyResourceDomain { start: 10, end: 1 }
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                think_time: Some(ThinkTimeConfig {
                    min_secs: 2.0,
                    max_secs: 1.0,
                }),
                ..Default::default()
            }),
            ConfigError::InvalidThinkTime { .. }
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                duration_secs: Some(-1.0),
                ..Default::default()
            }),
            ConfigError::InvalidDuration {
                field: "duration_secs",
                ..
            }
        ));
        assert!(matches!(
            rejected(HarnessConfig {
                spawn_batch_tick_ms: Some(0),
                ..Default::default()
            }),
            ConfigError::InvalidDuration { .. }
        ));
    }

    #[test]
    fn fast_profile_changes_pacing_and_payload_only() {
        let standard = HarnessConfig::default();
        let fast = HarnessConfig {
            profile: ThinkTimeProfile::Fast,
            ..Default::default()
        };
        assert_eq!(fast.catalog().unwrap(), standard.catalog().unwrap());
        assert_eq!(fast.think_time().unwrap(), ThinkTime::profile(ThinkTimeProfile::Fast));
        assert_eq!(fast.workload().unwrap().payload, PayloadStyle::Fixed);
        assert_eq!(standard.workload().unwrap().payload, PayloadStyle::Random);
    }

    #[test]
    fn batch_spawn_policy_from_tick() {
        let config = HarnessConfig {
            spawn_batch_tick_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(
            config.spawn_policy().unwrap(),
            SpawnPolicy::Batch {
                tick: Duration::from_millis(250)
            }
        );
    }
}
