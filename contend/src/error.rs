//! Error types.
//!
//! Only two things ever change the control flow of a run: a [`ConfigError`] found
//! before any user is spawned, and an explicit stop. Everything that goes wrong while
//! talking to the target is absorbed into a [`crate::metric::Verdict`] instead.

use std::time::Duration;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal, pre-run configuration problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("behavior catalog is empty")]
    EmptyCatalog,

    #[error("behavior `{behavior}` has a zero weight; weights must be positive")]
    ZeroWeight { behavior: String },

    #[error("behavior `{behavior}` appears more than once in the catalog")]
    DuplicateBehavior { behavior: String },

    #[error("resource id domain {start}..={end} is empty")]
    EmptyResourceDomain { start: u32, end: u32 },

    #[error("invalid think time: min {min:?} is greater than max {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("invalid duration for `{field}`: {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("invalid target host `{0}`: expected an http:// or https:// base url")]
    InvalidHost(String),

    #[error("virtual user count must be at least 1")]
    InvalidUserCount,

    #[error("spawn rate must be a positive, finite number of users per second, got {0}")]
    InvalidSpawnRate(f64),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("environment variable {var}: {message}")]
    Env { var: String, message: String },
}

/// Errors that abort a run or prevent it from starting.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("scheduler has already been started")]
    AlreadyStarted,

    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("reporter failed: {0}")]
    Report(String),
}
