//! The weighted behaviors a virtual user can perform.
//!
//! The catalog is built once, explicitly, at startup: an ordered list of
//! `{name, weight, action}` records. It is immutable afterwards and shared read-only
//! between all users.

use std::{borrow::Cow, collections::HashSet, slice};

use rand::Rng;

use crate::{
    error::ConfigError,
    request::{Request, RequestExecutor},
    resource::{PayloadStyle, ResourceDomain, ResourceRecord},
    validate::{self, Check},
};

/// What a behavior actually does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    Read,
    Write,
    /// Write an id, then immediately read it back.
    ReadAfterWrite,
    HealthCheck,
}

impl BehaviorKind {
    pub fn default_name(&self) -> &'static str {
        match self {
            BehaviorKind::Read => "read",
            BehaviorKind::Write => "write",
            BehaviorKind::ReadAfterWrite => "read_after_write",
            BehaviorKind::HealthCheck => "health_check",
        }
    }

    /// Runs the behavior's requests sequentially and validates them.
    pub async fn perform<E, R>(self, executor: &E, workload: &Workload, rng: &mut R) -> Check
    where
        E: RequestExecutor + ?Sized,
        R: Rng + ?Sized,
    {
        match self {
            BehaviorKind::Read => {
                let id = workload.resources.pick(rng);
                let outcome = executor.execute(Request::read(id)).await;
                validate::validate_read(&outcome, id)
            }
            BehaviorKind::Write => {
                let id = workload.resources.pick(rng);
                let record = ResourceRecord::generate(id, workload.payload, rng);
                let outcome = executor.execute(Request::write(record)).await;
                validate::validate_write(&outcome)
            }
            BehaviorKind::ReadAfterWrite => {
                let id = workload.contention.pick(rng);
                let record = ResourceRecord::generate(id, workload.payload, rng);
                let write = executor.execute(Request::write(record)).await;
                // Only a read that follows this user's own acknowledged write says
                // anything about the target's locking.
                validate::validate_write(&write).map_err(|reason| {
                    if write.is_transport_error() {
                        reason
                    } else {
                        format!("write before read failed: {reason}")
                    }
                })?;
                let read = executor.execute(Request::read_after_write(id)).await;
                validate::validate_read_after_write(&read)
            }
            BehaviorKind::HealthCheck => {
                let outcome = executor.execute(Request::health()).await;
                validate::validate_health(&outcome)
            }
        }
    }
}

/// A named, weighted unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    name: Cow<'static, str>,
    weight: u32,
    action: BehaviorKind,
}

impl Behavior {
    pub fn new(name: impl Into<Cow<'static, str>>, weight: u32, action: BehaviorKind) -> Self {
        Self {
            name: name.into(),
            weight,
            action,
        }
    }

    /// A behavior named after its action.
    pub fn of(action: BehaviorKind, weight: u32) -> Self {
        Self::new(action.default_name(), weight, action)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn action(&self) -> BehaviorKind {
        self.action
    }
}

/// Ordered, validated set of behaviors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorCatalog {
    behaviors: Vec<Behavior>,
    total_weight: u64,
}

impl BehaviorCatalog {
    pub fn new(behaviors: Vec<Behavior>) -> Result<Self, ConfigError> {
        if behaviors.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if let Some(b) = behaviors.iter().find(|b| b.weight == 0) {
            return Err(ConfigError::ZeroWeight {
                behavior: b.name().to_string(),
            });
        }
        // verdicts are keyed by name
        let mut names = HashSet::with_capacity(behaviors.len());
        if let Some(b) = behaviors.iter().find(|b| !names.insert(b.name())) {
            return Err(ConfigError::DuplicateBehavior {
                behavior: b.name().to_string(),
            });
        }
        let total_weight = behaviors.iter().map(|b| u64::from(b.weight)).sum();
        Ok(Self {
            behaviors,
            total_weight,
        })
    }

    /// read 7, write 3, read-after-write 1, health 1.
    pub fn standard() -> Self {
        Self {
            behaviors: vec![
                Behavior::of(BehaviorKind::Read, 7),
                Behavior::of(BehaviorKind::Write, 3),
                Behavior::of(BehaviorKind::ReadAfterWrite, 1),
                Behavior::of(BehaviorKind::HealthCheck, 1),
            ],
            total_weight: 12,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Always false; an empty catalog cannot be constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn as_slice(&self) -> &[Behavior] {
        &self.behaviors
    }

    pub fn get(&self, index: usize) -> Option<&Behavior> {
        self.behaviors.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Behavior> {
        self.behaviors.iter()
    }
}

impl<'a> IntoIterator for &'a BehaviorCatalog {
    type Item = &'a Behavior;
    type IntoIter = slice::Iter<'a, Behavior>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The id domains and payload policy behaviors draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
    /// Ids used by plain reads and writes.
    pub resources: ResourceDomain,
    /// Narrower range used by the read-after-write probe.
    pub contention: ResourceDomain,
    /// Ids each user writes once before entering its loop.
    pub warmup: Option<ResourceDomain>,
    pub payload: PayloadStyle,
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::request::{Endpoint, Outcome};

    /// Fixed statuses for writes and read-after-write probes; records every endpoint
    /// it is asked for.
    struct Scripted {
        write_status: u16,
        after_write_status: u16,
        seen: Mutex<Vec<Endpoint>>,
    }

    impl Scripted {
        fn new(write_status: u16, after_write_status: u16) -> Self {
            Self {
                write_status,
                after_write_status,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RequestExecutor for Scripted {
        async fn execute(&self, request: Request) -> Outcome {
            self.seen.lock().unwrap().push(request.endpoint);
            let (status, body) = match request.endpoint {
                Endpoint::Write(_) => (self.write_status, String::new()),
                Endpoint::Read(id) => (200, format!(r#"{{"product_id":{id}}}"#)),
                Endpoint::ReadAfterWrite(id) => {
                    (self.after_write_status, format!(r#"{{"product_id":{id}}}"#))
                }
                Endpoint::Health => (200, String::new()),
            };
            Outcome::response(request.endpoint, status, body.into_bytes(), Duration::ZERO)
        }
    }

    fn workload() -> Workload {
        Workload {
            resources: ResourceDomain::new(1, 20).unwrap(),
            contention: ResourceDomain::new(1, 5).unwrap(),
            warmup: None,
            payload: PayloadStyle::Random,
        }
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(
            BehaviorCatalog::new(vec![]),
            Err(ConfigError::EmptyCatalog)
        ));
    }

    #[test]
    fn zero_weight_is_rejected() {
        let err = BehaviorCatalog::new(vec![
            Behavior::of(BehaviorKind::Read, 7),
            Behavior::of(BehaviorKind::HealthCheck, 0),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWeight { behavior } if behavior == "health_check"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = BehaviorCatalog::new(vec![
            Behavior::of(BehaviorKind::Read, 7),
            Behavior::new("read", 1, BehaviorKind::ReadAfterWrite),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBehavior { behavior } if behavior == "read"));

        // the same action under distinct names is fine
        let catalog = BehaviorCatalog::new(vec![
            Behavior::new("hot_read", 5, BehaviorKind::Read),
            Behavior::new("cold_read", 1, BehaviorKind::Read),
        ])
        .unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn standard_catalog_matches_explicit_construction() {
        let explicit = BehaviorCatalog::new(vec![
            Behavior::of(BehaviorKind::Read, 7),
            Behavior::of(BehaviorKind::Write, 3),
            Behavior::of(BehaviorKind::ReadAfterWrite, 1),
            Behavior::of(BehaviorKind::HealthCheck, 1),
        ])
        .unwrap();
        assert_eq!(explicit, BehaviorCatalog::standard());
        assert_eq!(explicit.total_weight(), 12);
    }

    #[tokio::test]
    async fn read_after_write_writes_then_reads_same_id() {
        let executor = Arc::new(Scripted::new(204, 200));
        let mut rng = StdRng::seed_from_u64(42);
        let check = BehaviorKind::ReadAfterWrite
            .perform(executor.as_ref(), &workload(), &mut rng)
            .await;
        assert_eq!(check, Ok(()));

        let seen = executor.seen.lock().unwrap();
        match seen.as_slice() {
            [Endpoint::Write(w), Endpoint::ReadAfterWrite(r)] => {
                assert_eq!(w, r);
                assert!((1..=5).contains(w));
            }
            other => panic!("unexpected request sequence: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_after_write_skips_read_when_write_is_rejected() {
        let executor = Scripted::new(500, 200);
        let mut rng = StdRng::seed_from_u64(1);
        let check = BehaviorKind::ReadAfterWrite
            .perform(&executor, &workload(), &mut rng)
            .await;
        assert_eq!(
            check,
            Err("write before read failed: expected 204, got 500".to_string())
        );
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_after_write_flags_missing_record() {
        let executor = Scripted::new(204, 404);
        let mut rng = StdRng::seed_from_u64(5);
        let reason = BehaviorKind::ReadAfterWrite
            .perform(&executor, &workload(), &mut rng)
            .await
            .unwrap_err();
        assert!(reason.contains(validate::EXPECTED_EXISTENCE));
    }

    #[tokio::test]
    async fn plain_behaviors_issue_one_request() {
        for kind in [
            BehaviorKind::Read,
            BehaviorKind::Write,
            BehaviorKind::HealthCheck,
        ] {
            let executor = Scripted::new(204, 200);
            let mut rng = StdRng::seed_from_u64(7);
            assert_eq!(kind.perform(&executor, &workload(), &mut rng).await, Ok(()));
            assert_eq!(executor.seen.lock().unwrap().len(), 1, "{kind:?}");
        }
    }
}
