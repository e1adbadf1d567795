//! Resource identifiers and the records written to them.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identifier of one resource on the target.
pub type ResourceId = u32;

const MANUFACTURERS: [&str; 10] = [
    "Apple",
    "Samsung",
    "Dell",
    "HP",
    "Lenovo",
    "Sony",
    "LG",
    "Microsoft",
    "Google",
    "Amazon",
];

/// A non-empty, inclusive range of resource ids.
///
/// Smaller domains mean more users land on the same id, which is how contention is
/// dialled up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDomain {
    start: ResourceId,
    end: ResourceId,
}

impl ResourceDomain {
    pub fn new(start: ResourceId, end: ResourceId) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::EmptyResourceDomain { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> ResourceId {
        self.start
    }

    pub fn end(&self) -> ResourceId {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false; an empty domain cannot be constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Draws an id uniformly from the domain.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> ResourceId {
        rng.random_range(self.start..=self.end)
    }

    pub fn ids(&self) -> RangeInclusive<ResourceId> {
        self.start..=self.end
    }
}

/// How write payloads are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStyle {
    /// Randomized secondary key and attributes on every write.
    #[default]
    Random,
    /// The same record for a given id every time.
    Fixed,
}

/// The body sent with a write. The harness keeps it only long enough to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub product_id: ResourceId,
    pub sku: String,
    pub manufacturer: String,
    pub category_id: u32,
    pub weight: u32,
    pub some_other_id: u32,
}

impl ResourceRecord {
    pub fn generate<R: Rng + ?Sized>(id: ResourceId, style: PayloadStyle, rng: &mut R) -> Self {
        match style {
            PayloadStyle::Random => Self::random(id, rng),
            PayloadStyle::Fixed => Self::fixed(id),
        }
    }

    pub fn random<R: Rng + ?Sized>(id: ResourceId, rng: &mut R) -> Self {
        let manufacturer = MANUFACTURERS[rng.random_range(0..MANUFACTURERS.len())];
        Self {
            product_id: id,
            sku: format!("SKU-{id:03}-{}", rng.random_range(1000..=9999)),
            manufacturer: manufacturer.to_string(),
            category_id: rng.random_range(1..=10),
            weight: rng.random_range(100..=5000),
            some_other_id: rng.random_range(1..=100),
        }
    }

    pub fn fixed(id: ResourceId) -> Self {
        Self {
            product_id: id,
            sku: format!("FAST-{id:03}"),
            manufacturer: "FastCo".to_string(),
            category_id: 1,
            weight: 100,
            some_other_id: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn inverted_domain_is_rejected() {
        let err = ResourceDomain::new(5, 1).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EmptyResourceDomain { start: 5, end: 1 }
        ));
    }

    #[test]
    fn single_id_domain_always_picks_that_id() {
        let domain = ResourceDomain::new(7, 7).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(domain.len(), 1);
        for _ in 0..100 {
            assert_eq!(domain.pick(&mut rng), 7);
        }
    }

    #[test]
    fn picks_stay_inside_domain() {
        let domain = ResourceDomain::new(1, 20).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            assert!(domain.ids().contains(&domain.pick(&mut rng)));
        }
    }

    #[test]
    fn random_record_fields_are_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for id in 1..=20 {
            let record = ResourceRecord::random(id, &mut rng);
            assert_eq!(record.product_id, id);
            assert!(record.sku.starts_with(&format!("SKU-{id:03}-")));
            assert!(MANUFACTURERS.contains(&record.manufacturer.as_str()));
            assert!((1..=10).contains(&record.category_id));
            assert!((100..=5000).contains(&record.weight));
            assert!((1..=100).contains(&record.some_other_id));
        }
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let value = serde_json::to_value(ResourceRecord::fixed(4)).unwrap();
        assert_eq!(value["product_id"], 4);
        assert_eq!(value["sku"], "FAST-004");
        assert_eq!(value["manufacturer"], "FastCo");
    }
}
