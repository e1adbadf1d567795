use std::sync::Arc;

use rand::Rng;

use crate::behavior::{Behavior, BehaviorCatalog};

/// Draws behaviors in proportion to their weights.
///
/// Keeps the running totals of the catalog's weights and binary-searches a uniform
/// draw in `[0, total)` against them. The selector itself holds no randomness: every
/// virtual user passes its own generator, so draws are reproducible per user and
/// never contend on a shared source.
#[derive(Debug, Clone)]
pub struct WeightedSelector {
    catalog: Arc<BehaviorCatalog>,
    cumulative: Vec<u64>,
}

impl WeightedSelector {
    pub fn new(catalog: Arc<BehaviorCatalog>) -> Self {
        let cumulative = catalog
            .iter()
            .scan(0u64, |total, behavior| {
                *total += u64::from(behavior.weight());
                Some(*total)
            })
            .collect();
        Self {
            catalog,
            cumulative,
        }
    }

    pub fn catalog(&self) -> &BehaviorCatalog {
        &self.catalog
    }

    /// Index of the next behavior in catalog order.
    pub fn select_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw = rng.random_range(0..self.catalog.total_weight());
        self.cumulative.partition_point(|&edge| edge <= draw)
    }

    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &Behavior {
        let index = self.select_index(rng);
        // The catalog is non-empty and every weight is positive, so the draw always
        // falls below the last running total.
        &self.catalog.as_slice()[index]
    }
}
