//! Pricing subproblems: given the current duals, find the column of least
//! reduced cost.
//!
//! A pricer only reports its best candidate. Whether that candidate is
//! improving is decided by the column generation loop against the
//! configured tolerance, so the same pricer works at any epsilon.

use rayon::prelude::*;

use crate::error::Result;
use crate::master::{ColumnId, DualPrices, MasterProblem};
use crate::model::Column;

pub mod explicit;
pub mod greedy;
pub mod knapsack;

pub use explicit::ExplicitPricer;
pub use greedy::GreedyPricer;
pub use knapsack::{Choice, KnapsackPricer};

/// A candidate column together with its reduced cost under the duals it
/// was priced with.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedColumn {
    pub column: Column,
    pub reduced_cost: f64,
}

impl PricedColumn {
    pub fn new(column: Column, duals: &DualPrices) -> Self {
        let reduced_cost = duals.reduced_cost(&column);
        Self {
            column,
            reduced_cost,
        }
    }
}

pub trait PricingProblem: Send + Sync {
    /// Returns the feasible column of least reduced cost, or `None` when no
    /// feasible column exists. A column repeating the pattern of one of
    /// `forbidden` at no lower cost is never returned.
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>>;

    /// Whether `price` is guaranteed to find the true minimum.
    fn is_exact(&self) -> bool {
        true
    }
}

impl<P: PricingProblem + ?Sized> PricingProblem for Box<P> {
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>> {
        (**self).price(master, duals, forbidden)
    }

    fn is_exact(&self) -> bool {
        (**self).is_exact()
    }
}

/// Linear column cost: `fixed + sum_i per_unit[i] * coverage[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCost {
    pub fixed: f64,
    pub per_unit: Vec<f64>,
}

impl ColumnCost {
    pub fn new(fixed: f64, per_unit: Vec<f64>) -> Self {
        Self { fixed, per_unit }
    }

    /// Every column costs `fixed`, whatever it covers.
    pub fn flat(fixed: f64, num_items: usize) -> Self {
        Self::new(fixed, vec![0.0; num_items])
    }

    pub fn unit(&self, item: usize) -> f64 {
        self.per_unit.get(item).copied().unwrap_or(0.0)
    }

    pub fn of(&self, coverage: &[u32]) -> f64 {
        self.fixed
            + coverage
                .iter()
                .enumerate()
                .map(|(i, &count)| self.unit(i) * f64::from(count))
                .sum::<f64>()
    }
}

/// Patterns of the capped columns a pricer must not hand back.
///
/// A candidate is blocked when it repeats the coverage of a capped column at
/// no lower cost. A strictly cheaper copy is a different variable and stays
/// available.
pub(crate) struct ForbiddenPatterns<'a> {
    patterns: Vec<(&'a [u32], f64)>,
}

impl<'a> ForbiddenPatterns<'a> {
    pub(crate) fn new(master: &'a MasterProblem, forbidden: &[ColumnId]) -> Self {
        let patterns = forbidden
            .iter()
            .filter_map(|&id| master.column(id))
            .map(|column| (column.coverage(), column.cost()))
            .collect();
        Self { patterns }
    }

    pub(crate) fn blocks(&self, column: &Column) -> bool {
        self.patterns
            .iter()
            .any(|&(coverage, cost)| coverage == column.coverage() && column.cost() >= cost - 1e-9)
    }
}

/// Runs several pricers, one per consumer, in parallel and keeps the best
/// candidate. Ties go to the pricer listed first.
pub struct CompositePricer {
    pricers: Vec<Box<dyn PricingProblem>>,
}

impl CompositePricer {
    pub fn new(pricers: Vec<Box<dyn PricingProblem>>) -> Self {
        Self { pricers }
    }

    pub fn len(&self) -> usize {
        self.pricers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pricers.is_empty()
    }
}

impl PricingProblem for CompositePricer {
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>> {
        master.check_duals(duals)?;
        let candidates = self
            .pricers
            .par_iter()
            .map(|pricer| pricer.price(master, duals, forbidden))
            .collect::<Result<Vec<_>>>()?;

        let mut best: Option<PricedColumn> = None;
        for candidate in candidates.into_iter().flatten() {
            if best
                .as_ref()
                .map_or(true, |b| candidate.reduced_cost < b.reduced_cost)
            {
                best = Some(candidate);
            }
        }
        Ok(best)
    }

    fn is_exact(&self) -> bool {
        self.pricers.iter().all(|p| p.is_exact())
    }
}
