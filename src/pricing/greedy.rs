use bitvec::prelude::*;

use super::{ForbiddenPatterns, KnapsackPricer, PricedColumn, PricingProblem};
use crate::error::Result;
use crate::master::{ColumnId, DualPrices, MasterProblem};

/// Density-greedy heuristic over the same constraints as a
/// [`KnapsackPricer`].
///
/// Fills the column with as many copies as fit of each choice in decreasing
/// `value / weight` order. Cheap, but it can miss improving columns, so
/// column generation driven by it may stop above the true LP optimum.
#[derive(Debug, Clone)]
pub struct GreedyPricer {
    inner: KnapsackPricer,
}

impl GreedyPricer {
    pub fn new(inner: KnapsackPricer) -> Self {
        Self { inner }
    }
}

impl PricingProblem for GreedyPricer {
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>> {
        let pricer = &self.inner;
        pricer.validate(master, duals)?;
        let values = pricer.values(duals);

        let mut counts = vec![0u32; pricer.choices().len()];
        let mut chosen = bitvec![0; counts.len()];
        let mut used = 0.0;
        let mut taken = 0u32;

        for choice in pricer.ordering(&values) {
            let wanted = values[choice] > 0.0 || taken < pricer.min_items();
            if !wanted || pricer.conflicts_with(choice, &chosen) {
                continue;
            }
            let weight = pricer.weight(choice);
            let mut copies = pricer.copies(choice);
            if weight > 0.0 {
                let room = ((pricer.capacity() - used) / weight).floor().max(0.0);
                copies = copies.min(room as u32);
            }
            if let Some(max_items) = pricer.max_items() {
                copies = copies.min(max_items.saturating_sub(taken));
            }
            if values[choice] <= 0.0 {
                copies = copies.min(pricer.min_items() - taken);
            }
            if copies == 0 {
                continue;
            }
            counts[choice] = copies;
            chosen.set(choice, true);
            used += weight * f64::from(copies);
            taken += copies;
        }

        if taken < pricer.min_items() {
            return Ok(None);
        }
        let column = pricer.build_column(&counts);
        let forbidden = ForbiddenPatterns::new(master, forbidden);
        if column.is_empty() || forbidden.blocks(&column) {
            return Ok(None);
        }
        Ok(Some(PricedColumn::new(column, duals)))
    }

    fn is_exact(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Item};
    use crate::pricing::ColumnCost;
    use approx::assert_abs_diff_eq;

    fn setup() -> (Vec<Item>, MasterProblem) {
        let items = vec![
            Item::new("w7", 7.0),
            Item::new("w5", 5.0),
            Item::new("w3", 3.0),
        ];
        let mut master = MasterProblem::new(items.clone()).unwrap();
        master.add_column(Column::new(1.0, vec![2, 0, 0])).unwrap();
        (items, master)
    }

    #[test]
    fn test_greedy_can_miss_the_optimum() {
        let (items, master) = setup();
        let duals = DualPrices::new(vec![0.4, 0.25, 0.15], 1);
        let exact = KnapsackPricer::from_items(&items, 20.0, ColumnCost::flat(1.0, 3))
            .with_max_copies(vec![2, 4, 6]);
        let greedy = GreedyPricer::new(exact.clone());

        let heuristic = greedy.price(&master, &duals, &[]).unwrap().unwrap();
        let optimal = exact.price(&master, &duals, &[]).unwrap().unwrap();

        // 2 x 7 + 1 x 5 leaves no room for the better 2 x 3 completion
        assert_eq!(heuristic.column.coverage(), &[2, 1, 0]);
        assert_abs_diff_eq!(heuristic.reduced_cost, -0.05, epsilon = 1e-9);
        assert_abs_diff_eq!(optimal.reduced_cost, -0.1, epsilon = 1e-9);
        assert!(!greedy.is_exact());
        assert!(exact.is_exact());
    }

    #[test]
    fn test_greedy_respects_forbidden_patterns() {
        let (items, mut master) = setup();
        let banned = master.add_column(Column::new(1.0, vec![2, 1, 0])).unwrap();
        let duals = DualPrices::new(vec![0.4, 0.25, 0.15], 2);
        let greedy = GreedyPricer::new(
            KnapsackPricer::from_items(&items, 20.0, ColumnCost::flat(1.0, 3))
                .with_max_copies(vec![2, 4, 6]),
        );
        assert_eq!(greedy.price(&master, &duals, &[banned]).unwrap(), None);
    }

    #[test]
    fn test_greedy_fills_minimum_cardinality() {
        let (items, master) = setup();
        let duals = DualPrices::new(vec![0.0, 0.0, 0.0], 1);
        let greedy = GreedyPricer::new(
            KnapsackPricer::from_items(&items, 20.0, ColumnCost::flat(1.0, 3))
                .with_cardinality(2, None)
                .with_max_copies(vec![2, 4, 6]),
        );
        let priced = greedy.price(&master, &duals, &[]).unwrap().unwrap();
        assert_eq!(priced.column.coverage().iter().sum::<u32>(), 2);
        assert_abs_diff_eq!(priced.reduced_cost, 1.0, epsilon = 1e-9);
    }
}
