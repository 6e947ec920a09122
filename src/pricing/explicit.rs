use super::{ForbiddenPatterns, PricedColumn, PricingProblem};
use crate::error::{Error, Result};
use crate::master::{ColumnId, DualPrices, MasterProblem};
use crate::model::Column;

/// Prices a fixed list of candidate columns by full scan.
///
/// Exact over its candidate set, which makes it the reference pricer for
/// instances small enough to enumerate.
#[derive(Debug, Clone, Default)]
pub struct ExplicitPricer {
    candidates: Vec<Column>,
}

impl ExplicitPricer {
    pub fn new(candidates: Vec<Column>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[Column] {
        &self.candidates
    }
}

impl PricingProblem for ExplicitPricer {
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>> {
        master.check_duals(duals)?;
        if let Some(column) = self
            .candidates
            .iter()
            .find(|c| c.coverage().len() != master.num_items())
        {
            return Err(Error::dimension_mismatch(
                "candidate coverage",
                master.num_items(),
                column.coverage().len(),
            ));
        }

        let forbidden = ForbiddenPatterns::new(master, forbidden);
        let mut best: Option<(f64, &Column)> = None;
        for column in &self.candidates {
            if forbidden.blocks(column) {
                continue;
            }
            let reduced_cost = duals.reduced_cost(column);
            if best.map_or(true, |(rc, _)| reduced_cost < rc) {
                best = Some((reduced_cost, column));
            }
        }
        Ok(best.map(|(reduced_cost, column)| PricedColumn {
            column: column.clone(),
            reduced_cost,
        }))
    }
}
