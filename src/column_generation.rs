use log::{debug, trace, warn};

use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::lp::LpSolver;
use crate::master::{ColumnId, MasterProblem, NodeBounds, RelaxedSolution};
use crate::pricing::{PricedColumn, PricingProblem};

/// States of the column generation loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CgState {
    ComputeDuals,
    Price(RelaxedSolution),
    AddColumn(RelaxedSolution, PricedColumn),
    Converged(RelaxedSolution),
}

/// Relaxed optimum of a master over its final column set.
#[derive(Debug, Clone)]
pub struct CgSolution {
    pub master: MasterProblem,
    pub relaxed: RelaxedSolution,
    /// Relaxed objective after every master solve, in order.
    pub history: Vec<f64>,
    pub iterations: usize,
    pub columns_added: Vec<ColumnId>,
    /// Reduced cost of the last column the pricer offered, if any.
    pub last_reduced_cost: Option<f64>,
}

impl CgSolution {
    pub fn objective(&self) -> f64 {
        self.relaxed.objective
    }

    pub fn values(&self) -> &[f64] {
        &self.relaxed.values
    }
}

pub struct ColumnGenerationSolver<'a, S: ?Sized, P: ?Sized> {
    solver: &'a S,
    pricer: &'a P,
    config: &'a BnpConfig,
}

impl<'a, S, P> ColumnGenerationSolver<'a, S, P>
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    pub fn new(solver: &'a S, pricer: &'a P, config: &'a BnpConfig) -> Self {
        Self {
            solver,
            pricer,
            config,
        }
    }

    /// Alternates master solves and pricing until no improving column is
    /// left, starting from `master` under the branching `bounds`.
    ///
    /// # Errors
    ///
    /// * `InfeasibleMaster` if the relaxed master has no feasible point, or
    ///   artificial columns are still in use after convergence
    /// * `PricingStalled` once `max_cg_iterations` master solves did not
    ///   reach convergence
    /// * any error raised by the LP solver or the pricer
    pub fn solve(&self, mut master: MasterProblem, bounds: &NodeBounds) -> Result<CgSolution> {
        let tolerance = self.config.tolerance;
        let forbidden = master.forbidden_patterns(bounds);
        let mut history = Vec::new();
        let mut columns_added = Vec::new();
        let mut last_reduced_cost = None;
        let mut state = CgState::ComputeDuals;

        let relaxed = loop {
            state = match state {
                CgState::ComputeDuals => {
                    if history.len() >= self.config.max_cg_iterations {
                        let bound = history.last().copied().unwrap_or(f64::INFINITY);
                        warn!(
                            "column generation stalled after {} iterations at {}",
                            history.len(),
                            bound
                        );
                        return Err(Error::PricingStalled {
                            iterations: history.len(),
                            bound,
                        });
                    }
                    let relaxed = master.solve_relaxed(self.solver, bounds)?;
                    debug!(
                        "cg iteration {}: objective {} over {} columns",
                        history.len() + 1,
                        relaxed.objective,
                        master.num_columns()
                    );
                    history.push(relaxed.objective);
                    CgState::Price(relaxed)
                }
                CgState::Price(relaxed) => {
                    match self.pricer.price(&master, &relaxed.duals, &forbidden)? {
                        Some(priced) => {
                            trace!("priced column with reduced cost {}", priced.reduced_cost);
                            last_reduced_cost = Some(priced.reduced_cost);
                            if tolerance.is_improving(priced.reduced_cost) {
                                CgState::AddColumn(relaxed, priced)
                            } else {
                                CgState::Converged(relaxed)
                            }
                        }
                        None => CgState::Converged(relaxed),
                    }
                }
                CgState::AddColumn(relaxed, priced) => match master.add_column(priced.column) {
                    Ok(id) => {
                        columns_added.push(id);
                        CgState::ComputeDuals
                    }
                    Err(Error::DuplicateColumn { existing }) => {
                        // the kept copy costs no more, so with exact duals it
                        // would be improving as well
                        let kept = relaxed.reduced_costs.get(existing.0).copied().unwrap_or(0.0);
                        if tolerance.is_improving(kept) {
                            return Err(Error::SolverFailure(format!(
                                "relaxed master not optimal: {existing} has reduced cost {kept}"
                            )));
                        }
                        warn!(
                            "pricing returned the pattern of {} (reduced cost {}), stopping",
                            existing, priced.reduced_cost
                        );
                        CgState::Converged(relaxed)
                    }
                    Err(e) => return Err(e),
                },
                CgState::Converged(relaxed) => break relaxed,
            };
        };

        if !self.pricer.is_exact() {
            warn!("column generation converged on a heuristic pricer");
        }
        let artificial = master.artificial_usage(&relaxed.values);
        if artificial > tolerance.integrality {
            debug!("converged with artificial usage {artificial}");
            return Err(Error::InfeasibleMaster);
        }

        Ok(CgSolution {
            master,
            relaxed,
            iterations: history.len(),
            history,
            columns_added,
            last_reduced_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::SimplexSolver;
    use crate::model::{Column, Item};
    use crate::pricing::{ColumnCost, ExplicitPricer, GreedyPricer, KnapsackPricer};
    use approx::assert_abs_diff_eq;

    fn flights() -> Vec<Item> {
        vec![
            Item::new("Flight1", 1.0),
            Item::new("Flight2", 1.5),
            Item::new("Flight3", 2.0),
            Item::new("Flight4", 1.25),
        ]
    }

    fn seeded() -> MasterProblem {
        let mut master = MasterProblem::new(flights()).unwrap();
        master.add_column(Column::from_items(300.0, 4, &[0, 1])).unwrap();
        master.add_column(Column::from_items(250.0, 4, &[2, 3])).unwrap();
        master
    }

    #[test]
    fn test_converges_immediately_without_improving_column() {
        let config = BnpConfig::default();
        let solver = SimplexSolver::default();
        let pricer = KnapsackPricer::from_items(&flights(), 5.0, ColumnCost::flat(550.0, 4));
        let cg = ColumnGenerationSolver::new(&solver, &pricer, &config);

        let solution = cg.solve(seeded(), &NodeBounds::default()).unwrap();
        assert_eq!(solution.iterations, 1);
        assert!(solution.columns_added.is_empty());
        assert_abs_diff_eq!(solution.objective(), 550.0, epsilon = 1e-9);
        assert!(solution.last_reduced_cost.unwrap() >= 0.0);
    }

    #[test]
    fn test_stalls_at_iteration_cap() {
        let config = BnpConfig::default().with_max_cg_iterations(1);
        let solver = SimplexSolver::default();
        let pricer = KnapsackPricer::from_items(&flights(), 5.0, ColumnCost::flat(400.0, 4));
        let cg = ColumnGenerationSolver::new(&solver, &pricer, &config);

        match cg.solve(seeded(), &NodeBounds::default()) {
            Err(Error::PricingStalled { iterations, bound }) => {
                assert_eq!(iterations, 1);
                assert_abs_diff_eq!(bound, 550.0, epsilon = 1e-9);
            }
            other => panic!("expected a stall, got {other:?}"),
        }
    }

    #[test]
    fn test_cheaper_copy_of_a_seed_enters_the_master() {
        let config = BnpConfig::default();
        let solver = SimplexSolver::default();
        let pricer = ExplicitPricer::new(vec![Column::from_items(100.0, 4, &[0, 1])]);
        let cg = ColumnGenerationSolver::new(&solver, &pricer, &config);

        let solution = cg.solve(seeded(), &NodeBounds::default()).unwrap();
        assert_eq!(solution.columns_added, vec![ColumnId(2)]);
        assert_abs_diff_eq!(solution.objective(), 350.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.values()[0], 0.0, epsilon = 1e-9);
    }

    /// Offers a copy of an existing pattern with a made-up reduced cost,
    /// as dual round-off would.
    struct RoundOffPricer;

    impl PricingProblem for RoundOffPricer {
        fn price(
            &self,
            _master: &MasterProblem,
            _duals: &crate::master::DualPrices,
            _forbidden: &[ColumnId],
        ) -> Result<Option<PricedColumn>> {
            Ok(Some(PricedColumn {
                column: Column::from_items(300.0, 4, &[0, 1]),
                reduced_cost: -1.0,
            }))
        }
    }

    #[test]
    fn test_costlier_duplicate_counts_as_convergence() {
        let config = BnpConfig::default();
        let solver = SimplexSolver::default();
        let cg = ColumnGenerationSolver::new(&solver, &RoundOffPricer, &config);

        let solution = cg.solve(seeded(), &NodeBounds::default()).unwrap();
        assert!(solution.columns_added.is_empty());
        assert_eq!(solution.master.num_columns(), 2);
        assert_abs_diff_eq!(solution.objective(), 550.0, epsilon = 1e-9);
    }

    #[test]
    fn test_artificial_usage_marks_infeasible() {
        let config = BnpConfig::default();
        let solver = SimplexSolver::default();
        let mut master = MasterProblem::new(flights()).unwrap();
        master.add_artificial_columns(config.artificial_penalty).unwrap();
        // no column ever covers Flight3
        let pricer = ExplicitPricer::new(vec![Column::from_items(300.0, 4, &[0, 1, 3])]);
        let cg = ColumnGenerationSolver::new(&solver, &pricer, &config);

        assert_eq!(
            cg.solve(master, &NodeBounds::default()).unwrap_err(),
            Error::InfeasibleMaster
        );
    }

    #[test]
    fn test_heuristic_pricer_stops_early() {
        let items = vec![
            Item::new("w7", 7.0).with_demand(2.0),
            Item::new("w5", 5.0).with_demand(1.0),
            Item::new("w3", 3.0).with_demand(2.0),
        ];
        let exact = KnapsackPricer::from_items(&items, 20.0, ColumnCost::flat(1.0, 3))
            .with_max_copies(vec![2, 4, 6]);
        let greedy = GreedyPricer::new(exact.clone());
        let config = BnpConfig::default();
        let solver = SimplexSolver::default();

        let seed = || {
            let mut master = MasterProblem::new(items.clone()).unwrap();
            master.add_column(Column::new(1.0, vec![2, 0, 0])).unwrap();
            master.add_column(Column::new(1.0, vec![0, 4, 0])).unwrap();
            master.add_column(Column::new(1.0, vec![0, 0, 6])).unwrap();
            master
        };

        let with_exact = ColumnGenerationSolver::new(&solver, &exact, &config)
            .solve(seed(), &NodeBounds::default())
            .unwrap();
        let with_greedy = ColumnGenerationSolver::new(&solver, &greedy, &config)
            .solve(seed(), &NodeBounds::default())
            .unwrap();

        assert!(with_exact.objective() <= with_greedy.objective() + 1e-9);
        assert!(with_exact.master.is_consistent());
        for window in with_exact.history.windows(2) {
            assert!(window[1] <= window[0] + 1e-9);
        }
    }
}
