use log::{debug, trace};

use super::incumbent::{round_integral, Incumbent};
use crate::column_generation::ColumnGenerationSolver;
use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::lp::branch_and_bound::most_fractional;
use crate::lp::LpSolver;
use crate::master::{ColumnId, MasterProblem, NodeBounds};
use crate::model::CoverSense;
use crate::pricing::PricingProblem;

/// A live node of the branch-and-price tree: the column set at the time of
/// branching plus the usage bounds its branching decisions impose.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) master: MasterProblem,
    pub(crate) bounds: NodeBounds,
    /// Relaxed bound of the parent; a lower bound on anything below.
    pub(crate) bound: f64,
    pub(crate) depth: usize,
    pub(crate) seq: usize,
}

impl Node {
    pub fn new(master: MasterProblem, bounds: NodeBounds, bound: f64, depth: usize) -> Self {
        Self {
            master,
            bounds,
            bound,
            depth,
            seq: 0,
        }
    }

    pub fn root(master: MasterProblem) -> Self {
        Self::new(master, NodeBounds::default(), f64::NEG_INFINITY, 0)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }
}

#[derive(Debug)]
pub(crate) enum NodeOutcome {
    /// The relaxed bound cannot beat the incumbent.
    Pruned,
    Infeasible,
    /// The node was dropped on a recoverable error.
    Failed(Error),
    Integer(Incumbent),
    Branched([Node; 2]),
}

#[derive(Debug)]
pub(crate) struct NodeReport {
    pub outcome: NodeOutcome,
    pub depth: usize,
    /// Converged relaxed bound, when column generation completed.
    pub bound: Option<f64>,
    pub cg_iterations: usize,
    pub columns_added: usize,
    /// Integer solution found by the root primal heuristics.
    pub heuristic: Option<Incumbent>,
}

/// Borrowed collaborators every node is processed with.
pub(crate) struct Context<'a, S: ?Sized, P: ?Sized> {
    pub solver: &'a S,
    pub pricer: &'a P,
    pub config: &'a BnpConfig,
}

impl<S: ?Sized, P: ?Sized> Clone for Context<'_, S, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized, P: ?Sized> Copy for Context<'_, S, P> {}

impl<'a, S, P> Context<'a, S, P>
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    fn is_pruned(&self, bound: f64, cutoff: f64) -> bool {
        bound >= cutoff - self.config.tolerance.integrality
    }

    /// Solves `node` by column generation and decides what becomes of it.
    ///
    /// `cutoff` is the incumbent objective (or infinity). Only errors that
    /// concern the whole search are returned as `Err`.
    pub fn process(&self, node: Node, cutoff: f64) -> Result<NodeReport> {
        let depth = node.depth;
        let mut report = NodeReport {
            outcome: NodeOutcome::Pruned,
            depth,
            bound: None,
            cg_iterations: 0,
            columns_added: 0,
            heuristic: None,
        };
        if self.is_pruned(node.bound, cutoff) {
            return Ok(report);
        }

        let run_heuristics = depth == 0 && self.config.primal_heuristics;
        // column set to fall back on if the root relaxation fails
        let entry_master = run_heuristics.then(|| node.master.clone());

        let cg = ColumnGenerationSolver::new(self.solver, self.pricer, self.config);
        let solution = match cg.solve(node.master, &node.bounds) {
            Ok(solution) => solution,
            Err(Error::InfeasibleMaster) => {
                debug!("node at depth {depth} is infeasible");
                report.outcome = NodeOutcome::Infeasible;
                return Ok(report);
            }
            Err(e) if e.is_node_local() => {
                debug!("node at depth {depth} dropped: {e}");
                if let Some(master) = &entry_master {
                    report.heuristic = self.root_heuristics(master, None, &node.bounds);
                }
                report.outcome = NodeOutcome::Failed(e);
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        report.cg_iterations = solution.iterations;
        report.columns_added = solution.columns_added.len();

        let bound = self.config.effective_bound(solution.objective());
        report.bound = Some(bound);
        if run_heuristics {
            report.heuristic =
                self.root_heuristics(&solution.master, Some(solution.values()), &node.bounds);
        }
        if self.is_pruned(bound, cutoff) {
            debug!("node at depth {depth} pruned by bound {bound}");
            return Ok(report);
        }

        let tolerance = &self.config.tolerance;
        report.outcome = match most_fractional(solution.values(), tolerance) {
            None => match self.accept(solution.master, solution.relaxed.values) {
                Some(incumbent) => {
                    debug!(
                        "integer node at depth {depth} with objective {}",
                        incumbent.objective
                    );
                    NodeOutcome::Integer(incumbent)
                }
                None => NodeOutcome::Infeasible,
            },
            Some(var) => {
                let value = solution.values()[var];
                trace!("branching on column#{var} at {value}");
                NodeOutcome::Branched(branch(
                    solution.master,
                    &node.bounds,
                    ColumnId(var),
                    value,
                    bound,
                    depth,
                ))
            }
        };
        Ok(report)
    }

    /// Rounds `values` and keeps them if they form a valid integer solution.
    fn accept(&self, master: MasterProblem, values: Vec<f64>) -> Option<Incumbent> {
        let tolerance = &self.config.tolerance;
        let rounded = round_integral(&values, tolerance.integrality)?;
        let valid = master.is_covering_satisfied(&rounded, tolerance.integrality)
            && tolerance.is_zero(master.artificial_usage(&rounded));
        valid.then(|| Incumbent::new(master, rounded))
    }

    /// Round-up of a pure covering relaxed solution, when there is one, and
    /// an integer solve over the root column set.
    fn root_heuristics(
        &self,
        master: &MasterProblem,
        relaxed: Option<&[f64]>,
        bounds: &NodeBounds,
    ) -> Option<Incumbent> {
        let tolerance = &self.config.tolerance;
        let mut best: Option<Incumbent> = None;

        let covering = master.items().iter().all(|item| item.sense == CoverSense::Cover);
        if let Some(values) = relaxed.filter(|_| covering) {
            let rounded: Vec<f64> = values
                .iter()
                .map(|&v| (v - tolerance.integrality).ceil().max(0.0))
                .collect();
            if let Some(candidate) = self.accept(master.clone(), rounded) {
                debug!("round-up heuristic found {}", candidate.objective);
                best = Some(candidate);
            }
        }

        match master.solve_integer(
            self.solver,
            bounds,
            tolerance,
            self.config.heuristic_node_limit,
        ) {
            Ok(integer) if integer.has_solution() => {
                if let Some(candidate) = self.accept(master.clone(), integer.primal) {
                    debug!("restricted integer master found {}", candidate.objective);
                    if candidate.improves(best.as_ref()) {
                        best = Some(candidate);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => debug!("restricted integer master failed: {e}"),
        }
        best
    }
}

/// Children of a node whose relaxed usage of `column` is the fractional
/// `value`: the first caps it at `floor(value)`, the second forces at least
/// `ceil(value)`. The second pops first under depth-first selection.
fn branch(
    master: MasterProblem,
    bounds: &NodeBounds,
    column: ColumnId,
    value: f64,
    bound: f64,
    depth: usize,
) -> [Node; 2] {
    let mut down = bounds.clone();
    down.set_upper(column, value.floor());
    let mut up = bounds.clone();
    up.set_lower(column, value.ceil());
    [
        Node::new(master.clone(), down, bound, depth + 1),
        Node::new(master, up, bound, depth + 1),
    ]
}
