//! Branch-and-price: depth-first or best-bound search over usage bounds,
//! with every node's relaxation solved by column generation.
//!
//! The tree branches on the most fractional usage variable. One child caps
//! the column at the floor of its value (a cap of zero removes the pattern
//! from pricing), the other forces at least the ceiling. Nodes whose bound
//! cannot beat the incumbent are pruned.
//!
//! # Example
//!
//! ```
//! use crew_bnp::branching::BranchAndPrice;
//! use crew_bnp::config::BnpConfig;
//! use crew_bnp::lp::SimplexSolver;
//! use crew_bnp::master::MasterProblem;
//! use crew_bnp::model::{Column, Item};
//! use crew_bnp::pricing::ExplicitPricer;
//!
//! let items = vec![Item::new("a", 1.0), Item::new("b", 1.0), Item::new("c", 1.0)];
//! let mut master = MasterProblem::new(items).unwrap();
//! master.add_column(Column::from_items(1.0, 3, &[0, 1])).unwrap();
//! master.add_column(Column::from_items(1.0, 3, &[1, 2])).unwrap();
//! master.add_column(Column::from_items(1.0, 3, &[0, 2])).unwrap();
//!
//! let solver = SimplexSolver::default();
//! let pricer = ExplicitPricer::default();
//! let solution = BranchAndPrice::new(&solver, &pricer, BnpConfig::default())
//!     .solve(master)
//!     .unwrap();
//!
//! assert_eq!(solution.objective, 2.0);
//! assert!((solution.root_bound - 1.5).abs() < 1e-9);
//! ```

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::lp::LpSolver;
use crate::master::{ColumnId, MasterProblem};
use crate::pricing::PricingProblem;

mod frontier;
mod incumbent;
mod node;
mod parallel;


pub use incumbent::Incumbent;
pub use node::Node;

use frontier::Frontier;
use node::{Context, NodeOutcome, NodeReport};

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// The tree was closed and every node was solved.
    Optimal,
    /// The tree was closed, but some nodes were dropped on errors (listed
    /// in [`BnpSolution::warnings`]), so the incumbent is not proven optimal.
    Incomplete,
    /// `max_nodes` was reached with live nodes left.
    NodeLimit,
    /// The time limit passed or the interrupt flag was raised.
    Interrupted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes_explored: usize,
    pub nodes_pruned: usize,
    pub nodes_infeasible: usize,
    pub nodes_failed: usize,
    pub integer_nodes: usize,
    pub columns_generated: usize,
    pub cg_iterations: usize,
    pub max_depth: usize,
}

/// Best integer solution of a finished search.
#[derive(Debug, Clone)]
pub struct BnpSolution {
    pub objective: f64,
    /// Integer usage per column of `master`.
    pub values: Vec<f64>,
    pub master: MasterProblem,
    pub status: SearchStatus,
    /// Converged relaxed objective at the root.
    pub root_bound: f64,
    /// Lowest parent bound among the live nodes left behind when the search
    /// stopped early.
    pub open_bound: Option<f64>,
    pub stats: SearchStats,
    /// Node-local errors that caused nodes to be dropped.
    pub warnings: Vec<Error>,
}

impl BnpSolution {
    pub fn used_columns(&self) -> impl Iterator<Item = (ColumnId, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(i, &v)| (ColumnId(i), v))
    }

    /// `objective - root_bound`
    pub fn gap(&self) -> f64 {
        self.objective - self.root_bound
    }
}

/// Mutable bookkeeping shared by the sequential and parallel drivers.
#[derive(Debug, Default)]
pub(crate) struct SearchState {
    pub incumbent: Option<Incumbent>,
    pub stats: SearchStats,
    pub warnings: Vec<Error>,
    pub root_bound: Option<f64>,
    pub open_bound: Option<f64>,
}

impl SearchState {
    pub fn cutoff(&self) -> f64 {
        self.incumbent
            .as_ref()
            .map_or(f64::INFINITY, |incumbent| incumbent.objective)
    }

    pub fn offer(&mut self, candidate: Incumbent) {
        if candidate.improves(self.incumbent.as_ref()) {
            info!("new incumbent with objective {}", candidate.objective);
            self.incumbent = Some(candidate);
        }
    }

    /// Folds a processed node into the state and returns its children.
    pub fn record(&mut self, report: NodeReport) -> Vec<Node> {
        self.stats.cg_iterations += report.cg_iterations;
        self.stats.columns_generated += report.columns_added;
        self.stats.max_depth = self.stats.max_depth.max(report.depth);
        if report.depth == 0 {
            self.root_bound = report.bound;
        }
        if let Some(candidate) = report.heuristic {
            self.offer(candidate);
        }

        match report.outcome {
            NodeOutcome::Pruned => {
                self.stats.nodes_pruned += 1;
                vec![]
            }
            NodeOutcome::Infeasible => {
                self.stats.nodes_infeasible += 1;
                vec![]
            }
            NodeOutcome::Failed(e) => {
                self.stats.nodes_failed += 1;
                self.warnings.push(e);
                vec![]
            }
            NodeOutcome::Integer(candidate) => {
                self.stats.integer_nodes += 1;
                self.offer(candidate);
                vec![]
            }
            NodeOutcome::Branched(children) => children.into(),
        }
    }

    pub fn finish(self, status: SearchStatus) -> Result<BnpSolution> {
        let SearchState {
            incumbent,
            stats,
            warnings,
            root_bound,
            open_bound,
        } = self;
        let status = match status {
            SearchStatus::Optimal if stats.nodes_failed > 0 => SearchStatus::Incomplete,
            status => status,
        };
        info!(
            "search finished ({:?}) after {} nodes",
            status, stats.nodes_explored
        );
        if !warnings.is_empty() {
            warn!("{} node(s) dropped on errors", warnings.len());
        }
        match (incumbent, status) {
            (Some(incumbent), _) => Ok(BnpSolution {
                objective: incumbent.objective,
                values: incumbent.values,
                master: incumbent.master,
                status,
                root_bound: root_bound.unwrap_or(f64::NEG_INFINITY),
                open_bound,
                stats,
                warnings,
            }),
            (None, SearchStatus::Optimal) => Err(Error::NoFeasibleSolution),
            (None, SearchStatus::Incomplete) => Err(Error::SearchAborted {
                reason: format!(
                    "no integer solution after {} node(s) were dropped, first: {}",
                    warnings.len(),
                    warnings
                        .first()
                        .map_or_else(String::new, ToString::to_string)
                ),
            }),
            (None, SearchStatus::NodeLimit) => Err(Error::SearchAborted {
                reason: format!("node limit of {} reached", stats.nodes_explored),
            }),
            (None, SearchStatus::Interrupted) => Err(Error::SearchAborted {
                reason: "interrupted before any integer solution".into(),
            }),
        }
    }
}

/// External stop conditions checked between node dequeues.
#[derive(Debug, Clone)]
pub(crate) struct StopCondition {
    deadline: Option<Instant>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl StopCondition {
    pub fn new(time_limit: Option<Duration>, interrupt: Option<Arc<AtomicBool>>) -> Self {
        Self {
            deadline: time_limit.map(|limit| Instant::now() + limit),
            interrupt,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            || self
                .interrupt
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Branch-and-price driver over an LP solver and a pricing subproblem.
pub struct BranchAndPrice<'a, S: ?Sized, P: ?Sized> {
    solver: &'a S,
    pricer: &'a P,
    config: BnpConfig,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'a, S, P> BranchAndPrice<'a, S, P>
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    pub fn new(solver: &'a S, pricer: &'a P, config: BnpConfig) -> Self {
        Self {
            solver,
            pricer,
            config,
            interrupt: None,
        }
    }

    /// Stops the search once `flag` is set; the best solution found so far
    /// is returned with status `Interrupted`.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn config(&self) -> &BnpConfig {
        &self.config
    }

    /// Solves the integer master starting from the columns in `master`.
    ///
    /// Artificial columns are added first so that every node relaxation is
    /// feasible; solutions that use them are never accepted.
    ///
    /// # Errors
    ///
    /// * `NoFeasibleSolution` if the tree was closed without an integer
    ///   solution and no node was dropped
    /// * `SearchAborted` if the search stopped early, or dropped nodes on
    ///   errors, without finding one
    pub fn solve(&self, master: MasterProblem) -> Result<BnpSolution> {
        let mut master = master.with_deduplication(self.config.deduplicate_columns);
        master.add_artificial_columns(self.config.artificial_penalty)?;

        let threads = self.config.threads();
        info!(
            "branch-and-price over {} items and {} columns on {} thread(s)",
            master.num_items(),
            master.num_columns(),
            threads
        );

        let ctx = Context {
            solver: self.solver,
            pricer: self.pricer,
            config: &self.config,
        };
        let stop = StopCondition::new(self.config.time_limit, self.interrupt.clone());
        let root = Node::root(master);
        if threads > 1 {
            parallel::solve(ctx, root, &stop, threads)
        } else {
            solve_sequential(ctx, root, &stop)
        }
    }
}

fn solve_sequential<S, P>(
    ctx: Context<'_, S, P>,
    root: Node,
    stop: &StopCondition,
) -> Result<BnpSolution>
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    let mut frontier = Frontier::new(ctx.config.node_selection);
    let mut state = SearchState::default();
    frontier.push(root);

    let status = loop {
        if frontier.is_empty() {
            break SearchStatus::Optimal;
        }
        let status = if stop.should_stop() {
            Some(SearchStatus::Interrupted)
        } else if state.stats.nodes_explored >= ctx.config.max_nodes {
            Some(SearchStatus::NodeLimit)
        } else {
            None
        };
        if let Some(status) = status {
            state.open_bound = frontier.lowest_bound();
            break status;
        }
        let Some(node) = frontier.pop() else {
            continue;
        };

        state.stats.nodes_explored += 1;
        let report = ctx.process(node, state.cutoff())?;
        for child in state.record(report) {
            frontier.push(child);
        }
        debug!(
            "{} live nodes, incumbent {}",
            frontier.len(),
            state.cutoff()
        );
    };
    state.finish(status)
}
