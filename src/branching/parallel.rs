//! Parallel node processing: a fixed pool of worker threads pulls live nodes
//! from a shared frontier, solves them independently and pushes children
//! back.
//!
//! Workers only hold the lock to fetch work and to record results; column
//! generation itself runs unlocked. A worker may prune against an incumbent
//! that is slightly out of date, which only costs extra work.

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use super::frontier::Frontier;
use super::node::{Context, Node, NodeReport};
use super::{BnpSolution, SearchState, SearchStatus, StopCondition};
use crate::error::{Error, Result};
use crate::lp::LpSolver;
use crate::pricing::PricingProblem;

/// Data only touched inside critical sections.
struct Critical {
    frontier: Frontier,
    state: SearchState,
    /// Nodes currently being processed. Together with an empty frontier
    /// this separates starvation from completion.
    ongoing: usize,
    /// Set once the search must end before the tree is closed.
    stopped: Option<SearchStatus>,
    /// First error that concerns the whole search.
    fatal: Option<Error>,
}

struct Shared<'a, S: ?Sized, P: ?Sized> {
    ctx: Context<'a, S, P>,
    stop: &'a StopCondition,
    critical: Mutex<Critical>,
    /// Idle workers park here until a node finishes.
    monitor: Condvar,
}

enum WorkLoad {
    Complete,
    Starvation,
    WorkItem { node: Node, cutoff: f64 },
}

pub(crate) fn solve<S, P>(
    ctx: Context<'_, S, P>,
    root: Node,
    stop: &StopCondition,
    threads: usize,
) -> Result<BnpSolution>
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    let mut frontier = Frontier::new(ctx.config.node_selection);
    frontier.push(root);
    let shared = Shared {
        ctx,
        stop,
        critical: Mutex::new(Critical {
            frontier,
            state: SearchState::default(),
            ongoing: 0,
            stopped: None,
            fatal: None,
        }),
        monitor: Condvar::new(),
    };

    std::thread::scope(|s| {
        for id in 0..threads {
            let shared = &shared;
            s.spawn(move || worker(shared, id));
        }
    });

    let critical = shared.critical.into_inner();
    if let Some(e) = critical.fatal {
        return Err(e);
    }
    critical
        .state
        .finish(critical.stopped.unwrap_or(SearchStatus::Optimal))
}

fn worker<S, P>(shared: &Shared<'_, S, P>, id: usize)
where
    S: LpSolver + ?Sized,
    P: PricingProblem + ?Sized,
{
    loop {
        match get_workload(shared) {
            WorkLoad::Complete => break,
            WorkLoad::Starvation => continue,
            WorkLoad::WorkItem { node, cutoff } => {
                let outcome = shared.ctx.process(node, cutoff);
                notify_node_finished(shared, id, outcome);
            }
        }
    }
}

fn get_workload<S: ?Sized, P: ?Sized>(shared: &Shared<'_, S, P>) -> WorkLoad {
    let mut critical = shared.critical.lock();

    if critical.stopped.is_some() || critical.fatal.is_some() {
        return if critical.ongoing == 0 {
            WorkLoad::Complete
        } else {
            shared.monitor.wait(&mut critical);
            WorkLoad::Starvation
        };
    }

    if critical.ongoing == 0 && critical.frontier.is_empty() {
        return WorkLoad::Complete;
    }

    if !critical.frontier.is_empty() {
        let status = if shared.stop.should_stop() {
            Some(SearchStatus::Interrupted)
        } else if critical.state.stats.nodes_explored >= shared.ctx.config.max_nodes {
            Some(SearchStatus::NodeLimit)
        } else {
            None
        };
        if let Some(status) = status {
            debug!("stopping search: {status:?}");
            critical.stopped = Some(status);
            critical.state.open_bound = critical.frontier.lowest_bound();
            critical.frontier.clear();
            shared.monitor.notify_all();
            return WorkLoad::Starvation;
        }
    }

    match critical.frontier.pop() {
        None => {
            shared.monitor.wait(&mut critical);
            WorkLoad::Starvation
        }
        Some(node) => {
            critical.ongoing += 1;
            critical.state.stats.nodes_explored += 1;
            let cutoff = critical.state.cutoff();
            WorkLoad::WorkItem { node, cutoff }
        }
    }
}

fn notify_node_finished<S: ?Sized, P: ?Sized>(
    shared: &Shared<'_, S, P>,
    id: usize,
    outcome: Result<NodeReport>,
) {
    let mut critical = shared.critical.lock();
    critical.ongoing -= 1;
    match outcome {
        Ok(report) => {
            let children = critical.state.record(report);
            if critical.stopped.is_none() {
                for child in children {
                    critical.frontier.push(child);
                }
            } else {
                // children of nodes in flight at the stop stay open too
                let state = &mut critical.state;
                for child in children {
                    let bound = child.bound();
                    state.open_bound = Some(state.open_bound.map_or(bound, |b| b.min(bound)));
                }
            }
        }
        Err(e) => {
            warn!("worker {id} aborted the search: {e}");
            critical.frontier.clear();
            if critical.fatal.is_none() {
                critical.fatal = Some(e);
            }
        }
    }
    shared.monitor.notify_all();
}
