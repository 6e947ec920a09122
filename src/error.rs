use thiserror::Error;

use crate::master::ColumnId;

/// Errors raised by the branch-and-price engine.
///
/// Node-local failures (`InfeasibleMaster`, `PricingStalled`, solver
/// failures) are absorbed by the branching controller and turned into node
/// outcomes; only `NoFeasibleSolution` and `SearchAborted` reach the caller
/// of a full search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("master problem is infeasible")]
    InfeasibleMaster,

    #[error("master problem is unbounded")]
    UnboundedMaster,

    #[error("pricing did not converge after {iterations} iterations (relaxed bound {bound})")]
    PricingStalled { iterations: usize, bound: f64 },

    #[error("column duplicates the coverage pattern of {existing}")]
    DuplicateColumn { existing: ColumnId },

    #[error("branch-and-price tree exhausted without an integer feasible solution")]
    NoFeasibleSolution,

    #[error("dual prices are stale: computed for {found} columns, master has {expected}")]
    StaleDuals { expected: usize, found: usize },

    #[error("dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("lp solver failure: {0}")]
    SolverFailure(String),

    #[error("search aborted: {reason}")]
    SearchAborted { reason: String },
}

impl Error {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn dimension_mismatch(what: &'static str, expected: usize, found: usize) -> Self {
        Error::DimensionMismatch {
            what,
            expected,
            found,
        }
    }

    /// Whether this error only invalidates the node it was raised in.
    pub fn is_node_local(&self) -> bool {
        matches!(
            self,
            Error::InfeasibleMaster
                | Error::UnboundedMaster
                | Error::PricingStalled { .. }
                | Error::SolverFailure(_)
                | Error::StaleDuals { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
