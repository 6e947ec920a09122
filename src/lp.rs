//! Uniform interface to the LP/MIP solver used by the master problem.
//!
//! The engine only ever talks to an [`LpSolver`]. The bundled backend is a
//! dense [`simplex`] for the continuous relaxation; integer programs are
//! solved by LP-based [`branch_and_bound`] on top of any relaxation solver.

use num_traits::Float;
use std::fmt::Debug;

use crate::config::Tolerance;
use crate::error::{Error, Result};

pub mod branch_and_bound;
pub mod simplex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintSense {
    GreaterEqual,
    Equal,
    LessEqual,
}

impl ConstraintSense {
    /// Sense after both sides of the row are multiplied by -1.
    pub fn flipped(self) -> Self {
        match self {
            ConstraintSense::GreaterEqual => ConstraintSense::LessEqual,
            ConstraintSense::Equal => ConstraintSense::Equal,
            ConstraintSense::LessEqual => ConstraintSense::GreaterEqual,
        }
    }

    pub fn is_satisfied<T: Float>(self, lhs: T, rhs: T, tolerance: T) -> bool {
        match self {
            ConstraintSense::GreaterEqual => lhs >= rhs - tolerance,
            ConstraintSense::Equal => (lhs - rhs).abs() <= tolerance,
            ConstraintSense::LessEqual => lhs <= rhs + tolerance,
        }
    }
}

/// Box bounds on a single variable. The lower bound must be finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarBounds<T = f64> {
    pub lower: T,
    pub upper: T,
}

impl<T: Float> VarBounds<T> {
    /// `[0, +inf)`
    pub fn non_negative() -> Self {
        Self {
            lower: T::zero(),
            upper: T::infinity(),
        }
    }

    pub fn new(lower: T, upper: T) -> Self {
        Self { lower, upper }
    }

    pub fn fixed(value: T) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }
}

impl<T: Float> Default for VarBounds<T> {
    fn default() -> Self {
        Self::non_negative()
    }
}

/// A linear program `min c^T x` subject to `A x (>=|=|<=) b`, `l <= x <= u`.
#[derive(Debug, Clone)]
pub struct LinearProgram<T = f64>
where
    T: Float + Debug,
{
    /// The objective function coefficients (c in min c^T x)
    pub objective: Vec<T>,
    /// The constraint matrix, one row per constraint
    pub constraints: Vec<Vec<T>>,
    pub senses: Vec<ConstraintSense>,
    /// The right-hand side vector
    pub rhs: Vec<T>,
    pub bounds: Vec<VarBounds<T>>,
}

impl<T: Float + Debug> LinearProgram<T> {
    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }

    pub fn num_rows(&self) -> usize {
        self.constraints.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.num_vars();
        let m = self.num_rows();
        if self.senses.len() != m {
            return Err(Error::dimension_mismatch("senses", m, self.senses.len()));
        }
        if self.rhs.len() != m {
            return Err(Error::dimension_mismatch("rhs", m, self.rhs.len()));
        }
        if self.bounds.len() != n {
            return Err(Error::dimension_mismatch("bounds", n, self.bounds.len()));
        }
        if let Some(row) = self.constraints.iter().find(|row| row.len() != n) {
            return Err(Error::dimension_mismatch("constraint row", n, row.len()));
        }
        if self.bounds.iter().any(|b| !b.lower.is_finite()) {
            return Err(Error::invalid_input("variable lower bounds must be finite"));
        }
        Ok(())
    }

    /// Row activities `A x`.
    pub fn activities(&self, x: &[T]) -> Vec<T> {
        self.constraints
            .iter()
            .map(|row| {
                row.iter()
                    .zip(x)
                    .fold(T::zero(), |acc, (&a, &xi)| acc + a * xi)
            })
            .collect()
    }

    pub fn objective_value(&self, x: &[T]) -> T {
        self.objective
            .iter()
            .zip(x)
            .fold(T::zero(), |acc, (&c, &xi)| acc + c * xi)
    }

    pub fn is_feasible(&self, x: &[T], tolerance: T) -> bool {
        x.len() == self.num_vars()
            && x.iter().zip(&self.bounds).all(|(&xi, b)| {
                xi >= b.lower - tolerance && xi <= b.upper + tolerance
            })
            && self
                .activities(x)
                .into_iter()
                .zip(self.senses.iter().zip(&self.rhs))
                .all(|(lhs, (sense, &rhs))| sense.is_satisfied(lhs, rhs, tolerance))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
}

/// Outcome of a continuous solve.
///
/// `primal`, `dual` and `reduced_costs` are only meaningful when `status`
/// is `Optimal`; an infeasible program never reports a zero objective.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution<T = f64> {
    pub status: LpStatus,
    pub objective: T,
    pub primal: Vec<T>,
    /// One shadow price per constraint row.
    pub dual: Vec<T>,
    /// `c_j - y^T A_j` for every variable.
    pub reduced_costs: Vec<T>,
}

impl<T: Float> LpSolution<T> {
    pub fn without_solution(status: LpStatus) -> Self {
        let objective = match status {
            LpStatus::Unbounded => T::neg_infinity(),
            _ => T::infinity(),
        };
        Self {
            status,
            objective,
            primal: vec![],
            dual: vec![],
            reduced_costs: vec![],
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == LpStatus::Optimal
    }
}

/// Outcome of an integer solve.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerSolution {
    /// `Optimal` when the search completed with a solution, `IterationLimit`
    /// when the node budget ran out (a solution may still be present).
    pub status: LpStatus,
    pub objective: f64,
    pub primal: Vec<f64>,
    pub nodes: usize,
}

impl IntegerSolution {
    pub fn has_solution(&self) -> bool {
        !self.primal.is_empty()
    }
}

/// Black-box numerical solver behind the master problem.
pub trait LpSolver: Send + Sync {
    fn solve_relaxation(&self, lp: &LinearProgram) -> Result<LpSolution>;

    /// Solves `lp` with every variable restricted to integer values.
    fn solve_integer(
        &self,
        lp: &LinearProgram,
        tolerance: &Tolerance,
        node_limit: usize,
    ) -> Result<IntegerSolution> {
        branch_and_bound::solve(self, lp, tolerance, node_limit)
    }
}

/// Dense two-phase simplex backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplexSolver {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SimplexSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 50_000,
        }
    }
}

impl SimplexSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }
}

impl LpSolver for SimplexSolver {
    fn solve_relaxation(&self, lp: &LinearProgram) -> Result<LpSolution> {
        simplex::solve(lp, self.tolerance, self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covering_lp() -> LinearProgram {
        // min 3x + 2y
        // s.t. x + y >= 2
        //      x     <= 1.5
        LinearProgram {
            objective: vec![3.0, 2.0],
            constraints: vec![vec![1.0, 1.0], vec![1.0, 0.0]],
            senses: vec![ConstraintSense::GreaterEqual, ConstraintSense::LessEqual],
            rhs: vec![2.0, 1.5],
            bounds: vec![VarBounds::non_negative(); 2],
        }
    }

    #[test]
    fn test_validate_catches_ragged_rows() {
        let mut lp = covering_lp();
        lp.constraints[1].pop();
        assert_eq!(
            lp.validate(),
            Err(Error::dimension_mismatch("constraint row", 2, 1))
        );
    }

    #[test]
    fn test_validate_rejects_free_variables() {
        let mut lp = covering_lp();
        lp.bounds[0] = VarBounds::new(f64::NEG_INFINITY, 1.0);
        assert!(matches!(lp.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_feasibility_check() {
        let lp = covering_lp();
        assert!(lp.is_feasible(&[0.0, 2.0], 1e-9));
        assert!(lp.is_feasible(&[1.5, 0.5], 1e-9));
        assert!(!lp.is_feasible(&[2.0, 0.0], 1e-9));
        assert!(!lp.is_feasible(&[0.5, 0.5], 1e-9));
        assert!(!lp.is_feasible(&[0.5], 1e-9));
    }

    #[test]
    fn test_sense_flip() {
        assert_eq!(
            ConstraintSense::GreaterEqual.flipped(),
            ConstraintSense::LessEqual
        );
        assert_eq!(ConstraintSense::Equal.flipped(), ConstraintSense::Equal);
    }

    #[test]
    fn test_solver_reports_infeasible_distinctly() {
        let lp = LinearProgram {
            objective: vec![0.0],
            constraints: vec![vec![1.0], vec![1.0]],
            senses: vec![ConstraintSense::GreaterEqual, ConstraintSense::LessEqual],
            rhs: vec![2.0, 1.0],
            bounds: vec![VarBounds::non_negative()],
        };
        let solution = SimplexSolver::default().solve_relaxation(&lp).unwrap();
        assert_eq!(solution.status, LpStatus::Infeasible);
        assert!(solution.objective.is_infinite());
    }
}
