use log::trace;

use super::{IntegerSolution, LinearProgram, LpSolver, LpStatus, VarBounds};
use crate::config::Tolerance;
use crate::error::Result;

/// Solves `lp` with all variables integer by LP-based depth-first
/// branch-and-bound on top of `solver`'s relaxation.
///
/// Branches on the most fractional variable; the ceiling child is explored
/// first, which on covering rows reaches feasible points quickly. Returns
/// `IterationLimit` (possibly with a solution) once `node_limit` relaxations
/// have been solved without closing the tree.
pub fn solve<S>(
    solver: &S,
    lp: &LinearProgram,
    tolerance: &Tolerance,
    node_limit: usize,
) -> Result<IntegerSolution>
where
    S: LpSolver + ?Sized,
{
    lp.validate()?;

    let mut best: Option<(f64, Vec<f64>)> = None;
    let mut nodes = vec![lp.bounds.clone()];
    let mut explored = 0;

    while let Some(bounds) = nodes.pop() {
        if explored >= node_limit {
            nodes.push(bounds);
            break;
        }
        explored += 1;

        let node = LinearProgram {
            bounds,
            ..lp.clone()
        };
        let relaxation = solver.solve_relaxation(&node)?;
        match relaxation.status {
            LpStatus::Optimal => {}
            LpStatus::Unbounded if explored == 1 => {
                return Ok(IntegerSolution {
                    status: LpStatus::Unbounded,
                    objective: f64::NEG_INFINITY,
                    primal: vec![],
                    nodes: explored,
                })
            }
            _ => continue,
        }

        let incumbent = best.as_ref().map_or(f64::INFINITY, |(value, _)| *value);
        if relaxation.objective >= incumbent - tolerance.integrality {
            continue;
        }

        match most_fractional(&relaxation.primal, tolerance) {
            None => {
                trace!("integer point with objective {}", relaxation.objective);
                let rounded = relaxation.primal.iter().map(|v| v.round()).collect();
                best = Some((relaxation.objective, rounded));
            }
            Some(var) => {
                let (lower, upper) = branch(&node.bounds, var, relaxation.primal[var]);
                nodes.push(lower);
                nodes.push(upper);
            }
        }
    }

    let exhausted = nodes.is_empty();
    Ok(match best {
        Some((objective, primal)) => IntegerSolution {
            status: if exhausted {
                LpStatus::Optimal
            } else {
                LpStatus::IterationLimit
            },
            objective,
            primal,
            nodes: explored,
        },
        None => IntegerSolution {
            status: if exhausted {
                LpStatus::Infeasible
            } else {
                LpStatus::IterationLimit
            },
            objective: f64::INFINITY,
            primal: vec![],
            nodes: explored,
        },
    })
}

/// Index of the variable whose value is closest to `.5` away from an
/// integer; ties go to the lowest index.
pub fn most_fractional(values: &[f64], tolerance: &Tolerance) -> Option<usize> {
    let mut chosen: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if tolerance.is_integral(v) {
            continue;
        }
        let fractionality = Tolerance::fractionality(v);
        if chosen.map_or(true, |(_, best)| fractionality > best) {
            chosen = Some((i, fractionality));
        }
    }
    chosen.map(|(i, _)| i)
}

fn branch(bounds: &[VarBounds], var: usize, value: f64) -> (Vec<VarBounds>, Vec<VarBounds>) {
    // x_var <= floor(value)
    let mut lower_branch = bounds.to_vec();
    lower_branch[var].upper = lower_branch[var].upper.min(value.floor());

    // x_var >= ceil(value)
    let mut upper_branch = bounds.to_vec();
    upper_branch[var].lower = upper_branch[var].lower.max(value.ceil());

    (lower_branch, upper_branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{ConstraintSense, SimplexSolver};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_simple_ilp() -> Result<()> {
        // maximize x + y  (minimize -x - y)
        // subject to 2x + 2y <= 9
        let problem = LinearProgram {
            objective: vec![-1.0, -1.0],
            constraints: vec![vec![2.0, 2.0]],
            senses: vec![ConstraintSense::LessEqual],
            rhs: vec![9.0],
            bounds: vec![VarBounds::non_negative(); 2],
        };

        let solver = SimplexSolver::default();
        let solution = solver.solve_integer(&problem, &Tolerance::default(), 1000)?;

        assert_eq!(solution.status, LpStatus::Optimal);
        assert_abs_diff_eq!(solution.objective, -4.0, epsilon = 1e-9);
        for &v in &solution.primal {
            assert_abs_diff_eq!(v, v.round(), epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_covering_ilp() -> Result<()> {
        // minimize x + y + z with every pair covered twice over
        //   x + y >= 1.5, y + z >= 1.5, x + z >= 1.5
        // LP optimum 2.25, integer optimum 3
        let problem = LinearProgram {
            objective: vec![1.0, 1.0, 1.0],
            constraints: vec![
                vec![1.0, 1.0, 0.0],
                vec![0.0, 1.0, 1.0],
                vec![1.0, 0.0, 1.0],
            ],
            senses: vec![ConstraintSense::GreaterEqual; 3],
            rhs: vec![1.5; 3],
            bounds: vec![VarBounds::non_negative(); 3],
        };

        let solver = SimplexSolver::default();
        let relaxed = solver.solve_relaxation(&problem)?;
        assert_abs_diff_eq!(relaxed.objective, 2.25, epsilon = 1e-9);

        let solution = solver.solve_integer(&problem, &Tolerance::default(), 1000)?;
        assert_eq!(solution.status, LpStatus::Optimal);
        assert_abs_diff_eq!(solution.objective, 3.0, epsilon = 1e-9);
        assert!(problem.is_feasible(&solution.primal, 1e-9));
        Ok(())
    }

    #[test]
    fn test_infeasible_ilp() -> Result<()> {
        // 2x == 3 has no integer solution
        let problem = LinearProgram {
            objective: vec![1.0],
            constraints: vec![vec![2.0]],
            senses: vec![ConstraintSense::Equal],
            rhs: vec![3.0],
            bounds: vec![VarBounds::non_negative()],
        };

        let solver = SimplexSolver::default();
        let solution = solver.solve_integer(&problem, &Tolerance::default(), 1000)?;

        assert_eq!(solution.status, LpStatus::Infeasible);
        assert!(!solution.has_solution());
        Ok(())
    }

    #[test]
    fn test_node_limit() -> Result<()> {
        let problem = LinearProgram {
            objective: vec![1.0, 1.0, 1.0],
            constraints: vec![
                vec![1.0, 1.0, 0.0],
                vec![0.0, 1.0, 1.0],
                vec![1.0, 0.0, 1.0],
            ],
            senses: vec![ConstraintSense::GreaterEqual; 3],
            rhs: vec![1.5; 3],
            bounds: vec![VarBounds::non_negative(); 3],
        };

        let solution = SimplexSolver::default().solve_integer(&problem, &Tolerance::default(), 1)?;
        assert_eq!(solution.status, LpStatus::IterationLimit);
        assert_eq!(solution.nodes, 1);
        Ok(())
    }

    #[test]
    fn test_most_fractional() {
        let tol = Tolerance::default();
        assert_eq!(most_fractional(&[1.0, 0.3, 0.5, 0.6], &tol), Some(2));
        assert_eq!(most_fractional(&[0.4, 1.6], &tol), Some(0));
        assert_eq!(most_fractional(&[1.0, 2.0, 0.0], &tol), None);
        assert_eq!(most_fractional(&[1.0 + 1e-7], &tol), None);
    }
}
