use ndarray::{Array2, Zip};
use num_traits::Float;
use std::fmt::Debug;

use super::{ConstraintSense, LinearProgram, LpSolution, LpStatus};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    /// Position in the list of non-fixed variables.
    Structural(usize),
    Slack,
    Artificial,
}

/// A constraint after bound shifting and sign normalisation (`rhs >= 0`).
struct WorkRow<T> {
    coefficients: Vec<T>,
    sense: ConstraintSense,
    rhs: T,
    /// -1 when the row was negated, used to map duals back.
    sign: T,
}

/// Simplex tableau. Row 0 holds the reduced costs and `-z` in the last
/// column; rows `1..=m` hold `B^-1 [A | b]`.
struct Tableau<T> {
    cells: Array2<T>,
    kinds: Vec<ColumnKind>,
    /// `basis[r]` is the column basic in tableau row `r + 1`.
    basis: Vec<usize>,
    /// Column holding `+e_r` in the original system, used to read duals.
    unit: Vec<usize>,
    tolerance: T,
    iterations: usize,
    max_iterations: usize,
}

enum Pass {
    Optimal,
    Unbounded,
    IterationLimit,
}

/// Minimizes a linear program with the two-phase simplex method.
///
/// Variables are shifted onto their lower bounds, finite upper bounds become
/// explicit rows, and every row is normalised to a non-negative right-hand
/// side. Phase I minimises the sum of artificial variables; Phase II
/// optimises the real objective with artificials barred from the basis.
/// Bland's rule is used for both entering and leaving choices, so degenerate
/// covering problems cannot cycle.
///
/// Duals are read from the final reduced-cost row: for the column that held
/// `+e_i` in the original system, `d = 0 - y_i`.
///
/// # Examples
///
/// ```
/// use crew_bnp::lp::{ConstraintSense, LinearProgram, LpStatus, VarBounds};
/// use crew_bnp::lp::simplex::solve;
///
/// // minimize -x - y
/// // subject to x + y <= 1
/// let lp = LinearProgram {
///     objective: vec![-1.0, -1.0],
///     constraints: vec![vec![1.0, 1.0]],
///     senses: vec![ConstraintSense::LessEqual],
///     rhs: vec![1.0],
///     bounds: vec![VarBounds::non_negative(); 2],
/// };
///
/// let result = solve(&lp, 1e-9_f64, 100).unwrap();
/// assert_eq!(result.status, LpStatus::Optimal);
/// assert!((result.objective + 1.0).abs() < 1e-9);
/// ```
pub fn solve<T>(lp: &LinearProgram<T>, tolerance: T, max_iterations: usize) -> Result<LpSolution<T>>
where
    T: Float + Debug,
{
    lp.validate()?;

    let mut active = Vec::with_capacity(lp.num_vars());
    for (j, bounds) in lp.bounds.iter().enumerate() {
        if bounds.upper < bounds.lower - tolerance {
            return Ok(LpSolution::without_solution(LpStatus::Infeasible));
        }
        if bounds.upper - bounds.lower > tolerance {
            active.push(j);
        }
    }

    let rows = build_rows(lp, &active);
    let mut tableau = Tableau::new(&rows, active.len(), tolerance, max_iterations);

    if tableau.has_artificials() {
        let phase_one: Vec<T> = tableau
            .kinds
            .iter()
            .map(|kind| match kind {
                ColumnKind::Artificial => T::one(),
                _ => T::zero(),
            })
            .collect();
        tableau.price_out(&phase_one);
        match tableau.run(true) {
            Pass::Optimal => {}
            Pass::IterationLimit => {
                return Ok(LpSolution::without_solution(LpStatus::IterationLimit))
            }
            // the phase one objective is bounded below by zero
            Pass::Unbounded => return Ok(LpSolution::without_solution(LpStatus::Infeasible)),
        }

        let rhs_norm = rows.iter().fold(T::one(), |acc, row| acc + row.rhs);
        let infeasibility = -tableau.cells[[0, tableau.rhs_col()]];
        if infeasibility > tolerance * rhs_norm {
            return Ok(LpSolution::without_solution(LpStatus::Infeasible));
        }
        tableau.drive_out_artificials();
    }

    let phase_two: Vec<T> = tableau
        .kinds
        .iter()
        .map(|kind| match kind {
            ColumnKind::Structural(k) => lp.objective[active[*k]],
            _ => T::zero(),
        })
        .collect();
    tableau.price_out(&phase_two);
    match tableau.run(false) {
        Pass::Optimal => {}
        Pass::Unbounded => return Ok(LpSolution::without_solution(LpStatus::Unbounded)),
        Pass::IterationLimit => {
            return Ok(LpSolution::without_solution(LpStatus::IterationLimit))
        }
    }

    Ok(tableau.extract(lp, &active, &rows))
}

fn build_rows<T: Float + Debug>(lp: &LinearProgram<T>, active: &[usize]) -> Vec<WorkRow<T>> {
    let mut rows = Vec::with_capacity(lp.num_rows() + active.len());

    for ((row, &sense), &rhs) in lp.constraints.iter().zip(&lp.senses).zip(&lp.rhs) {
        let shift = row
            .iter()
            .zip(&lp.bounds)
            .fold(T::zero(), |acc, (&a, b)| acc + a * b.lower);
        rows.push(WorkRow {
            coefficients: active.iter().map(|&j| row[j]).collect(),
            sense,
            rhs: rhs - shift,
            sign: T::one(),
        });
    }

    for (k, &j) in active.iter().enumerate() {
        let bounds = lp.bounds[j];
        if bounds.upper.is_finite() {
            let mut coefficients = vec![T::zero(); active.len()];
            coefficients[k] = T::one();
            rows.push(WorkRow {
                coefficients,
                sense: ConstraintSense::LessEqual,
                rhs: bounds.upper - bounds.lower,
                sign: T::one(),
            });
        }
    }

    for row in rows.iter_mut() {
        if row.rhs < T::zero() {
            row.coefficients.iter_mut().for_each(|a| *a = -*a);
            row.rhs = -row.rhs;
            row.sense = row.sense.flipped();
            row.sign = -T::one();
        }
    }

    rows
}

impl<T: Float + Debug> Tableau<T> {
    fn new(rows: &[WorkRow<T>], num_active: usize, tolerance: T, max_iterations: usize) -> Self {
        let m = rows.len();
        let mut kinds: Vec<ColumnKind> = (0..num_active).map(ColumnKind::Structural).collect();

        let mut slack_of = vec![None; m];
        for (r, row) in rows.iter().enumerate() {
            if row.sense != ConstraintSense::Equal {
                slack_of[r] = Some(kinds.len());
                kinds.push(ColumnKind::Slack);
            }
        }
        let mut artificial_of = vec![None; m];
        for (r, row) in rows.iter().enumerate() {
            if row.sense != ConstraintSense::LessEqual {
                artificial_of[r] = Some(kinds.len());
                kinds.push(ColumnKind::Artificial);
            }
        }

        let rhs_col = kinds.len();
        let mut cells = Array2::zeros((m + 1, rhs_col + 1));
        let mut basis = Vec::with_capacity(m);
        let mut unit = Vec::with_capacity(m);

        for (r, row) in rows.iter().enumerate() {
            for (k, &a) in row.coefficients.iter().enumerate() {
                cells[[r + 1, k]] = a;
            }
            if let Some(s) = slack_of[r] {
                cells[[r + 1, s]] = match row.sense {
                    ConstraintSense::GreaterEqual => -T::one(),
                    _ => T::one(),
                };
            }
            if let Some(a) = artificial_of[r] {
                cells[[r + 1, a]] = T::one();
            }
            cells[[r + 1, rhs_col]] = row.rhs;

            let basic = match (row.sense, slack_of[r], artificial_of[r]) {
                (ConstraintSense::LessEqual, Some(s), _) => s,
                (_, _, Some(a)) => a,
                // every row gets either a slack or an artificial
                _ => rhs_col,
            };
            basis.push(basic);
            unit.push(basic);
        }

        Self {
            cells,
            kinds,
            basis,
            unit,
            tolerance,
            iterations: 0,
            max_iterations,
        }
    }

    fn rhs_col(&self) -> usize {
        self.kinds.len()
    }

    fn has_artificials(&self) -> bool {
        self.kinds.contains(&ColumnKind::Artificial)
    }

    /// Rewrites row 0 as `d_j = c_j - c_B B^-1 A_j` and `-z` for the given costs.
    fn price_out(&mut self, costs: &[T]) {
        let rhs_col = self.rhs_col();
        for j in 0..=rhs_col {
            let cost = if j < rhs_col { costs[j] } else { T::zero() };
            let basic_part = self
                .basis
                .iter()
                .enumerate()
                .fold(T::zero(), |acc, (r, &b)| acc + costs[b] * self.cells[[r + 1, j]]);
            self.cells[[0, j]] = cost - basic_part;
        }
    }

    fn run(&mut self, allow_artificials: bool) -> Pass {
        let rhs_col = self.rhs_col();
        loop {
            if self.iterations >= self.max_iterations {
                return Pass::IterationLimit;
            }

            // Bland: lowest index with a negative reduced cost
            let entering = (0..rhs_col).find(|&j| {
                (allow_artificials || self.kinds[j] != ColumnKind::Artificial)
                    && self.cells[[0, j]] < -self.tolerance
            });
            let Some(entering) = entering else {
                return Pass::Optimal;
            };

            let mut leaving: Option<(usize, T)> = None;
            for r in 0..self.basis.len() {
                let coef = self.cells[[r + 1, entering]];
                if coef <= self.tolerance {
                    continue;
                }
                let ratio = self.cells[[r + 1, rhs_col]] / coef;
                leaving = match leaving {
                    None => Some((r, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - self.tolerance
                            || (ratio <= best_ratio + self.tolerance
                                && self.basis[r] < self.basis[best])
                        {
                            Some((r, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }
            let Some((row, _)) = leaving else {
                return Pass::Unbounded;
            };

            pivot(&mut self.cells, row + 1, entering, self.tolerance);
            self.basis[row] = entering;
            self.iterations += 1;
        }
    }

    /// Pivots zero-valued artificials out of the basis where a real column
    /// can replace them. Rows where none can are redundant and keep their
    /// artificial at zero.
    fn drive_out_artificials(&mut self) {
        for r in 0..self.basis.len() {
            if self.kinds[self.basis[r]] != ColumnKind::Artificial {
                continue;
            }
            let replacement = (0..self.rhs_col()).find(|&j| {
                self.kinds[j] != ColumnKind::Artificial
                    && self.cells[[r + 1, j]].abs() > self.tolerance
            });
            if let Some(j) = replacement {
                pivot(&mut self.cells, r + 1, j, self.tolerance);
                self.basis[r] = j;
            }
        }
    }

    fn extract(
        &self,
        lp: &LinearProgram<T>,
        active: &[usize],
        rows: &[WorkRow<T>],
    ) -> LpSolution<T> {
        let rhs_col = self.rhs_col();

        let mut primal: Vec<T> = lp.bounds.iter().map(|b| b.lower).collect();
        for (r, &b) in self.basis.iter().enumerate() {
            if let ColumnKind::Structural(k) = self.kinds[b] {
                let shifted = self.cells[[r + 1, rhs_col]].max(T::zero());
                primal[active[k]] = lp.bounds[active[k]].lower + shifted;
            }
        }

        let dual: Vec<T> = (0..lp.num_rows())
            .map(|i| -self.cells[[0, self.unit[i]]] * rows[i].sign)
            .collect();

        let reduced_costs = (0..lp.num_vars())
            .map(|j| {
                let priced = lp
                    .constraints
                    .iter()
                    .zip(&dual)
                    .fold(T::zero(), |acc, (row, &y)| acc + y * row[j]);
                lp.objective[j] - priced
            })
            .collect();

        LpSolution {
            status: LpStatus::Optimal,
            objective: lp.objective_value(&primal),
            primal,
            dual,
            reduced_costs,
        }
    }
}

// Gauss-Jordan pivot; entries below `eps` are flushed to zero
fn pivot<T: Float>(cells: &mut Array2<T>, row: usize, col: usize, eps: T) {
    let scale = T::one() / cells[[row, col]];
    cells.row_mut(row).mapv_inplace(|v| {
        let v = v * scale;
        if v.abs() < eps {
            T::zero()
        } else {
            v
        }
    });
    let pivot_row = cells.row(row).to_owned();

    for (i, mut current) in cells.outer_iter_mut().enumerate() {
        if i == row {
            continue;
        }
        let factor = current[col];
        if factor != T::zero() {
            Zip::from(&mut current).and(&pivot_row).for_each(|v, &p| {
                *v = *v - factor * p;
                if (*v).abs() < eps {
                    *v = T::zero();
                }
            });
        }
        current[col] = T::zero();
    }
    cells[[row, col]] = T::one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::VarBounds;
    use approx::assert_abs_diff_eq;

    fn lp(
        objective: Vec<f64>,
        constraints: Vec<Vec<f64>>,
        senses: Vec<ConstraintSense>,
        rhs: Vec<f64>,
    ) -> LinearProgram {
        let n = objective.len();
        LinearProgram {
            objective,
            constraints,
            senses,
            rhs,
            bounds: vec![VarBounds::non_negative(); n],
        }
    }

    use ConstraintSense::*;

    #[test]
    fn test_simple_lp() {
        // minimize -x - y
        // subject to x + y <= 1
        let problem = lp(vec![-1.0, -1.0], vec![vec![1.0, 1.0]], vec![LessEqual], vec![1.0]);
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.objective, -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[0] + result.primal[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[0], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounded_lp() {
        // minimize -2x - y
        // subject to:
        //   x + y <= 2
        //   x <= 1
        let problem = lp(
            vec![-2.0, -1.0],
            vec![vec![1.0, 1.0], vec![1.0, 0.0]],
            vec![LessEqual, LessEqual],
            vec![2.0, 1.0],
        );
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.primal[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.objective, -3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[0], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[1], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_precision() {
        let problem: LinearProgram<f32> = LinearProgram {
            objective: vec![-2.0, -1.0],
            constraints: vec![vec![1.0, 1.0], vec![1.0, 0.0]],
            senses: vec![LessEqual, LessEqual],
            rhs: vec![2.0, 1.0],
            bounds: vec![VarBounds::non_negative(); 2],
        };
        let result = solve(&problem, 1e-6, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert!((result.objective + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_equality_and_negative_rhs() {
        // minimize x + y
        // subject to:
        //   x + 2y == 4
        //   x - y >= -1
        // optimum x = 2/3, y = 5/3 with duals 2/3 and 1/3
        let problem = lp(
            vec![1.0, 1.0],
            vec![vec![1.0, 2.0], vec![1.0, -1.0]],
            vec![Equal, GreaterEqual],
            vec![4.0, -1.0],
        );
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.primal[0], 2.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[1], 5.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.objective, 7.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[0], 2.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[1], 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_covering_duals_satisfy_strong_duality() {
        // three pairings over four flights
        let problem = lp(
            vec![300.0, 250.0, 400.0, 180.0],
            vec![
                vec![1.0, 0.0, 1.0, 0.0],
                vec![1.0, 0.0, 0.0, 1.0],
                vec![0.0, 1.0, 1.0, 0.0],
                vec![0.0, 1.0, 0.0, 1.0],
            ],
            vec![GreaterEqual; 4],
            vec![1.0; 4],
        );
        let result = solve(&problem, 1e-9, 1000).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        let dual_objective: f64 = result.dual.iter().zip(&problem.rhs).map(|(y, b)| y * b).sum();
        assert_abs_diff_eq!(dual_objective, result.objective, epsilon = 1e-7);
        assert!(result.dual.iter().all(|&y| y >= -1e-9));
        assert!(result.reduced_costs.iter().all(|&d| d >= -1e-7));
        assert!(problem.is_feasible(&result.primal, 1e-7));
    }

    #[test]
    fn test_variable_bounds() {
        // minimize -x - y
        // subject to x + y <= 3, 1 <= x <= 1.5, 0 <= y <= 1
        let mut problem = lp(vec![-1.0, -1.0], vec![vec![1.0, 1.0]], vec![LessEqual], vec![3.0]);
        problem.bounds = vec![VarBounds::new(1.0, 1.5), VarBounds::new(0.0, 1.0)];
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.primal[0], 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.objective, -2.5, epsilon = 1e-9);
        // the structural row is slack
        assert_abs_diff_eq!(result.dual[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fixed_variable() {
        // minimize y subject to x + y >= 3 with x fixed at 2
        let mut problem = lp(vec![0.0, 1.0], vec![vec![1.0, 1.0]], vec![GreaterEqual], vec![3.0]);
        problem.bounds[0] = VarBounds::fixed(2.0);
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.primal[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.dual[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.reduced_costs[0], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_crossed_bounds_are_infeasible() {
        let mut problem = lp(vec![1.0], vec![vec![1.0]], vec![GreaterEqual], vec![0.0]);
        problem.bounds[0] = VarBounds::new(2.0, 1.0);
        let result = solve(&problem, 1e-9, 100).unwrap();
        assert_eq!(result.status, LpStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        // minimize -x subject to x - y <= 1
        let problem = lp(vec![-1.0, 0.0], vec![vec![1.0, -1.0]], vec![LessEqual], vec![1.0]);
        let result = solve(&problem, 1e-9, 100).unwrap();
        assert_eq!(result.status, LpStatus::Unbounded);
        assert!(result.primal.is_empty());
    }

    #[test]
    fn test_iteration_limit() {
        let problem = lp(
            vec![-2.0, -1.0],
            vec![vec![1.0, 1.0], vec![1.0, 0.0]],
            vec![LessEqual, LessEqual],
            vec![2.0, 1.0],
        );
        let result = solve(&problem, 1e-9, 1).unwrap();
        assert_eq!(result.status, LpStatus::IterationLimit);
    }

    #[test]
    fn test_beale_does_not_cycle() {
        // Beale's example cycles under the largest-coefficient rule.
        let problem = lp(
            vec![-0.75, 150.0, -0.02, 6.0],
            vec![
                vec![0.25, -60.0, -0.04, 9.0],
                vec![0.5, -90.0, -0.02, 3.0],
                vec![0.0, 0.0, 1.0, 0.0],
            ],
            vec![LessEqual; 3],
            vec![0.0, 0.0, 1.0],
        );
        let result = solve(&problem, 1e-12, 1000).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.objective, -0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_redundant_equalities() {
        // the second row repeats the first
        let problem = lp(
            vec![1.0, 2.0],
            vec![vec![1.0, 1.0], vec![2.0, 2.0]],
            vec![Equal, Equal],
            vec![1.0, 2.0],
        );
        let result = solve(&problem, 1e-9, 100).unwrap();

        assert_eq!(result.status, LpStatus::Optimal);
        assert_abs_diff_eq!(result.objective, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.primal[0], 1.0, epsilon = 1e-9);
    }
}
