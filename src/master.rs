//! The restricted master problem: one usage variable per known column and
//! one covering row per item.

use log::trace;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::Tolerance;
use crate::error::{Error, Result};
use crate::lp::{IntegerSolution, LinearProgram, LpSolver, LpStatus, VarBounds};
use crate::model::{Column, Item};

/// Dense handle of a column inside a [`MasterProblem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub usize);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column#{}", self.0)
    }
}

/// Shadow prices of the item rows from one relaxed solve.
///
/// Tagged with the column count of the master they were computed on so
/// that they cannot be used again after the master grows.
#[derive(Debug, Clone, PartialEq)]
pub struct DualPrices {
    values: Vec<f64>,
    columns: usize,
}

impl DualPrices {
    pub fn new(values: Vec<f64>, columns: usize) -> Self {
        Self { values, columns }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, item: usize) -> f64 {
        self.values.get(item).copied().unwrap_or(0.0)
    }

    /// Number of master columns at the time of the solve.
    pub fn computed_for(&self) -> usize {
        self.columns
    }

    pub fn reduced_cost(&self, column: &Column) -> f64 {
        column.reduced_cost(&self.values)
    }
}

/// Bounds imposed on usage variables by branching decisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeBounds {
    bounds: BTreeMap<ColumnId, VarBounds>,
}

impl NodeBounds {
    pub fn get(&self, id: ColumnId) -> VarBounds {
        self.bounds.get(&id).copied().unwrap_or_default()
    }

    pub fn set_upper(&mut self, id: ColumnId, upper: f64) {
        let entry = self.bounds.entry(id).or_default();
        entry.upper = entry.upper.min(upper);
    }

    pub fn set_lower(&mut self, id: ColumnId, lower: f64) {
        let entry = self.bounds.entry(id).or_default();
        entry.lower = entry.lower.max(lower);
    }

    pub fn is_bounded_above(&self, id: ColumnId) -> bool {
        self.get(id).upper.is_finite()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, VarBounds)> + '_ {
        self.bounds.iter().map(|(&id, &b)| (id, b))
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

/// Optimal point of the continuous master.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedSolution {
    pub objective: f64,
    /// Usage level per column, indexed by `ColumnId`.
    pub values: Vec<f64>,
    pub duals: DualPrices,
    pub reduced_costs: Vec<f64>,
}

/// Restricted master problem.
///
/// Cloning is cheap: items and columns are shared, so a branch node can keep
/// a snapshot of the column set and grow its own copy independently.
#[derive(Debug, Clone)]
pub struct MasterProblem {
    items: Arc<[Item]>,
    columns: Vec<Arc<Column>>,
    /// Per item, the `(column, count)` pairs with nonzero coverage.
    incidence: Vec<Vec<(usize, u32)>>,
    /// Coverage hash to the columns carrying it.
    patterns: HashMap<u64, Vec<ColumnId>>,
    deduplicate: bool,
}

/// Cost difference below which two columns with equal coverage are the same.
const COST_EPSILON: f64 = 1e-9;

fn pattern_hash(coverage: &[u32]) -> u64 {
    let mut hasher = DefaultHasher::new();
    coverage.hash(&mut hasher);
    hasher.finish()
}

impl MasterProblem {
    pub fn new(items: Vec<Item>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::invalid_input("master problem needs at least one item"));
        }
        for item in &items {
            if !item.demand.is_finite() || item.demand < 0.0 {
                return Err(Error::invalid_input(format!(
                    "item {} has invalid demand {}",
                    item.name, item.demand
                )));
            }
            if !item.consumption.is_finite() || item.consumption < 0.0 {
                return Err(Error::invalid_input(format!(
                    "item {} has invalid consumption {}",
                    item.name, item.consumption
                )));
            }
        }
        let incidence = vec![Vec::new(); items.len()];
        Ok(Self {
            items: items.into(),
            columns: Vec::new(),
            incidence,
            patterns: HashMap::new(),
            deduplicate: true,
        })
    }

    pub fn with_deduplication(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.0).map(|c| c.as_ref())
    }

    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &Column)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (ColumnId(i), c.as_ref()))
    }

    /// Columns covering `item`, with their counts.
    pub fn incidence(&self, item: usize) -> &[(usize, u32)] {
        self.incidence.get(item).map_or(&[], |row| row.as_slice())
    }

    /// Cheapest non-artificial column with exactly this coverage.
    pub fn find_pattern(&self, coverage: &[u32]) -> Option<ColumnId> {
        self.patterns
            .get(&pattern_hash(coverage))?
            .iter()
            .copied()
            .filter(|id| self.columns[id.0].coverage() == coverage)
            .min_by(|a, b| self.columns[a.0].cost().total_cmp(&self.columns[b.0].cost()))
    }

    /// Appends `column`: a new usage variable, its cost in the objective and
    /// its contribution to every row it covers.
    ///
    /// With deduplication on, a column is rejected when a real column with
    /// the same coverage costs no more. A strictly cheaper copy is kept.
    /// Artificial columns never take part in the comparison.
    pub fn add_column(&mut self, column: Column) -> Result<ColumnId> {
        if column.coverage().len() != self.num_items() {
            return Err(Error::dimension_mismatch(
                "column coverage",
                self.num_items(),
                column.coverage().len(),
            ));
        }
        if !column.cost().is_finite() {
            return Err(Error::invalid_input("column cost must be finite"));
        }
        if column.is_empty() {
            return Err(Error::invalid_input("column covers no item"));
        }
        if self.deduplicate && !column.is_artificial() {
            if let Some(existing) = self.find_pattern(column.coverage()) {
                if column.cost() >= self.columns[existing.0].cost() - COST_EPSILON {
                    return Err(Error::DuplicateColumn { existing });
                }
            }
        }

        let id = ColumnId(self.columns.len());
        for (item, count) in column.covered_items() {
            self.incidence[item].push((id.0, count));
        }
        if !column.is_artificial() {
            self.patterns
                .entry(pattern_hash(column.coverage()))
                .or_default()
                .push(id);
        }
        trace!("added {} with cost {}", id, column.cost());
        self.columns.push(Arc::new(column));
        Ok(id)
    }

    /// Copy of this master with `column` appended.
    pub fn with_column(&self, column: Column) -> Result<(Self, ColumnId)> {
        let mut next = self.clone();
        let id = next.add_column(column)?;
        Ok((next, id))
    }

    /// Adds a penalised single-row column to every row that needs coverage,
    /// so the relaxed master is feasible before any real column exists.
    pub fn add_artificial_columns(&mut self, penalty: f64) -> Result<Vec<ColumnId>> {
        let mut added = Vec::new();
        for row in 0..self.num_items() {
            let item = &self.items[row];
            if !item.sense.needs_coverage() || item.demand <= 0.0 {
                continue;
            }
            let present = self.incidence[row]
                .iter()
                .any(|&(col, _)| self.columns[col].is_artificial());
            if present {
                continue;
            }
            let units = item.demand.ceil() as u32;
            let column =
                Column::artificial(penalty * f64::from(units), self.num_items(), row, units);
            added.push(self.add_column(column)?);
        }
        Ok(added)
    }

    pub fn cost_vector(&self) -> Vec<f64> {
        self.columns.iter().map(|c| c.cost()).collect()
    }

    pub fn objective(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(c, &v)| c.cost() * v)
            .sum()
    }

    /// Total usage of artificial columns in `values`.
    pub fn artificial_usage(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .filter(|(c, _)| c.is_artificial())
            .map(|(_, &v)| v)
            .sum()
    }

    /// Whether every row is satisfied by usage `values` within `tolerance`.
    pub fn is_covering_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        self.items.iter().enumerate().all(|(i, item)| {
            let lhs: f64 = self.incidence[i]
                .iter()
                .map(|&(col, count)| f64::from(count) * values.get(col).copied().unwrap_or(0.0))
                .sum();
            item.sense
                .constraint_sense()
                .is_satisfied(lhs, item.demand, tolerance)
        })
    }

    /// Verifies that each row's incidence list matches the columns exactly.
    pub fn is_consistent(&self) -> bool {
        self.items.iter().enumerate().all(|(i, _)| {
            let expected: Vec<(usize, u32)> = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.covers(i) > 0)
                .map(|(j, c)| (j, c.covers(i)))
                .collect();
            self.incidence[i] == expected
        })
    }

    /// Columns whose usage is capped by `bounds`. Pricing must not return
    /// their patterns, otherwise a copy would bypass the cap.
    pub fn forbidden_patterns(&self, bounds: &NodeBounds) -> Vec<ColumnId> {
        bounds
            .iter()
            .filter(|(id, b)| b.upper.is_finite() && id.0 < self.columns.len())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn check_duals(&self, duals: &DualPrices) -> Result<()> {
        if duals.computed_for() != self.num_columns() {
            return Err(Error::StaleDuals {
                expected: self.num_columns(),
                found: duals.computed_for(),
            });
        }
        if duals.values().len() != self.num_items() {
            return Err(Error::dimension_mismatch(
                "dual prices",
                self.num_items(),
                duals.values().len(),
            ));
        }
        Ok(())
    }

    /// The master as a dense linear program under `bounds`.
    pub fn linear_program(&self, bounds: &NodeBounds) -> LinearProgram {
        let n = self.columns.len();
        let mut constraints = vec![vec![0.0; n]; self.num_items()];
        for (i, row) in self.incidence.iter().enumerate() {
            for &(col, count) in row {
                constraints[i][col] = f64::from(count);
            }
        }
        LinearProgram {
            objective: self.cost_vector(),
            constraints,
            senses: self
                .items
                .iter()
                .map(|item| item.sense.constraint_sense())
                .collect(),
            rhs: self.items.iter().map(|item| item.demand).collect(),
            bounds: (0..n).map(|j| bounds.get(ColumnId(j))).collect(),
        }
    }

    /// Solves the continuous relaxation and returns usage levels and duals.
    pub fn solve_relaxed<S>(&self, solver: &S, bounds: &NodeBounds) -> Result<RelaxedSolution>
    where
        S: LpSolver + ?Sized,
    {
        let lp = self.linear_program(bounds);
        let solution = solver.solve_relaxation(&lp)?;
        match solution.status {
            LpStatus::Optimal => Ok(RelaxedSolution {
                objective: solution.objective,
                values: solution.primal,
                duals: DualPrices::new(solution.dual, self.num_columns()),
                reduced_costs: solution.reduced_costs,
            }),
            LpStatus::Infeasible => Err(Error::InfeasibleMaster),
            LpStatus::Unbounded => Err(Error::UnboundedMaster),
            LpStatus::IterationLimit => Err(Error::SolverFailure(
                "iteration limit reached on the relaxed master".into(),
            )),
        }
    }

    /// Solves the master over the current columns with integer usage.
    pub fn solve_integer<S>(
        &self,
        solver: &S,
        bounds: &NodeBounds,
        tolerance: &Tolerance,
        node_limit: usize,
    ) -> Result<IntegerSolution>
    where
        S: LpSolver + ?Sized,
    {
        solver.solve_integer(&self.linear_program(bounds), tolerance, node_limit)
    }
}
