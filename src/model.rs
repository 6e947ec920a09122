use crate::lp::ConstraintSense;

/// How a row's coverage relates to its demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CoverSense {
    /// covered at least `demand` times (set covering)
    #[default]
    Cover,
    /// covered exactly `demand` times (set partitioning)
    Partition,
    /// covered at most `demand` times
    Pack,
}

impl CoverSense {
    pub fn constraint_sense(self) -> ConstraintSense {
        match self {
            CoverSense::Cover => ConstraintSense::GreaterEqual,
            CoverSense::Partition => ConstraintSense::Equal,
            CoverSense::Pack => ConstraintSense::LessEqual,
        }
    }

    /// Whether a zero-usage master violates a row with positive demand.
    pub fn needs_coverage(self) -> bool {
        !matches!(self, CoverSense::Pack)
    }
}

/// A demand unit: a flight leg, an ordered width, a pairing to staff or a
/// crew member's roster slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    /// Resource consumed per covered unit (duration, width, ...).
    pub consumption: f64,
    pub demand: f64,
    pub sense: CoverSense,
}

impl Item {
    pub fn new<S: Into<String>>(name: S, consumption: f64) -> Self {
        Self {
            name: name.into(),
            consumption,
            demand: 1.0,
            sense: CoverSense::Cover,
        }
    }

    pub fn with_demand(mut self, demand: f64) -> Self {
        self.demand = demand;
        self
    }

    pub fn with_sense(mut self, sense: CoverSense) -> Self {
        self.sense = sense;
        self
    }
}

/// A pairing, roster line or cutting pattern.
///
/// `coverage[i]` is how many times the column covers item `i`. Columns are
/// immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    label: Option<String>,
    cost: f64,
    coverage: Vec<u32>,
    artificial: bool,
}

impl Column {
    pub fn new(cost: f64, coverage: Vec<u32>) -> Self {
        Self {
            label: None,
            cost,
            coverage,
            artificial: false,
        }
    }

    /// Column covering each of `covered` exactly once.
    pub fn from_items(cost: f64, num_items: usize, covered: &[usize]) -> Self {
        let mut coverage = vec![0; num_items];
        for &i in covered {
            if let Some(slot) = coverage.get_mut(i) {
                *slot += 1;
            }
        }
        Self::new(cost, coverage)
    }

    /// Penalised placeholder covering `units` of a single row.
    pub fn artificial(cost: f64, num_items: usize, row: usize, units: u32) -> Self {
        let mut coverage = vec![0; num_items];
        if let Some(slot) = coverage.get_mut(row) {
            *slot = units;
        }
        Self {
            label: Some(format!("artificial-{row}")),
            cost,
            coverage,
            artificial: true,
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn coverage(&self) -> &[u32] {
        &self.coverage
    }

    pub fn covers(&self, item: usize) -> u32 {
        self.coverage.get(item).copied().unwrap_or(0)
    }

    pub fn is_artificial(&self) -> bool {
        self.artificial
    }

    /// `(item, count)` for every item with nonzero coverage.
    pub fn covered_items(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.coverage
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| (i, count))
    }

    pub fn is_empty(&self) -> bool {
        self.coverage.iter().all(|&count| count == 0)
    }

    /// Total resource use, e.g. duty hours or cut width.
    pub fn consumption(&self, items: &[Item]) -> f64 {
        self.covered_items()
            .map(|(i, count)| items.get(i).map_or(0.0, |item| item.consumption) * f64::from(count))
            .sum()
    }

    /// `cost - sum_i duals_i * coverage_i`
    pub fn reduced_cost(&self, duals: &[f64]) -> f64 {
        self.cost
            - self
                .covered_items()
                .map(|(i, count)| duals.get(i).copied().unwrap_or(0.0) * f64::from(count))
                .sum::<f64>()
    }
}
