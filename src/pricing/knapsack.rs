use bitvec::prelude::*;
use log::trace;

use super::{ColumnCost, ForbiddenPatterns, PricedColumn, PricingProblem};
use crate::error::{Error, Result};
use crate::master::{ColumnId, DualPrices, MasterProblem};
use crate::model::{Column, Item};

const CAPACITY_SLACK: f64 = 1e-9;

/// One building block a column can be made of: a flight leg, an ordered
/// width, a pairing on a roster line.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub name: String,
    pub weight: f64,
    pub cost: f64,
    /// Master rows covered by one copy, with counts.
    pub covers: Vec<(usize, u32)>,
    pub max_copies: u32,
}

impl Choice {
    pub fn new<S: Into<String>>(name: S, weight: f64, cost: f64, covers: Vec<(usize, u32)>) -> Self {
        Self {
            name: name.into(),
            weight,
            cost,
            covers,
            max_copies: 1,
        }
    }

    pub fn with_max_copies(mut self, max_copies: u32) -> Self {
        self.max_copies = max_copies;
        self
    }

    /// Net dual value of one copy.
    fn value(&self, duals: &DualPrices) -> f64 {
        self.covers
            .iter()
            .map(|&(row, count)| duals.get(row) * f64::from(count))
            .sum::<f64>()
            - self.cost
    }
}

/// Exact pricer for columns built as a bounded knapsack over choices.
///
/// A column takes `x_c` copies of each choice subject to
///
/// * `sum_c weight_c * x_c <= capacity`
/// * `x_c <= max_copies_c`
/// * `min_items <= sum_c x_c <= max_items`
/// * no two conflicting choices together
///
/// and always covers the fixed rows (e.g. the crew member a roster line
/// belongs to). Column cost is `fixed_cost + sum_c cost_c * x_c`, which
/// keeps the objective `sum_c (pi . covers_c - cost_c) * x_c` linear so
/// depth-first branch-and-bound with a fractional bound stays exact.
#[derive(Debug, Clone)]
pub struct KnapsackPricer {
    num_rows: usize,
    choices: Vec<Choice>,
    capacity: f64,
    fixed_cost: f64,
    min_items: u32,
    max_items: Option<u32>,
    conflicts: Vec<BitVec>,
    fixed_rows: Vec<(usize, u32)>,
    label: Option<String>,
}

impl KnapsackPricer {
    pub fn new(num_rows: usize, choices: Vec<Choice>, capacity: f64, fixed_cost: f64) -> Self {
        let n = choices.len();
        Self {
            num_rows,
            choices,
            capacity,
            fixed_cost,
            min_items: 1,
            max_items: None,
            conflicts: vec![bitvec![0; n]; n],
            fixed_rows: Vec::new(),
            label: None,
        }
    }

    /// One choice per item, weighted by its consumption and covering only
    /// its own row.
    pub fn from_items(items: &[Item], capacity: f64, cost: ColumnCost) -> Self {
        let choices = items
            .iter()
            .enumerate()
            .map(|(i, item)| Choice::new(item.name.clone(), item.consumption, cost.unit(i), vec![(i, 1)]))
            .collect();
        Self::new(items.len(), choices, capacity, cost.fixed)
    }

    pub fn with_max_copies(mut self, max_copies: Vec<u32>) -> Self {
        for (choice, copies) in self.choices.iter_mut().zip(max_copies) {
            choice.max_copies = copies;
        }
        self
    }

    pub fn with_copy_limit(mut self, choice: usize, copies: u32) -> Self {
        if let Some(choice) = self.choices.get_mut(choice) {
            choice.max_copies = copies;
        }
        self
    }

    /// Bounds on the total number of copies in a column.
    pub fn with_cardinality(mut self, min_items: u32, max_items: Option<u32>) -> Self {
        self.min_items = min_items;
        self.max_items = max_items;
        self
    }

    pub fn with_conflict(mut self, a: usize, b: usize) -> Self {
        let n = self.choices.len();
        if a < n && b < n {
            self.conflicts[a].set(b, true);
            self.conflicts[b].set(a, true);
        }
        self
    }

    /// Every generated column covers `row` exactly `count` times. A choice
    /// covering only that row is disabled.
    pub fn with_fixed_row(mut self, row: usize, count: u32) -> Self {
        for choice in &mut self.choices {
            if choice.covers.iter().all(|&(r, _)| r == row) {
                choice.max_copies = 0;
            }
        }
        self.fixed_rows.push((row, count));
        self
    }

    /// Labels generated columns `"<label>: <choice>, <choice>"`.
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub(crate) fn weight(&self, choice: usize) -> f64 {
        self.choices[choice].weight
    }

    pub(crate) fn copies(&self, choice: usize) -> u32 {
        self.choices[choice].max_copies
    }

    pub(crate) fn min_items(&self) -> u32 {
        self.min_items
    }

    pub(crate) fn max_items(&self) -> Option<u32> {
        self.max_items
    }

    pub(crate) fn conflicts(&self, a: usize, b: usize) -> bool {
        self.conflicts[a][b]
    }

    pub(crate) fn conflicts_with(&self, choice: usize, chosen: &BitSlice) -> bool {
        chosen.iter_ones().any(|other| self.conflicts(choice, other))
    }

    pub(crate) fn values(&self, duals: &DualPrices) -> Vec<f64> {
        self.choices.iter().map(|c| c.value(duals)).collect()
    }

    /// Choices in decreasing value density; non-positive ones last.
    pub(crate) fn ordering(&self, values: &[f64]) -> Vec<usize> {
        let density = |c: usize| -> f64 {
            if values[c] <= 0.0 {
                f64::NEG_INFINITY
            } else if self.weight(c) <= 0.0 {
                f64::INFINITY
            } else {
                values[c] / self.weight(c)
            }
        };
        let mut order: Vec<usize> = (0..self.choices.len())
            .filter(|&c| self.copies(c) > 0)
            .collect();
        order.sort_by(|&a, &b| density(b).total_cmp(&density(a)));
        order
    }

    /// Coverage and cost of a column taking `counts[c]` copies of choice `c`.
    pub(crate) fn build_column(&self, counts: &[u32]) -> Column {
        let mut coverage = vec![0; self.num_rows];
        for &(row, count) in &self.fixed_rows {
            coverage[row] += count;
        }
        let mut cost = self.fixed_cost;
        let mut names = Vec::new();
        for (choice, &copies) in self.choices.iter().zip(counts) {
            if copies == 0 {
                continue;
            }
            for &(row, count) in &choice.covers {
                coverage[row] += count * copies;
            }
            cost += choice.cost * f64::from(copies);
            names.push(if copies > 1 {
                format!("{} x{}", choice.name, copies)
            } else {
                choice.name.clone()
            });
        }
        let column = Column::new(cost, coverage);
        match &self.label {
            Some(label) => column.with_label(format!("{label}: {}", names.join(", "))),
            None => column,
        }
    }

    pub(crate) fn validate(&self, master: &MasterProblem, duals: &DualPrices) -> Result<()> {
        master.check_duals(duals)?;
        if self.num_rows != master.num_items() {
            return Err(Error::dimension_mismatch(
                "pricer rows",
                master.num_items(),
                self.num_rows,
            ));
        }
        let rows_in_range = self
            .choices
            .iter()
            .flat_map(|c| c.covers.iter())
            .chain(self.fixed_rows.iter())
            .all(|&(row, _)| row < self.num_rows);
        if !rows_in_range {
            return Err(Error::invalid_input("choice covers a row outside the master"));
        }
        let finite = self.capacity.is_finite()
            && self
                .choices
                .iter()
                .all(|c| c.weight.is_finite() && c.weight >= 0.0 && c.cost.is_finite());
        if !finite {
            return Err(Error::invalid_input(
                "knapsack weights, costs and capacity must be finite",
            ));
        }
        Ok(())
    }
}

struct Search<'a> {
    pricer: &'a KnapsackPricer,
    order: Vec<usize>,
    values: Vec<f64>,
    forbidden: ForbiddenPatterns<'a>,
    counts: Vec<u32>,
    chosen: BitVec,
    best: Option<(f64, Vec<u32>)>,
    nodes: usize,
}

impl Search<'_> {
    fn explore(&mut self, pos: usize, used: f64, taken: u32, value: f64) {
        self.nodes += 1;
        if let Some((best, _)) = &self.best {
            if self.bound(pos, used, value) <= *best {
                return;
            }
        }
        if pos == self.order.len() {
            self.leaf(taken, value);
            return;
        }

        let choice = self.order[pos];
        let limit = self.limit(choice, used, taken);
        let weight = self.pricer.weight(choice);
        let choice_value = self.values[choice];

        let mut options: Vec<u32> = (0..=limit).collect();
        if choice_value > 0.0 {
            options.reverse();
        }
        for copies in options {
            self.counts[choice] = copies;
            self.chosen.set(choice, copies > 0);
            self.explore(
                pos + 1,
                used + weight * f64::from(copies),
                taken + copies,
                value + choice_value * f64::from(copies),
            );
        }
        self.counts[choice] = 0;
        self.chosen.set(choice, false);
    }

    fn limit(&self, choice: usize, used: f64, taken: u32) -> u32 {
        if self.pricer.conflicts_with(choice, &self.chosen) {
            return 0;
        }
        let mut limit = self.pricer.copies(choice);
        let weight = self.pricer.weight(choice);
        if weight > 0.0 {
            let room = ((self.pricer.capacity() - used + CAPACITY_SLACK) / weight).floor();
            limit = limit.min(room.max(0.0) as u32);
        }
        if let Some(max_items) = self.pricer.max_items() {
            limit = limit.min(max_items.saturating_sub(taken));
        }
        limit
    }

    /// Fractional knapsack over the positive choices still undecided.
    fn bound(&self, pos: usize, used: f64, value: f64) -> f64 {
        let mut room = self.pricer.capacity() - used;
        let mut bound = value;
        for &choice in &self.order[pos..] {
            let choice_value = self.values[choice];
            if choice_value <= 0.0 {
                break;
            }
            let copies = f64::from(self.pricer.copies(choice));
            let weight = self.pricer.weight(choice);
            if weight <= 0.0 {
                bound += choice_value * copies;
                continue;
            }
            if room <= 0.0 {
                break;
            }
            let take = copies.min(room / weight);
            bound += choice_value * take;
            room -= take * weight;
        }
        bound
    }

    fn leaf(&mut self, taken: u32, value: f64) {
        if taken < self.pricer.min_items() {
            return;
        }
        if self.best.as_ref().is_some_and(|(best, _)| value <= *best) {
            return;
        }
        let column = self.pricer.build_column(&self.counts);
        if column.is_empty() {
            return;
        }
        if self.forbidden.blocks(&column) {
            trace!("skipping forbidden pattern {:?}", column.coverage());
            return;
        }
        self.best = Some((value, self.counts.clone()));
    }
}

impl PricingProblem for KnapsackPricer {
    fn price(
        &self,
        master: &MasterProblem,
        duals: &DualPrices,
        forbidden: &[ColumnId],
    ) -> Result<Option<PricedColumn>> {
        self.validate(master, duals)?;
        let values = self.values(duals);
        let n = self.choices.len();
        let mut search = Search {
            pricer: self,
            order: self.ordering(&values),
            values,
            forbidden: ForbiddenPatterns::new(master, forbidden),
            counts: vec![0; n],
            chosen: bitvec![0; n],
            best: None,
            nodes: 0,
        };
        search.explore(0, 0.0, 0, 0.0);
        trace!("knapsack pricing explored {} nodes", search.nodes);

        Ok(search
            .best
            .map(|(_, counts)| PricedColumn::new(self.build_column(&counts), duals)))
    }
}
