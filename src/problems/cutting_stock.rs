use log::debug;

use crate::branching::{BnpSolution, BranchAndPrice};
use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::extract::{extract, Assignment, ConsumerMapping};
use crate::lp::LpSolver;
use crate::master::MasterProblem;
use crate::model::{Column, Item};
use crate::pricing::{ColumnCost, KnapsackPricer};

/// A width to cut and how many pieces of it are wanted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Order {
    pub width: f64,
    pub demand: u32,
}

impl Order {
    pub fn new(width: f64, demand: u32) -> Self {
        Self { width, demand }
    }
}

/// One-dimensional cutting stock: cut every order out of stock rolls of a
/// single width using as few rolls as possible.
///
/// Columns are cutting patterns; a pattern may hold several pieces of the
/// same width.
#[derive(Debug, Clone)]
pub struct CuttingStock {
    roll_width: f64,
    roll_cost: f64,
    orders: Vec<Order>,
}

impl CuttingStock {
    pub fn new(roll_width: f64, orders: Vec<Order>) -> Result<Self> {
        if !(roll_width.is_finite() && roll_width > 0.0) {
            return Err(Error::invalid_input(format!(
                "roll width must be positive, got {roll_width}"
            )));
        }
        if orders.is_empty() {
            return Err(Error::invalid_input("no orders to cut"));
        }
        for (i, order) in orders.iter().enumerate() {
            if !(order.width.is_finite() && order.width > 0.0 && order.width <= roll_width) {
                return Err(Error::invalid_input(format!(
                    "order {i} of width {} does not fit a roll of width {roll_width}",
                    order.width
                )));
            }
        }
        Ok(Self {
            roll_width,
            roll_cost: 1.0,
            orders,
        })
    }

    pub fn with_roll_cost(mut self, roll_cost: f64) -> Self {
        self.roll_cost = roll_cost;
        self
    }

    pub fn roll_width(&self) -> f64 {
        self.roll_width
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn items(&self) -> Vec<Item> {
        self.orders
            .iter()
            .map(|order| {
                Item::new(format!("width {}", order.width), order.width)
                    .with_demand(f64::from(order.demand))
            })
            .collect()
    }

    /// Pieces of `order` that fit on one roll.
    fn fits(&self, order: &Order) -> u32 {
        (self.roll_width / order.width).floor() as u32
    }

    /// Master seeded with one homogeneous pattern per order.
    pub fn master(&self) -> Result<MasterProblem> {
        let mut master = MasterProblem::new(self.items())?;
        let n = self.orders.len();
        for (i, order) in self.orders.iter().enumerate() {
            let mut coverage = vec![0; n];
            coverage[i] = self.fits(order);
            let column = Column::new(self.roll_cost, coverage)
                .with_label(format!("roll: width {} x{}", order.width, self.fits(order)));
            master.add_column(column)?;
        }
        Ok(master)
    }

    pub fn pricer(&self) -> KnapsackPricer {
        let n = self.orders.len();
        KnapsackPricer::from_items(
            &self.items(),
            self.roll_width,
            ColumnCost::flat(self.roll_cost, n),
        )
        .with_max_copies(self.orders.iter().map(|o| self.fits(o)).collect())
        .with_label("roll")
    }

    /// Material bound on the number of rolls, `ceil(sum w_i d_i / W)`.
    pub fn lower_bound(&self) -> f64 {
        let material: f64 = self
            .orders
            .iter()
            .map(|o| o.width * f64::from(o.demand))
            .sum();
        (material / self.roll_width - 1e-9).ceil().max(0.0)
    }

    /// Runs branch-and-price. The objective is marked integral whenever
    /// the roll cost is a whole number.
    pub fn solve<S: LpSolver + ?Sized>(
        &self,
        solver: &S,
        config: BnpConfig,
    ) -> Result<BnpSolution> {
        let integral = config.integral_objective || self.roll_cost.fract() == 0.0;
        let config = config.with_integral_objective(integral);
        debug!(
            "cutting {} orders from rolls of width {}, at least {} rolls",
            self.orders.len(),
            self.roll_width,
            self.lower_bound()
        );
        let pricer = self.pricer();
        BranchAndPrice::new(solver, &pricer, config).solve(self.master()?)
    }

    /// One consumer per cut roll, named `roll1`, `roll2`, ...
    pub fn rolls(&self, solution: &BnpSolution) -> Result<Assignment> {
        extract(solution, &ConsumerMapping::per_unit("roll"))
    }
}
