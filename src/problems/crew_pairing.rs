//! Crew pairing: cover every flight leg with duty sequences (pairings)
//! that respect a duty time limit.

use log::debug;

use crate::branching::{BnpSolution, BranchAndPrice};
use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::extract::{extract, Assignment, ConsumerMapping};
use crate::lp::LpSolver;
use crate::master::{ColumnId, MasterProblem};
use crate::model::{Column, CoverSense, Item};
use crate::pricing::{ColumnCost, KnapsackPricer};

#[derive(Debug, Clone, PartialEq)]
pub struct Flight {
    pub name: String,
    /// Hours.
    pub duration: f64,
}

impl Flight {
    pub fn new<S: Into<String>>(name: S, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SeedPairing {
    name: String,
    flights: Vec<usize>,
    cost: f64,
}

#[derive(Debug, Clone)]
pub struct CrewPairing {
    flights: Vec<Flight>,
    duty_limit: f64,
    fixed_cost: f64,
    hourly_cost: f64,
    max_legs: Option<u32>,
    sense: CoverSense,
    seeds: Vec<SeedPairing>,
}

impl CrewPairing {
    pub fn new(flights: Vec<Flight>, duty_limit: f64) -> Result<Self> {
        if flights.is_empty() {
            return Err(Error::invalid_input("no flights to cover"));
        }
        if !(duty_limit.is_finite() && duty_limit > 0.0) {
            return Err(Error::invalid_input(format!(
                "duty limit must be positive, got {duty_limit}"
            )));
        }
        if let Some(flight) = flights
            .iter()
            .find(|f| !(f.duration.is_finite() && f.duration >= 0.0))
        {
            return Err(Error::invalid_input(format!(
                "flight {} has invalid duration {}",
                flight.name, flight.duration
            )));
        }
        Ok(Self {
            flights,
            duty_limit,
            fixed_cost: 0.0,
            hourly_cost: 0.0,
            max_legs: None,
            sense: CoverSense::Cover,
            seeds: Vec::new(),
        })
    }

    /// Generated pairings cost `fixed + hourly * total duration`.
    pub fn with_cost(mut self, fixed: f64, hourly: f64) -> Self {
        self.fixed_cost = fixed;
        self.hourly_cost = hourly;
        self
    }

    pub fn with_max_legs(mut self, max_legs: u32) -> Self {
        self.max_legs = Some(max_legs);
        self
    }

    /// Covers every flight exactly once instead of at least once.
    pub fn with_partitioning(mut self, partition: bool) -> Self {
        self.sense = if partition {
            CoverSense::Partition
        } else {
            CoverSense::Cover
        };
        self
    }

    /// Adds an initial pairing with an explicit cost.
    pub fn with_seed<S: Into<String>>(mut self, name: S, flights: Vec<usize>, cost: f64) -> Self {
        self.seeds.push(SeedPairing {
            name: name.into(),
            flights,
            cost,
        });
        self
    }

    pub fn flights(&self) -> &[Flight] {
        &self.flights
    }

    pub fn items(&self) -> Vec<Item> {
        self.flights
            .iter()
            .map(|f| Item::new(f.name.clone(), f.duration).with_sense(self.sense))
            .collect()
    }

    pub fn column_cost(&self) -> ColumnCost {
        ColumnCost::new(
            self.fixed_cost,
            self.flights
                .iter()
                .map(|f| self.hourly_cost * f.duration)
                .collect(),
        )
    }

    /// Cost of a generated pairing flying `flights`.
    pub fn pairing_cost(&self, flights: &[usize]) -> f64 {
        let mut coverage = vec![0; self.flights.len()];
        for &f in flights {
            if let Some(count) = coverage.get_mut(f) {
                *count += 1;
            }
        }
        self.column_cost().of(&coverage)
    }

    pub fn master(&self) -> Result<MasterProblem> {
        let mut master = MasterProblem::new(self.items())?;
        for seed in &self.seeds {
            if let Some(&f) = seed.flights.iter().find(|&&f| f >= self.flights.len()) {
                return Err(Error::invalid_input(format!(
                    "seed {} flies unknown flight {f}",
                    seed.name
                )));
            }
            let column = Column::from_items(seed.cost, self.flights.len(), &seed.flights)
                .with_label(seed.name.clone());
            master.add_column(column)?;
        }
        Ok(master)
    }

    pub fn pricer(&self) -> KnapsackPricer {
        KnapsackPricer::from_items(&self.items(), self.duty_limit, self.column_cost())
            .with_cardinality(1, self.max_legs)
            .with_label("pairing")
    }

    pub fn solve<S: LpSolver + ?Sized>(
        &self,
        solver: &S,
        config: BnpConfig,
    ) -> Result<BnpSolution> {
        debug!(
            "pairing {} flights under a {}h duty limit from {} seeds",
            self.flights.len(),
            self.duty_limit,
            self.seeds.len()
        );
        let pricer = self.pricer();
        BranchAndPrice::new(solver, &pricer, config).solve(self.master()?)
    }

    /// Every unit of pairing usage is one crew, named `crew1`, `crew2`, ...
    pub fn crews(&self, solution: &BnpSolution) -> Result<Assignment> {
        extract(solution, &ConsumerMapping::per_unit("crew"))
    }

    /// Flights flown by a pairing of the solved master.
    pub fn flights_of<'a>(&'a self, master: &MasterProblem, id: ColumnId) -> Vec<&'a str> {
        master
            .column(id)
            .map(|column| {
                column
                    .covered_items()
                    .filter_map(|(f, _)| self.flights.get(f))
                    .map(|f| f.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
