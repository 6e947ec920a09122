//! Crew rostering: hand pairings to individual crew members.
//!
//! The master has one covering row per flight and one partitioning row per
//! crew member. A column is a roster line: the pairings one crew member
//! flies, covering that member's row once and each flight of its pairings.
//! Lines are priced per crew member, all members in parallel.

use std::collections::BTreeMap;

use log::debug;

use crate::branching::{BnpSolution, BranchAndPrice};
use crate::config::BnpConfig;
use crate::error::{Error, Result};
use crate::extract::{extract, ConsumerMapping};
use crate::lp::LpSolver;
use crate::master::MasterProblem;
use crate::model::{Column, CoverSense, Item};
use crate::pricing::{Choice, CompositePricer, KnapsackPricer, PricingProblem};

const MATCH_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct Pairing {
    pub name: String,
    pub flights: Vec<String>,
    pub cost: f64,
    /// Hours on duty.
    pub duration: f64,
}

impl Pairing {
    pub fn new<S: Into<String>>(name: S, flights: &[&str], cost: f64, duration: f64) -> Self {
        Self {
            name: name.into(),
            flights: flights.iter().map(|f| f.to_string()).collect(),
            cost,
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrewMember {
    pub name: String,
    /// Pairings this member cannot fly.
    pub unavailable: Vec<String>,
}

impl CrewMember {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            unavailable: Vec::new(),
        }
    }

    pub fn unavailable_for<S: Into<String>>(mut self, pairing: S) -> Self {
        self.unavailable.push(pairing.into());
        self
    }
}

/// Labour rules applied to every roster line.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterRules {
    pub max_duty_hours: f64,
    pub min_shifts: u32,
    pub max_shifts: u32,
    /// Pairings too close together to be flown by the same member.
    pub rest_conflicts: Vec<(String, String)>,
}

impl Default for RosterRules {
    fn default() -> Self {
        Self {
            max_duty_hours: 10.0,
            min_shifts: 1,
            max_shifts: 2,
            rest_conflicts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrewRostering {
    pairings: Vec<Pairing>,
    crew: Vec<CrewMember>,
    rules: RosterRules,
    flights: Vec<String>,
}

impl CrewRostering {
    pub fn new(pairings: Vec<Pairing>, crew: Vec<CrewMember>, rules: RosterRules) -> Result<Self> {
        if pairings.is_empty() || crew.is_empty() {
            return Err(Error::invalid_input("rostering needs pairings and crew"));
        }
        if rules.min_shifts > rules.max_shifts {
            return Err(Error::invalid_input(format!(
                "min shifts {} above max shifts {}",
                rules.min_shifts, rules.max_shifts
            )));
        }
        let mut flights: Vec<String> = Vec::new();
        for pairing in &pairings {
            if pairing.flights.is_empty() {
                return Err(Error::invalid_input(format!(
                    "pairing {} flies nothing",
                    pairing.name
                )));
            }
            for flight in &pairing.flights {
                if !flights.contains(flight) {
                    flights.push(flight.clone());
                }
            }
        }

        let rostering = Self {
            pairings,
            crew,
            rules,
            flights,
        };
        let names = rostering
            .rules
            .rest_conflicts
            .iter()
            .flat_map(|(a, b)| [a, b])
            .chain(rostering.crew.iter().flat_map(|m| m.unavailable.iter()));
        for name in names {
            rostering.pairing_index(name)?;
        }
        Ok(rostering)
    }

    /// Flight names in order of first appearance.
    pub fn flights(&self) -> &[String] {
        &self.flights
    }

    pub fn crew(&self) -> &[CrewMember] {
        &self.crew
    }

    /// Master row of crew member `member`.
    pub fn crew_row(&self, member: usize) -> usize {
        self.flights.len() + member
    }

    fn pairing_index(&self, name: &str) -> Result<usize> {
        self.pairings
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::invalid_input(format!("unknown pairing {name}")))
    }

    fn flight_index(&self, name: &str) -> usize {
        self.flights
            .iter()
            .position(|f| f == name)
            .unwrap_or(self.flights.len())
    }

    pub fn items(&self) -> Vec<Item> {
        let flights = self.flights.iter().map(|f| Item::new(f.clone(), 0.0));
        let crew = self.crew.iter().map(|m| {
            Item::new(m.name.clone(), 0.0).with_sense(CoverSense::Partition)
        });
        flights.chain(crew).collect()
    }

    /// Empty master; branch-and-price seeds it with artificial lines.
    pub fn master(&self) -> Result<MasterProblem> {
        MasterProblem::new(self.items())
    }

    fn member_pricer(&self, member: usize) -> Result<KnapsackPricer> {
        let choices = self
            .pairings
            .iter()
            .map(|p| {
                let covers = p.flights.iter().map(|f| (self.flight_index(f), 1)).collect();
                Choice::new(p.name.clone(), p.duration, p.cost, covers)
            })
            .collect();
        let crew = &self.crew[member];
        let mut pricer = KnapsackPricer::new(
            self.flights.len() + self.crew.len(),
            choices,
            self.rules.max_duty_hours,
            0.0,
        )
        .with_fixed_row(self.crew_row(member), 1)
        .with_cardinality(self.rules.min_shifts.max(1), Some(self.rules.max_shifts))
        .with_label(crew.name.clone());
        for (a, b) in &self.rules.rest_conflicts {
            pricer = pricer.with_conflict(self.pairing_index(a)?, self.pairing_index(b)?);
        }
        for pairing in &crew.unavailable {
            pricer = pricer.with_copy_limit(self.pairing_index(pairing)?, 0);
        }
        Ok(pricer)
    }

    /// One knapsack pricer per crew member, run in parallel.
    pub fn pricer(&self) -> Result<CompositePricer> {
        let pricers = (0..self.crew.len())
            .map(|m| {
                self.member_pricer(m)
                    .map(|p| Box::new(p) as Box<dyn PricingProblem>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompositePricer::new(pricers))
    }

    pub fn solve<S: LpSolver + ?Sized>(
        &self,
        solver: &S,
        config: BnpConfig,
    ) -> Result<BnpSolution> {
        debug!(
            "rostering {} pairings over {} crew members",
            self.pairings.len(),
            self.crew.len()
        );
        let pricer = self.pricer()?;
        BranchAndPrice::new(solver, &pricer, config).solve(self.master()?)
    }

    /// Pairings flown by each crew member.
    ///
    /// Every used roster line is matched back to the set of that member's
    /// pairings whose flights and cost add up to it.
    pub fn roster(&self, solution: &BnpSolution) -> Result<BTreeMap<String, Vec<String>>> {
        let rows = (0..self.crew.len()).map(|m| self.crew_row(m)).collect();
        let assignment = extract(solution, &ConsumerMapping::ByItems(rows))?;

        let mut roster = BTreeMap::new();
        for (member, columns) in assignment.consumers {
            let m = self
                .crew
                .iter()
                .position(|c| c.name == member)
                .ok_or_else(|| Error::invalid_input(format!("unknown crew member {member}")))?;
            let mut pairings = Vec::new();
            for id in columns {
                let column = solution
                    .master
                    .column(id)
                    .ok_or_else(|| Error::invalid_input(format!("unknown {id}")))?;
                let line = self.line_pairings(m, column).ok_or_else(|| {
                    Error::invalid_input(format!("{id} is not a roster line of {member}"))
                })?;
                pairings.extend(line.into_iter().map(|p| self.pairings[p].name.clone()));
            }
            roster.insert(member, pairings);
        }
        Ok(roster)
    }

    /// Pairings of `member` that make up `column`, in pairing order.
    fn line_pairings(&self, member: usize, column: &Column) -> Option<Vec<usize>> {
        let target = column.coverage().get(..self.flights.len())?;
        let allowed: Vec<usize> = (0..self.pairings.len())
            .filter(|&p| !self.crew[member].unavailable.contains(&self.pairings[p].name))
            .collect();
        let mut line = Line {
            covered: vec![0; self.flights.len()],
            chosen: Vec::new(),
        };
        self.match_line(&allowed, target, column.cost(), &mut line)
            .then_some(line.chosen)
    }

    fn match_line(&self, allowed: &[usize], target: &[u32], cost: f64, line: &mut Line) -> bool {
        if line.covered == target {
            let shifts = line.chosen.len() as u32;
            let spent: f64 = line.chosen.iter().map(|&p| self.pairings[p].cost).sum();
            let hours: f64 = line.chosen.iter().map(|&p| self.pairings[p].duration).sum();
            return (spent - cost).abs() <= MATCH_TOLERANCE
                && hours <= self.rules.max_duty_hours + MATCH_TOLERANCE
                && (self.rules.min_shifts.max(1)..=self.rules.max_shifts).contains(&shifts);
        }
        for (k, &p) in allowed.iter().enumerate() {
            if line.chosen.iter().any(|&q| self.in_conflict(p, q)) {
                continue;
            }
            let flights: Vec<usize> = self.pairings[p]
                .flights
                .iter()
                .map(|f| self.flight_index(f))
                .collect();
            for &f in &flights {
                line.covered[f] += 1;
            }
            line.chosen.push(p);
            let fits = line.covered.iter().zip(target).all(|(c, t)| c <= t);
            if fits && self.match_line(&allowed[k + 1..], target, cost, line) {
                return true;
            }
            line.chosen.pop();
            for &f in &flights {
                line.covered[f] -= 1;
            }
        }
        false
    }

    fn in_conflict(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.pairings[a].name, &self.pairings[b].name);
        self.rules
            .rest_conflicts
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

/// Partial roster line during matching.
struct Line {
    covered: Vec<u32>,
    chosen: Vec<usize>,
}
