//! Read-only projection of a finished search onto its consumers: which
//! columns are used, and who (a crew member, a cut roll) gets which.

use std::collections::BTreeMap;

use crate::branching::BnpSolution;
use crate::error::{Error, Result};
use crate::master::{ColumnId, MasterProblem};

const USAGE_TOLERANCE: f64 = 1e-6;

/// How used columns are handed out to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerMapping {
    /// Every unit of usage is a consumer of its own, named `<prefix><n>`
    /// (one cut roll per unit of a cutting pattern).
    PerUnit { prefix: String },
    /// The consumer is the master row, named after its item, and gets the
    /// used columns covering it (a crew member and its roster line).
    ByItems(Vec<usize>),
}

impl ConsumerMapping {
    pub fn per_unit<S: Into<String>>(prefix: S) -> Self {
        ConsumerMapping::PerUnit {
            prefix: prefix.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsedColumn {
    pub id: ColumnId,
    pub usage: u32,
    pub cost: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub objective: f64,
    /// Used non-artificial columns in id order.
    pub columns: Vec<UsedColumn>,
    /// Consumer name to its columns, one entry per unit of usage.
    pub consumers: BTreeMap<String, Vec<ColumnId>>,
}

/// Names of the items covered by `id`, repeated by coverage count.
pub fn items_covered(master: &MasterProblem, id: ColumnId) -> Result<Vec<&str>> {
    let column = master
        .column(id)
        .ok_or_else(|| Error::invalid_input(format!("unknown {id}")))?;
    Ok(column
        .covered_items()
        .flat_map(|(item, count)| {
            std::iter::repeat(master.items()[item].name.as_str()).take(count as usize)
        })
        .collect())
}

pub fn extract(solution: &BnpSolution, mapping: &ConsumerMapping) -> Result<Assignment> {
    let master = &solution.master;
    if solution.values.len() != master.num_columns() {
        return Err(Error::dimension_mismatch(
            "solution values",
            master.num_columns(),
            solution.values.len(),
        ));
    }

    let mut columns = Vec::new();
    for (id, column) in master.columns() {
        let value = solution.values[id.0];
        if (value - value.round()).abs() > USAGE_TOLERANCE || value < -USAGE_TOLERANCE {
            return Err(Error::invalid_input(format!(
                "{id} has non-integral usage {value}"
            )));
        }
        let usage = value.round() as u32;
        if usage == 0 || column.is_artificial() {
            continue;
        }
        columns.push(UsedColumn {
            id,
            usage,
            cost: column.cost(),
            label: column.label().map(str::to_owned),
        });
    }

    let mut consumers = BTreeMap::new();
    match mapping {
        ConsumerMapping::PerUnit { prefix } => {
            let total: u32 = columns.iter().map(|c| c.usage).sum();
            let width = total.to_string().len();
            let units = columns
                .iter()
                .flat_map(|c| std::iter::repeat(c.id).take(c.usage as usize));
            for (n, id) in units.enumerate() {
                consumers.insert(format!("{prefix}{:0width$}", n + 1), vec![id]);
            }
        }
        ConsumerMapping::ByItems(rows) => {
            for &row in rows {
                let item = master.items().get(row).ok_or_else(|| {
                    Error::invalid_input(format!("consumer row {row} is not a master row"))
                })?;
                let assigned: Vec<ColumnId> = columns
                    .iter()
                    .filter(|c| master.column(c.id).is_some_and(|col| col.covers(row) > 0))
                    .flat_map(|c| std::iter::repeat(c.id).take(c.usage as usize))
                    .collect();
                consumers.insert(item.name.clone(), assigned);
            }
        }
    }

    Ok(Assignment {
        objective: solution.objective,
        columns,
        consumers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branching::{SearchStats, SearchStatus};
    use crate::model::{Column, CoverSense, Item};

    fn solution() -> BnpSolution {
        let items = vec![
            Item::new("Flight1", 1.0),
            Item::new("Flight2", 1.0),
            Item::new("Crew1", 0.0).with_sense(CoverSense::Partition),
            Item::new("Crew2", 0.0).with_sense(CoverSense::Partition),
        ];
        let mut master = MasterProblem::new(items).unwrap();
        master
            .add_column(Column::from_items(300.0, 4, &[0, 2]).with_label("Crew1: Pairing1"))
            .unwrap();
        master
            .add_column(Column::from_items(250.0, 4, &[1, 3]).with_label("Crew2: Pairing2"))
            .unwrap();
        master
            .add_column(Column::from_items(100.0, 4, &[0, 1, 3]))
            .unwrap();
        master.add_artificial_columns(1e6).unwrap();
        let mut values = vec![0.0; master.num_columns()];
        values[0] = 1.0;
        values[1] = 1.0 - 1e-9;
        BnpSolution {
            objective: 550.0,
            values,
            master,
            status: SearchStatus::Optimal,
            root_bound: 550.0,
            open_bound: None,
            stats: SearchStats::default(),
            warnings: vec![],
        }
    }

    #[test]
    fn test_by_items() {
        let solution = solution();
        let assignment = extract(&solution, &ConsumerMapping::ByItems(vec![2, 3])).unwrap();

        assert_eq!(assignment.objective, 550.0);
        assert_eq!(assignment.columns.len(), 2);
        assert_eq!(assignment.columns[1].label.as_deref(), Some("Crew2: Pairing2"));
        assert_eq!(assignment.consumers["Crew1"], vec![ColumnId(0)]);
        assert_eq!(assignment.consumers["Crew2"], vec![ColumnId(1)]);
    }

    #[test]
    fn test_per_unit() {
        let mut solution = solution();
        solution.values[0] = 2.0;
        let assignment = extract(&solution, &ConsumerMapping::per_unit("roll")).unwrap();

        let names: Vec<&str> = assignment.consumers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["roll1", "roll2", "roll3"]);
        assert_eq!(assignment.consumers["roll3"], vec![ColumnId(1)]);
    }

    #[test]
    fn test_is_idempotent() {
        let solution = solution();
        let mapping = ConsumerMapping::ByItems(vec![0, 1, 2, 3]);
        assert_eq!(
            extract(&solution, &mapping).unwrap(),
            extract(&solution, &mapping).unwrap()
        );
    }

    #[test]
    fn test_artificial_columns_are_hidden() {
        let mut solution = solution();
        let artificial = solution
            .master
            .columns()
            .find(|(_, c)| c.is_artificial())
            .map(|(id, _)| id)
            .unwrap();
        solution.values[artificial.0] = 1.0;
        let assignment = extract(&solution, &ConsumerMapping::ByItems(vec![0])).unwrap();
        assert!(assignment.columns.iter().all(|c| c.id != artificial));
    }

    #[test]
    fn test_malformed_input() {
        let mut solution = solution();
        assert!(extract(&solution, &ConsumerMapping::ByItems(vec![9])).is_err());
        solution.values[2] = 0.5;
        assert!(extract(&solution, &ConsumerMapping::ByItems(vec![0])).is_err());
        solution.values.pop();
        assert!(matches!(
            extract(&solution, &ConsumerMapping::ByItems(vec![0])),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_items_covered() {
        let solution = solution();
        assert_eq!(
            items_covered(&solution.master, ColumnId(2)).unwrap(),
            vec!["Flight1", "Flight2", "Crew2"]
        );
        assert!(items_covered(&solution.master, ColumnId(99)).is_err());
    }
}
