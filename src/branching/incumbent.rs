use crate::master::{ColumnId, MasterProblem};

/// Best integer solution found so far.
///
/// `values` is indexed by the columns of `master`, the column set of the
/// node that produced it.
#[derive(Debug, Clone)]
pub struct Incumbent {
    pub objective: f64,
    pub values: Vec<f64>,
    pub master: MasterProblem,
}

impl Incumbent {
    pub fn new(master: MasterProblem, values: Vec<f64>) -> Self {
        let objective = master.objective(&values);
        Self {
            objective,
            values,
            master,
        }
    }

    /// Whether this solution is strictly cheaper than `other`.
    pub fn improves(&self, other: Option<&Incumbent>) -> bool {
        other.map_or(true, |o| self.objective < o.objective)
    }

    pub fn used_columns(&self) -> impl Iterator<Item = (ColumnId, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(i, &v)| (ColumnId(i), v))
    }
}

/// Rounds usage values that are integral within `tolerance`, or returns
/// `None` if some value is fractional.
pub(crate) fn round_integral(values: &[f64], tolerance: f64) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|&v| {
            let rounded = v.round();
            ((v - rounded).abs() <= tolerance).then_some(rounded.max(0.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Item};

    fn master() -> MasterProblem {
        let mut master = MasterProblem::new(vec![Item::new("a", 1.0), Item::new("b", 1.0)]).unwrap();
        master.add_column(Column::from_items(3.0, 2, &[0])).unwrap();
        master.add_column(Column::from_items(2.0, 2, &[1])).unwrap();
        master
    }

    #[test]
    fn test_objective_and_usage() {
        let incumbent = Incumbent::new(master(), vec![1.0, 2.0]);
        assert_eq!(incumbent.objective, 7.0);
        assert_eq!(
            incumbent.used_columns().collect::<Vec<_>>(),
            vec![(ColumnId(0), 1.0), (ColumnId(1), 2.0)]
        );
    }

    #[test]
    fn test_improves() {
        let worse = Incumbent::new(master(), vec![1.0, 2.0]);
        let better = Incumbent::new(master(), vec![1.0, 1.0]);
        assert!(better.improves(Some(&worse)));
        assert!(!worse.improves(Some(&better)));
        assert!(!worse.improves(Some(&worse)));
        assert!(worse.improves(None));
    }

    #[test]
    fn test_round_integral() {
        assert_eq!(
            round_integral(&[1.0 + 1e-8, 2.0 - 1e-8, -1e-9], 1e-6),
            Some(vec![1.0, 2.0, 0.0])
        );
        assert_eq!(round_integral(&[1.0, 0.5], 1e-6), None);
    }
}
