//! Grouped reductions over the unified tables.
//!
//! Every reduction is the same operation: pick the rows, split them by a key
//! built from one or more of {swept value, step, run, replicate}, then reduce
//! one column of each group with a [`Reducer`].

use crate::circular::{circular_mean, circular_std, WrapInterval};
use crate::error::SweepError;
use crate::table::{Table, TableRow};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use sweep_common::{GroupStat, NamedSeries, StatSummary};

/// Column a grouped reduction splits rows by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Swept(String),
    Step,
    Run,
    Replicate,
}

impl GroupKey {
    pub fn swept(name: impl Into<String>) -> Self {
        GroupKey::Swept(name.into())
    }

    fn label(&self) -> String {
        match self {
            GroupKey::Swept(name) => name.clone(),
            GroupKey::Step => "step".to_string(),
            GroupKey::Run => "run_id".to_string(),
            GroupKey::Replicate => "replicate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum KeySelector {
    Swept(usize),
    Step,
    Run,
    Replicate,
}

impl KeySelector {
    fn resolve<R: TableRow>(table: &Table<R>, key: &GroupKey) -> Result<Self, SweepError> {
        Ok(match key {
            GroupKey::Swept(name) => KeySelector::Swept(table.swept_index(name)?),
            GroupKey::Step => KeySelector::Step,
            GroupKey::Run => KeySelector::Run,
            GroupKey::Replicate => KeySelector::Replicate,
        })
    }

    fn select<R: TableRow>(self, row: &R) -> f64 {
        match self {
            KeySelector::Swept(i) => row.swept()[i],
            KeySelector::Step => row.step() as f64,
            KeySelector::Run => row.run_id() as f64,
            KeySelector::Replicate => row.replicate() as f64,
        }
    }
}

/// Key values of one group, ordered with `f64::total_cmp`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLabel(pub Vec<f64>);

impl GroupLabel {
    /// Builds a label, folding `-0.0` into `0.0` so both land in the same group.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        GroupLabel(values.into_iter().map(|v| if v == 0.0 { 0.0 } else { v }).collect())
    }
}

impl Eq for GroupLabel {}

impl PartialOrd for GroupLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| a.total_cmp(b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

/// How a group's samples are summarized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    /// Arithmetic mean and sample standard deviation (n - 1).
    Linear,
    /// Circular mean and standard deviation over the given wrap interval.
    Circular(WrapInterval),
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Reducer::Linear => "linear",
            Reducer::Circular(_) => "circular",
        }
    }

    /// Summarizes a sample. Undefined statistics come back as `None`.
    pub fn reduce(&self, samples: &[f64]) -> StatSummary {
        let count = samples.len();
        match self {
            Reducer::Linear => {
                if count == 0 {
                    return StatSummary::undefined();
                }
                let mean = samples.iter().sum::<f64>() / count as f64;
                let std = (count > 1).then(|| {
                    let ss: f64 = samples.iter().map(|x| (x - mean) * (x - mean)).sum();
                    (ss / (count - 1) as f64).sqrt()
                });
                StatSummary { count, mean: Some(mean), std }
            }
            Reducer::Circular(interval) => StatSummary {
                count,
                mean: circular_mean(samples, *interval).ok(),
                std: circular_std(samples, *interval).ok(),
            },
        }
    }
}

/// Result of a grouped reduction, groups sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedSummary {
    pub keys: Vec<GroupKey>,
    pub column: String,
    pub reducer: Reducer,
    pub groups: Vec<(GroupLabel, StatSummary)>,
}

impl GroupedSummary {
    /// Summary of the group with these key values; undefined when no row had them.
    pub fn stat(&self, key: &[f64]) -> StatSummary {
        let wanted = GroupLabel::new(key.iter().copied());
        self.groups
            .binary_search_by(|(label, _)| label.cmp(&wanted))
            .map(|i| self.groups[i].1)
            .unwrap_or_else(|_| StatSummary::undefined())
    }

    pub fn labels(&self) -> Vec<Vec<f64>> {
        self.groups.iter().map(|(label, _)| label.0.clone()).collect()
    }

    pub fn means(&self) -> Vec<Option<f64>> {
        self.groups.iter().map(|(_, stat)| stat.mean).collect()
    }

    pub fn stds(&self) -> Vec<Option<f64>> {
        self.groups.iter().map(|(_, stat)| stat.std).collect()
    }

    /// Converts into the serializable form handed to the rendering layer.
    pub fn into_series(self, name: impl Into<String>) -> NamedSeries {
        NamedSeries {
            name: name.into(),
            column: self.column,
            key_columns: self.keys.iter().map(GroupKey::label).collect(),
            reducer: self.reducer.name().to_string(),
            groups: self
                .groups
                .into_iter()
                .map(|(label, stat)| GroupStat { key: label.0, stat })
                .collect(),
        }
    }
}

/// Groups every row of `table` by `keys` and reduces `column` within each group.
pub fn group_reduce<R: TableRow>(
    table: &Table<R>,
    keys: &[GroupKey],
    column: &str,
    reducer: Reducer,
) -> Result<GroupedSummary, SweepError> {
    group_reduce_where(table, |_| true, keys, column, reducer)
}

/// Like [`group_reduce`], restricted to rows accepted by `filter`.
pub fn group_reduce_where<R, P>(
    table: &Table<R>,
    filter: P,
    keys: &[GroupKey],
    column: &str,
    reducer: Reducer,
) -> Result<GroupedSummary, SweepError>
where
    R: TableRow,
    P: Fn(&R) -> bool,
{
    let column_index = table.column_index(column)?;
    let selectors = keys
        .iter()
        .map(|key| KeySelector::resolve(table, key))
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: BTreeMap<GroupLabel, Vec<f64>> = BTreeMap::new();
    for row in table.rows.iter().filter(|&row| filter(row)) {
        let label = GroupLabel::new(selectors.iter().map(|s| s.select(row)));
        groups.entry(label).or_default().push(row.values()[column_index]);
    }

    Ok(GroupedSummary {
        keys: keys.to_vec(),
        column: column.to_string(),
        reducer,
        groups: groups
            .into_iter()
            .map(|(label, samples)| {
                let stat = reducer.reduce(&samples);
                (label, stat)
            })
            .collect(),
    })
}

/// Row filter selecting one recorded step.
pub fn at_step<R: TableRow>(step: u32) -> impl Fn(&R) -> bool {
    move |row: &R| row.step() == step
}

/// Row filter selecting one combination of swept values.
pub fn with_swept<R: TableRow>(swept: &[f64]) -> impl Fn(&R) -> bool + '_ {
    move |row: &R| row.swept() == swept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ModelRow;
    use std::f64::consts::PI;

    fn table() -> Table<ModelRow> {
        let mut rows = Vec::new();
        let mut run_id = 0;
        for swept in [0.0, 1.0] {
            for replicate in 0..2 {
                for step in 0..3 {
                    let practice = if replicate == 0 { PI - 0.01 } else { -PI + 0.01 };
                    rows.push(ModelRow {
                        run_id,
                        swept: vec![swept],
                        replicate,
                        step,
                        values: vec![5.0, swept * 10.0 + replicate as f64, practice],
                    });
                }
                run_id += 1;
            }
        }
        Table {
            swept_names: vec!["x".into()],
            columns: vec!["constant".into(), "value".into(), "mean_practice".into()],
            rows,
        }
    }

    #[test]
    fn constant_column_reduces_to_constant_per_group() {
        let summary = group_reduce(&table(), &[GroupKey::swept("x")], "constant", Reducer::Linear).unwrap();
        assert_eq!(summary.labels(), vec![vec![0.0], vec![1.0]]);
        assert_eq!(summary.means(), vec![Some(5.0), Some(5.0)]);
        assert_eq!(summary.stds(), vec![Some(0.0), Some(0.0)]);
        assert_eq!(summary.groups[0].1.count, 6);
    }

    #[test]
    fn linear_std_is_the_sample_std() {
        let stat = Reducer::Linear.reduce(&[1.0, 2.0, 3.0, 4.0]);
        assert!((stat.std.unwrap() - 1.2909944487358056).abs() < 1e-12);
        assert_eq!(Reducer::Linear.reduce(&[7.0]).std, None);
    }

    #[test]
    fn grouping_by_swept_and_step() {
        let summary =
            group_reduce_where(&table(), with_swept(&[1.0]), &[GroupKey::Step], "value", Reducer::Linear).unwrap();
        assert_eq!(summary.groups.len(), 3);
        assert_eq!(summary.stat(&[2.0]).mean, Some(10.5));

        let both = group_reduce(&table(), &[GroupKey::swept("x"), GroupKey::Step], "value", Reducer::Linear).unwrap();
        assert_eq!(both.groups.len(), 6);
        assert_eq!(both.stat(&[0.0, 1.0]).mean, Some(0.5));
    }

    #[test]
    fn circular_reducer_handles_wrap() {
        let interval = WrapInterval::RADIANS;
        let summary =
            group_reduce(&table(), &[GroupKey::swept("x")], "mean_practice", Reducer::Circular(interval)).unwrap();
        let mean = summary.stat(&[0.0]).mean.unwrap();
        assert!(PI - mean.abs() < 1e-9);
        let linear = group_reduce(&table(), &[GroupKey::swept("x")], "mean_practice", Reducer::Linear).unwrap();
        assert!(linear.stat(&[0.0]).mean.unwrap().abs() < 1e-9);
    }

    #[test]
    fn absent_group_is_undefined_not_zero() {
        let summary = group_reduce(&table(), &[GroupKey::swept("x")], "constant", Reducer::Linear).unwrap();
        let missing = summary.stat(&[7.0]);
        assert_eq!(missing.count, 0);
        assert_eq!(missing.mean, None);
        assert_eq!(missing.std, None);
        assert_eq!(Reducer::Circular(WrapInterval::RADIANS).reduce(&[]), StatSummary::undefined());
    }

    #[test]
    fn unknown_column_or_key_is_an_error() {
        assert!(matches!(
            group_reduce(&table(), &[GroupKey::Step], "nope", Reducer::Linear),
            Err(SweepError::MissingColumn { .. })
        ));
        assert!(matches!(
            group_reduce(&table(), &[GroupKey::swept("y")], "value", Reducer::Linear),
            Err(SweepError::MissingColumn { .. })
        ));
    }

    #[test]
    fn negative_zero_joins_the_zero_group() {
        let mut table = table();
        for row in table.rows.iter_mut().filter(|r| r.replicate == 1 && r.swept[0] == 0.0) {
            row.swept[0] = -0.0;
        }
        let summary = group_reduce(&table, &[GroupKey::swept("x")], "value", Reducer::Linear).unwrap();
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.stat(&[0.0]).count, 6);
        assert_eq!(summary.stat(&[-0.0]).mean, Some(0.5));
    }

    #[test]
    fn series_carries_key_names() {
        let series = group_reduce(&table(), &[GroupKey::swept("x"), GroupKey::Step], "value", Reducer::Linear)
            .unwrap()
            .into_series("value by x and step");
        assert_eq!(series.key_columns, vec!["x".to_string(), "step".to_string()]);
        assert_eq!(series.groups.len(), 6);
        assert_eq!(series.reducer, "linear");
    }
}
