use crate::aggregate::{at_step, group_reduce, group_reduce_where, GroupKey, GroupedSummary, Reducer};
use crate::circular::WrapInterval;
use crate::error::SweepError;
use crate::merge::UnifiedTables;
use crate::sweep::SweepOutcome;
use log::debug;
use sweep_common::{FailedRun, NamedSeries, SweepSummary};

/// Which model columns go into a [`SweepSummary`] and how they are reduced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSpec {
    /// Reduced with the arithmetic mean and sample standard deviation.
    pub linear_columns: Vec<String>,
    /// Angle columns, reduced on `interval`.
    pub circular_columns: Vec<String>,
    pub interval: WrapInterval,
}

impl ReportSpec {
    /// The standard report for the proxy model.
    pub fn proxy_model(interval: WrapInterval) -> Self {
        Self {
            linear_columns: ["mean_goal_value", "mean_proxy_value", "mean_utility", "mean_goal_oc"]
                .into_iter()
                .map(String::from)
                .collect(),
            circular_columns: vec!["mean_practice".to_string()],
            interval,
        }
    }

    fn reductions(&self) -> impl Iterator<Item = (&str, Reducer)> {
        let circular = Reducer::Circular(self.interval);
        self.linear_columns
            .iter()
            .map(|c| (c.as_str(), Reducer::Linear))
            .chain(self.circular_columns.iter().map(move |c| (c.as_str(), circular)))
    }
}

/// Reduces the model table per swept parameter at the final step and per step.
///
/// A sweep in which no run ever built a simulation has no column layout; its
/// dynamics series are reported with no groups instead of failing the lookup.
pub fn build_summary(
    tables: &UnifiedTables,
    outcome: &SweepOutcome,
    report: &ReportSpec,
) -> Result<SweepSummary, SweepError> {
    let model = &tables.model;
    let final_step = model.last_step();
    let mut final_state: Vec<NamedSeries> = Vec::new();
    let mut dynamics: Vec<NamedSeries> = Vec::new();

    let layout_known = !model.columns.is_empty() || !model.is_empty();

    for name in &model.swept_names {
        for (column, reducer) in report.reductions() {
            if !layout_known {
                let keys = vec![GroupKey::swept(name.as_str()), GroupKey::Step];
                let empty = GroupedSummary { keys, column: column.to_string(), reducer, groups: Vec::new() };
                dynamics.push(empty.into_series(format!("{column} by {name} and step")));
                continue;
            }
            if let Some(step) = final_step {
                let summary =
                    group_reduce_where(model, at_step(step), &[GroupKey::swept(name.as_str())], column, reducer)?;
                final_state.push(summary.into_series(format!("{column} by {name} at step {step}")));
            }
            let summary = group_reduce(model, &[GroupKey::swept(name.as_str()), GroupKey::Step], column, reducer)?;
            dynamics.push(summary.into_series(format!("{column} by {name} and step")));
        }
    }
    debug!("Built {} final-state and {} dynamics series", final_state.len(), dynamics.len());

    Ok(SweepSummary {
        swept: outcome.swept_names.clone(),
        planned_runs: outcome.planned_runs,
        succeeded_runs: outcome.runs.len(),
        failed_runs: outcome
            .failures
            .iter()
            .map(|f| FailedRun { run_id: f.run_id, cause: f.error.to_string() })
            .collect(),
        final_step,
        final_state,
        dynamics,
    })
}
