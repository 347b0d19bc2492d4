use serde::{Deserialize, Serialize};

/// Mean and standard deviation of one group of samples.
///
/// `None` marks a statistic that is undefined for the group (no samples, or a
/// sample standard deviation of a single value). It is never folded into `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatSummary {
    /// Number of samples that fell into the group.
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl StatSummary {
    /// Summary of an empty group.
    pub fn undefined() -> Self {
        Self::default()
    }

    pub fn is_defined(&self) -> bool {
        self.mean.is_some()
    }
}

/// One group of a grouped reduction, labelled by its key values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStat {
    /// Key values in the order of the series' `key_columns`.
    pub key: Vec<f64>,
    pub stat: StatSummary,
}

/// A named grouped reduction, e.g. "mean_goal_value by talent_sd at the final step".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    /// Column reduced within each group.
    pub column: String,
    /// Columns the rows were grouped by.
    pub key_columns: Vec<String>,
    /// "linear" or "circular".
    pub reducer: String,
    pub groups: Vec<GroupStat>,
}

/// A run that failed and was left out of the merged tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_id: u64,
    pub cause: String,
}

/// Aggregated results of a sweep, handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Names of the swept parameters, outermost first.
    pub swept: Vec<String>,
    /// Runs planned by the sweep.
    pub planned_runs: usize,
    /// Runs whose observations made it into the merged tables.
    pub succeeded_runs: usize,
    /// Runs isolated as failures. Non-empty means the summary is incomplete.
    pub failed_runs: Vec<FailedRun>,
    /// Last recorded step, used for the final-state series.
    pub final_step: Option<u32>,
    /// Per swept value, at the final step.
    pub final_state: Vec<NamedSeries>,
    /// Per swept value and step.
    pub dynamics: Vec<NamedSeries>,
}

impl SweepSummary {
    pub fn is_complete(&self) -> bool {
        self.failed_runs.is_empty()
    }
}
