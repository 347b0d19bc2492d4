use std::fmt;

/// Broad class of a [`SweepError`], used to decide whether a failure is recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid sweep definition; raised before any run starts.
    Configuration,
    /// The simulation failed, timed out or was cancelled during a run.
    Simulation,
    /// The observation contract was violated. Always fatal.
    DataIntegrity,
    /// A reduction referenced something that does not exist or has no samples.
    Aggregation,
}

/// Errors raised by the sweep pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepError {
    Configuration(String),
    Simulation {
        run_id: u64,
        message: String,
    },
    TimedOut {
        run_id: u64,
        elapsed_secs: f64,
    },
    /// `run_id` is `None` when the sweep as a whole was cancelled.
    Cancelled {
        run_id: Option<u64>,
    },
    DataIntegrity {
        run_id: Option<u64>,
        step: Option<u32>,
        detail: String,
    },
    MissingColumn {
        column: String,
    },
    UnknownGroup {
        key: String,
    },
    EmptySample {
        what: String,
    },
}

impl SweepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SweepError::Configuration(_) => ErrorKind::Configuration,
            SweepError::Simulation { .. }
            | SweepError::TimedOut { .. }
            | SweepError::Cancelled { .. } => ErrorKind::Simulation,
            SweepError::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            SweepError::MissingColumn { .. }
            | SweepError::UnknownGroup { .. }
            | SweepError::EmptySample { .. } => ErrorKind::Aggregation,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SweepError::Configuration(message.into())
    }

    pub(crate) fn integrity(run_id: Option<u64>, step: Option<u32>, detail: impl Into<String>) -> Self {
        SweepError::DataIntegrity { run_id, step, detail: detail.into() }
    }
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Configuration(message) => write!(f, "invalid sweep configuration: {message}"),
            SweepError::Simulation { run_id, message } => {
                write!(f, "simulation failed in run {run_id}: {message}")
            }
            SweepError::TimedOut { run_id, elapsed_secs } => {
                write!(f, "run {run_id} exceeded its time budget after {elapsed_secs:.2}s")
            }
            SweepError::Cancelled { run_id: Some(run_id) } => write!(f, "run {run_id} was cancelled"),
            SweepError::Cancelled { run_id: None } => write!(f, "sweep was cancelled"),
            SweepError::DataIntegrity { run_id, step, detail } => {
                write!(f, "data integrity violation")?;
                if let Some(run_id) = run_id {
                    write!(f, " in run {run_id}")?;
                }
                if let Some(step) = step {
                    write!(f, " at step {step}")?;
                }
                write!(f, ": {detail}")
            }
            SweepError::MissingColumn { column } => write!(f, "column '{column}' does not exist"),
            SweepError::UnknownGroup { key } => write!(f, "no rows for group {key}"),
            SweepError::EmptySample { what } => write!(f, "{what} has no samples"),
        }
    }
}

impl std::error::Error for SweepError {}
