//! Parameter sweeps over agent-based population models.
//!
//! A sweep runs one simulation per (swept value combination, replicate),
//! collects each run's model and agent observations into an
//! [`ObservationStore`], merges them into long-form tables tagged with the
//! run's swept values, and reduces those tables into grouped statistics.

pub mod agent_state;
pub mod aggregate;
pub mod cancel;
pub mod circular;
pub mod error;
pub mod export;
pub mod matrix;
pub mod merge;
pub mod model_params;
pub mod proxy_model;
pub mod report;
pub mod simulation;
pub mod store;
pub mod sweep;
pub mod table;

pub use aggregate::{group_reduce, group_reduce_where, GroupKey, GroupedSummary, Reducer};
pub use cancel::CancelToken;
pub use circular::{circular_mean, circular_std, WrapInterval};
pub use error::{ErrorKind, SweepError};
pub use merge::{merge_outcome, merge_runs, UnifiedTables};
pub use proxy_model::{ProxyModel, ProxyModelFactory};
pub use simulation::{RunContext, Simulation, SimulationFactory};
pub use store::{ObservationSchema, ObservationSink, ObservationStore};
pub use sweep::{run_sweep, run_sweep_with_cancel, Execution, SweepOutcome, SweepSpec, SweptParameter};
pub use table::{AgentRow, ModelRow, Table, UnifiedAgentTable, UnifiedModelTable};
