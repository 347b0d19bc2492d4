pub mod config;
pub mod params;
pub mod summary;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{FailurePolicy, OutputConfig, RunConfig, SweepConfig, SweptConfig};
pub use params::ParameterSet;
pub use summary::{FailedRun, GroupStat, NamedSeries, StatSummary, SweepSummary};
pub use vecmath::{angle_to_vec, vec_to_angle, Vec2};
