//! The contract between the sweep orchestrator and the population model it drives.

use crate::store::{ObservationSchema, ObservationSink};
use anyhow::Result;
use sweep_common::ParameterSet;

/// Identity of one run, handed to the simulation at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    /// Unique across the sweep, assigned in plan order.
    pub run_id: u64,
    /// Replicate index at this swept setting.
    pub replicate: u32,
    /// Swept parameter names and this run's values, outermost first.
    pub swept: Vec<(String, f64)>,
    /// Seed for the run's private RNG.
    pub seed: u64,
}

/// A simulation instance driven by the orchestrator.
pub trait Simulation: Send {
    /// Layout of the records pushed into the sink.
    fn schema(&self) -> ObservationSchema;

    /// Executes `steps` steps, recording every `step_interval`-th one into `sink`.
    ///
    /// Errors returned by the sink must be propagated unchanged.
    fn run(&mut self, steps: u32, step_interval: u32, sink: &mut dyn ObservationSink) -> Result<()>;

    /// Number of steps executed so far.
    fn last_step(&self) -> u32;
}

/// Builds a fresh simulation instance for each run.
pub trait SimulationFactory: Sync {
    type Instance: Simulation;

    fn construct(&self, parameters: &ParameterSet, context: &RunContext) -> Result<Self::Instance>;
}

impl<F, S> SimulationFactory for F
where
    F: Fn(&ParameterSet, &RunContext) -> Result<S> + Sync,
    S: Simulation,
{
    type Instance = S;

    fn construct(&self, parameters: &ParameterSet, context: &RunContext) -> Result<S> {
        self(parameters, context)
    }
}
