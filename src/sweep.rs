use crate::cancel::{CancelToken, RunGuard};
use crate::error::{ErrorKind, SweepError};
use crate::simulation::{RunContext, Simulation, SimulationFactory};
use crate::store::{ObservationSchema, ObservationStore};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::time::{Duration, Instant};
use sweep_common::{FailurePolicy, ParameterSet, SweepConfig};

/// A parameter varied across the sweep, with its candidate values in sweep order.
#[derive(Debug, Clone, PartialEq)]
pub struct SweptParameter {
    pub name: String,
    pub values: Vec<f64>,
}

impl SweptParameter {
    pub fn new(name: impl Into<String>, values: impl Into<Vec<f64>>) -> Self {
        Self { name: name.into(), values: values.into() }
    }
}

/// How runs are scheduled onto threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// One run after another on the calling thread.
    Sequential,
    /// A rayon pool with `workers` threads (0 = rayon default).
    Parallel { workers: usize },
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Sequential => write!(f, "sequential"),
            Execution::Parallel { workers: 0 } => write!(f, "parallel on the default rayon worker count"),
            Execution::Parallel { workers } => write!(f, "parallel on {workers} workers"),
        }
    }
}

/// Complete definition of a sweep.
#[derive(Debug, Clone)]
pub struct SweepSpec {
    /// Parameters shared by every run.
    pub fixed: ParameterSet,
    /// Swept parameters, combined by Cartesian product with the first one outermost.
    pub swept: Vec<SweptParameter>,
    pub replicates: u32,
    pub steps: u32,
    pub step_interval: u32,
    /// Base seed; each run derives its own seed from it and its run id.
    pub seed: u64,
    pub failure_policy: FailurePolicy,
    pub execution: Execution,
    pub run_timeout: Option<Duration>,
}

impl SweepSpec {
    pub fn new(fixed: ParameterSet, swept: SweptParameter, replicates: u32, steps: u32, step_interval: u32) -> Self {
        Self {
            fixed,
            swept: vec![swept],
            replicates,
            steps,
            step_interval,
            seed: 0,
            failure_policy: FailurePolicy::Abort,
            execution: Execution::Parallel { workers: 0 },
            run_timeout: None,
        }
    }

    /// Adds another swept parameter, nested inside the existing ones.
    pub fn also_sweep(mut self, swept: SweptParameter) -> Self {
        self.swept.push(swept);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Builds a spec from a loaded configuration file.
    pub fn from_config(config: &SweepConfig) -> Result<Self, SweepError> {
        let execution = match config.sweep.workers {
            1 => Execution::Sequential,
            workers => Execution::Parallel { workers },
        };
        let run_timeout = match config.sweep.run_timeout_secs {
            Some(secs) => Some(
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| SweepError::config(format!("run_timeout_secs: {e}")))?,
            ),
            None => None,
        };
        let spec = Self {
            fixed: config.parameters.clone(),
            swept: config
                .swept
                .iter()
                .map(|s| SweptParameter::new(s.name.clone(), s.values.clone()))
                .collect(),
            replicates: config.sweep.replicates,
            steps: config.sweep.steps,
            step_interval: config.sweep.step_interval,
            seed: config.sweep.seed,
            failure_policy: config.sweep.failure_policy,
            execution,
            run_timeout,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn swept_names(&self) -> Vec<String> {
        self.swept.iter().map(|s| s.name.clone()).collect()
    }

    /// Total number of runs: every value combination times the replicate count.
    pub fn run_count(&self) -> usize {
        self.swept.iter().map(|s| s.values.len()).product::<usize>() * self.replicates as usize
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.replicates == 0 {
            return Err(SweepError::config("replicate count must be positive"));
        }
        if self.steps == 0 {
            return Err(SweepError::config("step budget must be positive"));
        }
        if self.step_interval == 0 {
            return Err(SweepError::config("step interval must be positive"));
        }
        if self.swept.is_empty() {
            return Err(SweepError::config("no swept parameter given"));
        }
        for (i, swept) in self.swept.iter().enumerate() {
            if swept.values.is_empty() {
                return Err(SweepError::config(format!("swept parameter '{}' has no values", swept.name)));
            }
            if swept.values.iter().any(|v| !v.is_finite()) {
                return Err(SweepError::config(format!("swept parameter '{}' has a non-finite value", swept.name)));
            }
            if self.fixed.contains(&swept.name) {
                return Err(SweepError::config(format!("'{}' is both fixed and swept", swept.name)));
            }
            if self.swept[..i].iter().any(|other| other.name == swept.name) {
                return Err(SweepError::config(format!("'{}' is swept twice", swept.name)));
            }
        }
        Ok(())
    }

    /// Enumerates the runs in id order: value combinations outermost, replicates innermost.
    pub fn plan(&self) -> Result<Vec<RunPlan>, SweepError> {
        self.validate()?;

        let mut plans = Vec::with_capacity(self.run_count());
        let mut odometer = vec![0usize; self.swept.len()];
        let mut run_id = 0u64;
        loop {
            let swept: Vec<(String, f64)> = self
                .swept
                .iter()
                .zip(&odometer)
                .map(|(param, &i)| (param.name.clone(), param.values[i]))
                .collect();
            let parameters = self.fixed.merged(swept.iter().map(|(name, value)| (name.as_str(), *value)));

            for replicate in 0..self.replicates {
                plans.push(RunPlan {
                    context: RunContext {
                        run_id,
                        replicate,
                        swept: swept.clone(),
                        seed: derive_run_seed(self.seed, run_id),
                    },
                    parameters: parameters.clone(),
                });
                run_id += 1;
            }

            // Advance the innermost swept parameter first
            let mut position = self.swept.len();
            loop {
                if position == 0 {
                    return Ok(plans);
                }
                position -= 1;
                odometer[position] += 1;
                if odometer[position] < self.swept[position].values.len() {
                    break;
                }
                odometer[position] = 0;
            }
        }
    }
}

/// SplitMix64 over the base seed and run id.
pub fn derive_run_seed(base_seed: u64, run_id: u64) -> u64 {
    let mut z = base_seed.wrapping_add(run_id.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// One planned run: its identity and the full parameter set it is built from.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub context: RunContext,
    pub parameters: ParameterSet,
}

/// A completed run and the observations it produced.
#[derive(Debug)]
pub struct RunRecord {
    pub run_id: u64,
    pub replicate: u32,
    /// Swept values in the order of `SweepOutcome::swept_names`.
    pub swept: Vec<f64>,
    pub store: ObservationStore,
}

/// A run isolated as failed under [`FailurePolicy::Isolate`].
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub run_id: u64,
    pub replicate: u32,
    pub swept: Vec<f64>,
    pub error: SweepError,
}

/// Everything a sweep produced.
#[derive(Debug)]
pub struct SweepOutcome {
    pub swept_names: Vec<String>,
    pub planned_runs: usize,
    /// Completed runs, ordered by run id.
    pub runs: Vec<RunRecord>,
    /// Isolated failures, ordered by run id.
    pub failures: Vec<RunFailure>,
    /// Column layout reported by the first run that built a simulation, failed or not.
    pub schema: Option<ObservationSchema>,
}

impl SweepOutcome {
    /// True when every planned run completed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.runs.len() == self.planned_runs
    }

    pub fn failed_run_ids(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.run_id).collect()
    }
}

/// Runs every planned simulation and collects their observation stores.
pub fn run_sweep<F: SimulationFactory>(spec: &SweepSpec, factory: &F) -> Result<SweepOutcome, SweepError> {
    run_sweep_with_cancel(spec, factory, &CancelToken::new())
}

/// Like [`run_sweep`], but stops issuing runs once `cancel` fires.
///
/// A cancelled sweep returns [`SweepError::Cancelled`] and none of its runs.
pub fn run_sweep_with_cancel<F: SimulationFactory>(
    spec: &SweepSpec,
    factory: &F,
    cancel: &CancelToken,
) -> Result<SweepOutcome, SweepError> {
    let plans = spec.plan()?;
    let swept_names = spec.swept_names();
    info!(
        "Sweeping {} over {} runs ({} replicates, {} steps, interval {}, {:?})",
        swept_names.join(" x "),
        plans.len(),
        spec.replicates,
        spec.steps,
        spec.step_interval,
        spec.execution
    );

    // Cancelled on the first fatal run error; also follows the caller's token
    let abort = cancel.child();
    let start_time = Instant::now();

    let execute = |plan: &RunPlan| {
        let mut schema = None;
        let result = execute_run(plan, spec, factory, &abort, &mut schema);
        if let Err(e) = &result {
            if is_fatal(e, spec.failure_policy) {
                error!("Run {} failed, aborting sweep: {}", plan.context.run_id, e);
                abort.cancel();
            } else if !matches!(e, SweepError::Cancelled { .. }) {
                warn!("Run {} failed and is excluded: {}", plan.context.run_id, e);
            }
        }
        (result, schema)
    };

    let results: Vec<(Result<RunRecord, SweepError>, Option<ObservationSchema>)> = match spec.execution {
        Execution::Sequential => plans.iter().map(execute).collect(),
        Execution::Parallel { workers } => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| SweepError::config(format!("cannot build worker pool: {e}")))?;
            pool.install(|| plans.par_iter().map(execute).collect())
        }
    };

    // Report the earliest fatal error in run order, never a knock-on cancellation
    if let Some(fatal) = results
        .iter()
        .filter_map(|(r, _)| r.as_ref().err())
        .find(|e| is_fatal(e, spec.failure_policy))
    {
        return Err(fatal.clone());
    }
    if cancel.is_cancelled() {
        warn!("Sweep cancelled after {:.2}s; discarding all runs", start_time.elapsed().as_secs_f64());
        return Err(SweepError::Cancelled { run_id: None });
    }

    let mut runs = Vec::with_capacity(plans.len());
    let mut failures = Vec::new();
    let mut layout: Option<ObservationSchema> = None;
    for (plan, (result, schema)) in plans.iter().zip(results) {
        if layout.is_none() {
            layout = schema;
        }
        match result {
            Ok(record) => runs.push(record),
            Err(error) => failures.push(RunFailure {
                run_id: plan.context.run_id,
                replicate: plan.context.replicate,
                swept: plan.context.swept.iter().map(|(_, v)| *v).collect(),
                error,
            }),
        }
    }

    info!(
        "Sweep finished in {:.3} seconds: {} runs succeeded, {} failed.",
        start_time.elapsed().as_secs_f64(),
        runs.len(),
        failures.len()
    );

    Ok(SweepOutcome { swept_names, planned_runs: plans.len(), runs, failures, schema: layout })
}

/// Whether `error` ends the whole sweep under `policy`.
fn is_fatal(error: &SweepError, policy: FailurePolicy) -> bool {
    match error.kind() {
        ErrorKind::DataIntegrity | ErrorKind::Configuration => true,
        _ if matches!(error, SweepError::Cancelled { .. }) => false,
        _ => policy == FailurePolicy::Abort,
    }
}

/// Maps a simulation error back onto the pipeline taxonomy.
fn classify(run_id: u64, error: anyhow::Error) -> SweepError {
    match error.downcast::<SweepError>() {
        Ok(sweep_error) => sweep_error,
        Err(other) => SweepError::Simulation { run_id, message: format!("{other:#}") },
    }
}

fn execute_run<F: SimulationFactory>(
    plan: &RunPlan,
    spec: &SweepSpec,
    factory: &F,
    cancel: &CancelToken,
    schema: &mut Option<ObservationSchema>,
) -> Result<RunRecord, SweepError> {
    let context = &plan.context;
    let run_id = context.run_id;
    if cancel.is_cancelled() {
        return Err(SweepError::Cancelled { run_id: Some(run_id) });
    }
    debug!("Run {} starting: {:?} replicate {}", run_id, context.swept, context.replicate);

    // The time budget covers construction as well as stepping
    let guard = RunGuard::new(run_id, cancel.clone(), spec.run_timeout);
    let mut sim = factory
        .construct(&plan.parameters, context)
        .map_err(|e| classify(run_id, e))?;
    *schema = Some(sim.schema());
    let mut store = ObservationStore::new(run_id, sim.schema()).with_guard(guard);

    sim.run(spec.steps, spec.step_interval, &mut store)
        .map_err(|e| classify(run_id, e))?;
    // The run may have finished past its deadline without recording again
    store.check_guard()?;

    if sim.last_step() != spec.steps {
        return Err(SweepError::integrity(
            Some(run_id),
            Some(sim.last_step()),
            format!("simulation stopped at step {} of {}", sim.last_step(), spec.steps),
        ));
    }

    debug!(
        "Run {} finished: {} model rows, {} agent rows",
        run_id,
        store.model_table().len(),
        store.agent_table().len()
    );
    Ok(RunRecord {
        run_id,
        replicate: context.replicate,
        swept: context.swept.iter().map(|(_, v)| *v).collect(),
        store,
    })
}
