use crate::agent_state::AgentState;
use crate::circular::{circular_mean, WrapInterval};
use crate::model_params::ProxyParams;
use crate::simulation::{RunContext, Simulation, SimulationFactory};
use crate::store::{ObservationSchema, ObservationSink};
use anyhow::Result;
use log::{debug, trace};
use rand::prelude::*;
use rand_distr::Normal;
use sweep_common::ParameterSet;

pub const MODEL_COLUMNS: [&str; 6] = [
    "mean_proxy_value",
    "mean_goal_value",
    "mean_goal_oc",
    "mean_utility",
    "mean_practice",
    "mean_effort",
];

pub const AGENT_COLUMNS: [&str; 7] = ["Effort", "Practice", "Proxy", "Goal", "Goal_oc", "Talent", "Genealogy"];

/// A population competing on a proxy measure while the real goal lies at an angle to it.
pub struct ProxyModel {
    /// Parameters of this run.
    pub params: ProxyParams,
    /// Per-agent state vectors.
    pub state: AgentState,
    /// Run-private RNG, seeded from the run context.
    pub rng: StdRng,
    /// Steps executed so far.
    pub current_step: u32,
    talent_dist: Normal<f64>,
    mutation_dist: Normal<f64>,
    agency_dist: Normal<f64>,
}

impl ProxyModel {
    /// Creates a new model and draws its initial population.
    pub fn new(params: ProxyParams, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let state = AgentState::new(&params, &mut rng)?;
        let talent_dist = Normal::new(0.0, params.talent_sd)?;
        let mutation_dist = Normal::new(0.0, params.practice_mutation_rate)?;
        let agency_dist = Normal::new(0.0, params.angle_agency)?;

        Ok(Self { params, state, rng, current_step: 0, talent_dist, mutation_dist, agency_dist })
    }

    /// Advances the population by one competition round.
    pub fn step(&mut self) {
        let n = self.state.num_agents;

        // --- 1. Self-directed Practice Drift ---
        if self.params.angle_agency > 0.0 {
            for i in 0..n {
                let drifted = self.state.practice[i] + self.agency_dist.sample(&mut self.rng);
                self.state.practice[i] = WrapInterval::RADIANS.wrap(drifted);
            }
        }

        // --- 2. Selection: losers of the settled round may be replaced ---
        let winners: Vec<usize> = (0..n).filter(|&i| self.state.winner[i]).collect();
        let losers: Vec<usize> = (0..n).filter(|&i| !self.state.winner[i]).collect();
        let mut births = 0usize;
        if !winners.is_empty() {
            for child in losers {
                if !self.rng.random_bool(self.params.selection_pressure) {
                    continue;
                }
                let parent = winners[self.rng.random_range(0..winners.len())];
                let practice =
                    WrapInterval::RADIANS.wrap(self.state.practice[parent] + self.mutation_dist.sample(&mut self.rng));
                let talent = self.talent_dist.sample(&mut self.rng);
                self.state.replace(child, parent, practice, talent);
                births += 1;
            }
        }

        // --- 3. Re-evaluate and Compete ---
        self.state.evaluate(&self.params);
        self.state.compete(self.params.num_losers);

        self.current_step += 1;
        trace!("Step {} | {} births", self.current_step, births);
    }

    /// Population-level values in `MODEL_COLUMNS` order.
    pub fn model_record(&self) -> Vec<f64> {
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let mean_practice = circular_mean(&self.state.practice, WrapInterval::RADIANS).unwrap_or(f64::NAN);
        vec![
            mean(&self.state.proxy),
            mean(&self.state.goal),
            mean(&self.state.goal_oc),
            mean(&self.state.utility),
            mean_practice,
            mean(&self.state.effort),
        ]
    }

    /// One row per agent in `AGENT_COLUMNS` order.
    pub fn agent_records(&self) -> Vec<(usize, Vec<f64>)> {
        let s = &self.state;
        (0..s.num_agents)
            .map(|i| (i, vec![s.effort[i], s.practice[i], s.proxy[i], s.goal[i], s.goal_oc[i], s.talent[i], s.genealogy[i] as f64]))
            .collect()
    }
}

impl Simulation for ProxyModel {
    fn schema(&self) -> ObservationSchema {
        ObservationSchema::new(MODEL_COLUMNS, AGENT_COLUMNS, self.params.num_agents)
    }

    fn run(&mut self, steps: u32, step_interval: u32, sink: &mut dyn ObservationSink) -> Result<()> {
        let interval = step_interval.max(1);
        for step in 0..steps {
            if step % interval == 0 {
                sink.record_model_step(step, self.model_record())?;
                sink.record_agent_step(step, self.agent_records())?;
            }
            self.step();
        }
        debug!("Finished {} steps with {} agents", self.current_step, self.state.num_agents);
        Ok(())
    }

    fn last_step(&self) -> u32 {
        self.current_step
    }
}

/// Builds a [`ProxyModel`] per run from its parameter set and seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyModelFactory;

impl SimulationFactory for ProxyModelFactory {
    type Instance = ProxyModel;

    fn construct(&self, parameters: &ParameterSet, context: &RunContext) -> Result<ProxyModel> {
        let params = ProxyParams::from_parameters(parameters)?;
        ProxyModel::new(params, context.seed)
    }
}
