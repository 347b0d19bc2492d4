use crate::circular::WrapInterval;
use crate::model_params::ProxyParams;
use anyhow::Result;
use rand::prelude::*;
use rand_distr::Normal;
use sweep_common::vecmath::{angle_to_vec, Vec2};

/// Holds the per-agent state vectors of a proxy model population.
///
/// Index `i` in every vector belongs to agent slot `i`; slots are never
/// reordered, so agent ids stay dense and stable for the whole run.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub num_agents: usize,

    // --- Heritable and Drawn Properties ---
    // Practice angle in the proxy/goal plane, wrapped to [-π, π)
    pub practice: Vec<f64>,
    // Talent drawn at birth
    pub talent: Vec<f64>,
    // Replacement counter; increments every time the slot is refilled
    pub genealogy: Vec<u64>,

    // --- Outcomes (recomputed by `evaluate` and `compete`) ---
    pub effort: Vec<f64>,
    pub proxy: Vec<f64>,
    pub goal: Vec<f64>,
    pub goal_oc: Vec<f64>,
    pub utility: Vec<f64>,
    // Set for agents that won the latest competition round
    pub winner: Vec<bool>,
}

impl AgentState {
    /// Draws an initial population: practices spread between the proxy and goal axes.
    pub fn new(params: &ProxyParams, rng: &mut StdRng) -> Result<Self> {
        let n = params.num_agents;
        let talent_dist = Normal::new(0.0, params.talent_sd)?;
        let (lo, hi) = if params.goal_angle >= 0.0 { (0.0, params.goal_angle) } else { (params.goal_angle, 0.0) };

        let practice: Vec<f64> =
            (0..n).map(|_| WrapInterval::RADIANS.wrap(rng.random_range(lo..=hi))).collect();
        let talent: Vec<f64> = (0..n).map(|_| talent_dist.sample(rng)).collect();

        let mut state = Self {
            num_agents: n,
            practice,
            talent,
            genealogy: vec![0; n],
            effort: vec![0.0; n],
            proxy: vec![0.0; n],
            goal: vec![0.0; n],
            goal_oc: vec![0.0; n],
            utility: vec![0.0; n],
            winner: vec![false; n],
        };
        state.evaluate(params);
        state.compete(params.num_losers);
        Ok(state)
    }

    /// Recomputes effort and the proxy/goal projections of every agent.
    pub fn evaluate(&mut self, params: &ProxyParams) {
        let goal_axis = angle_to_vec(params.goal_angle);
        for i in 0..self.num_agents {
            let effort = (1.0 + self.talent[i]).max(0.0);
            let output: Vec2 = angle_to_vec(self.practice[i]) * effort;
            self.effort[i] = effort;
            self.proxy[i] = output.x;
            self.goal_oc[i] = output.y;
            self.goal[i] = output.dot(goal_axis) * params.goal_scale;
        }
    }

    /// Ranks the population by proxy and returns the losing slots, lowest first.
    ///
    /// Winners earn a unit reward on top of their goal value.
    pub fn compete(&mut self, num_losers: usize) -> Vec<usize> {
        let ranking = self.proxy_ranking();
        let (losers, winners) = ranking.split_at(num_losers.min(self.num_agents));
        for &i in losers {
            self.winner[i] = false;
            self.utility[i] = self.goal[i];
        }
        for &i in winners {
            self.winner[i] = true;
            self.utility[i] = self.goal[i] + 1.0;
        }
        losers.to_vec()
    }

    /// Agent indices ordered by proxy value, lowest first (ties by index).
    pub fn proxy_ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.num_agents).collect();
        order.sort_by(|&a, &b| self.proxy[a].total_cmp(&self.proxy[b]).then(a.cmp(&b)));
        order
    }

    /// Refills slot `child` with an offspring of slot `parent`.
    pub fn replace(&mut self, child: usize, parent: usize, practice: f64, talent: f64) {
        debug_assert_ne!(child, parent);
        self.practice[child] = practice;
        self.talent[child] = talent;
        self.genealogy[child] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use sweep_common::ParameterSet;

    fn params(talent_sd: f64, goal_angle: f64) -> ProxyParams {
        let set = ParameterSet::new()
            .with("numAgents", 5.0)
            .with("competition", 0.4)
            .with("selection_pressure", 1.0)
            .with("talent_sd", talent_sd)
            .with("practice_mutation_rate", 0.0)
            .with("goal_angle", goal_angle);
        ProxyParams::from_parameters(&set).unwrap()
    }

    #[test]
    fn zero_angle_practice_is_pure_proxy() {
        let params = params(0.0, FRAC_PI_2);
        let mut state = AgentState::new(&params, &mut StdRng::seed_from_u64(1)).unwrap();
        state.practice = vec![0.0; 5];
        state.evaluate(&params);
        assert!(state.proxy.iter().all(|&p| (p - 1.0).abs() < 1e-12));
        assert!(state.goal.iter().all(|&g| g.abs() < 1e-12));
        assert!(state.effort.iter().all(|&e| e == 1.0));
    }

    #[test]
    fn initial_practices_lie_between_axes() {
        let params = params(1.0, FRAC_PI_2);
        let state = AgentState::new(&params, &mut StdRng::seed_from_u64(7)).unwrap();
        assert!(state.practice.iter().all(|&p| (0.0..=FRAC_PI_2).contains(&p)));
        assert!(state.effort.iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn replacement_bumps_genealogy() {
        let params = params(0.0, 0.5);
        let mut state = AgentState::new(&params, &mut StdRng::seed_from_u64(3)).unwrap();
        state.replace(2, 0, 0.25, 0.0);
        assert_eq!(state.genealogy, vec![0, 0, 1, 0, 0]);
        assert_eq!(state.practice[2], 0.25);
    }

    #[test]
    fn competition_rewards_winners() {
        let params = params(0.0, 0.0);
        let mut state = AgentState::new(&params, &mut StdRng::seed_from_u64(3)).unwrap();
        state.practice = vec![0.3, 0.0, 1.2, 0.1, 0.3];
        state.evaluate(&params);
        let losers = state.compete(2);
        assert_eq!(losers, vec![2, 0]);
        assert_eq!(state.winner, vec![false, true, false, true, true]);
        assert!((state.utility[1] - 2.0).abs() < 1e-12);
        assert!((state.utility[2] - 1.2f64.cos()).abs() < 1e-12);
    }

    #[test]
    fn ranking_is_by_proxy() {
        let params = params(0.0, 0.5);
        let mut state = AgentState::new(&params, &mut StdRng::seed_from_u64(3)).unwrap();
        state.practice = vec![0.3, 0.0, 1.2, 0.1, 0.3];
        state.evaluate(&params);
        assert_eq!(state.proxy_ranking(), vec![2, 0, 4, 3, 1]);
    }
}
