use anyhow::Result;
use serde::{Deserialize, Serialize};
use sweep_common::ParameterSet;

/// Proxy model parameters derived from a run's parameter set, used every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyParams {
    // Population
    pub num_agents: usize,
    pub num_losers: usize, // Agents that lose the competition each step

    // Competition & Selection
    pub competition: f64,        // Fraction of the population that loses (0-1)
    pub selection_pressure: f64, // Probability that a loser is replaced

    // Individual Properties
    pub talent_sd: f64,              // Spread of the talent distribution
    pub practice_mutation_rate: f64, // Sd of the practice change on inheritance
    pub angle_agency: f64,           // Sd of the per-step self-directed practice drift

    // Practice Space
    pub goal_angle: f64, // Angle between the proxy axis and the goal axis
    pub goal_scale: f64, // Scaling of the psychological goal valuation
}

impl ProxyParams {
    /// Reads and validates the model parameters.
    pub fn from_parameters(params: &ParameterSet) -> Result<Self> {
        let num_agents = params.require_count("numAgents")?;
        let competition = params.require("competition")?;
        let selection_pressure = params.require("selection_pressure")?;
        let talent_sd = params.require("talent_sd")?;
        let practice_mutation_rate = params.require("practice_mutation_rate")?;
        let goal_angle = params.require("goal_angle")?;
        let goal_scale = params.get("goal_scale").unwrap_or(1.0);
        let angle_agency = params.get("angle_agency").unwrap_or(0.0);

        // --- Validation ---
        if num_agents == 0 {
            anyhow::bail!("numAgents must be greater than 0.");
        }
        if !(0.0..=1.0).contains(&competition) {
            anyhow::bail!("competition must lie in [0, 1], got {}.", competition);
        }
        if !(0.0..=1.0).contains(&selection_pressure) {
            anyhow::bail!("selection_pressure must lie in [0, 1], got {}.", selection_pressure);
        }
        for (name, value) in [
            ("talent_sd", talent_sd),
            ("practice_mutation_rate", practice_mutation_rate),
            ("angle_agency", angle_agency),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                anyhow::bail!("{} must be a non-negative number, got {}.", name, value);
            }
        }
        if !goal_angle.is_finite() || !goal_scale.is_finite() {
            anyhow::bail!("goal_angle and goal_scale must be finite.");
        }

        // At least one winner must remain to inherit from
        let num_losers = ((num_agents as f64 * competition).round() as usize).min(num_agents - 1);

        Ok(ProxyParams {
            num_agents,
            num_losers,
            competition,
            selection_pressure,
            talent_sd,
            practice_mutation_rate,
            angle_agency,
            goal_angle,
            goal_scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn base() -> ParameterSet {
        ParameterSet::new()
            .with("numAgents", 100.0)
            .with("competition", 0.9)
            .with("selection_pressure", 0.1)
            .with("talent_sd", 1.0)
            .with("practice_mutation_rate", PI / 90.0)
            .with("goal_angle", PI / 4.0)
    }

    #[test]
    fn derives_loser_count_and_defaults() {
        let params = ProxyParams::from_parameters(&base()).unwrap();
        assert_eq!(params.num_losers, 90);
        assert_eq!(params.goal_scale, 1.0);
        assert_eq!(params.angle_agency, 0.0);
    }

    #[test]
    fn keeps_one_winner() {
        let params = ProxyParams::from_parameters(&base().with("competition", 1.0)).unwrap();
        assert_eq!(params.num_losers, 99);
        let single = ProxyParams::from_parameters(&base().with("numAgents", 1.0)).unwrap();
        assert_eq!(single.num_losers, 0);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(ProxyParams::from_parameters(&base().with("competition", 1.5)).is_err());
        assert!(ProxyParams::from_parameters(&base().with("talent_sd", -1.0)).is_err());
        assert!(ProxyParams::from_parameters(&base().with("numAgents", 0.0)).is_err());
    }
}
