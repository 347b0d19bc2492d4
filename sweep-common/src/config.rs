use crate::params::ParameterSet;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;
use std::path::Path;

/// What happens to the sweep when one run fails.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The first failing run aborts the whole sweep.
    #[default]
    Abort,
    /// Failing runs are reported and left out of the merge.
    Isolate,
}

// Run counts, budgets and execution settings, loaded from the [sweep] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    pub replicates: u32,
    pub steps: u32,
    #[serde(default = "default_step_interval")]
    pub step_interval: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Worker threads: 0 uses the rayon default, 1 runs strictly sequentially.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub run_timeout_secs: Option<f64>,
}

fn default_step_interval() -> u32 {
    1
}

// One swept parameter, loaded from a [[swept]] entry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SweptConfig {
    pub name: String,
    pub values: Vec<f64>,
}

// Configuration for output settings, loaded from the [output] table
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_tables: bool,
    #[serde(default = "default_true")]
    pub save_summary: bool,
    pub format: Option<String>, // Summary format: "json", "bincode", "messagepack"
    #[serde(default = "default_angle_lo")]
    pub angle_lo: f64,
    #[serde(default = "default_angle_hi")]
    pub angle_hi: f64,
}

fn default_true() -> bool {
    true
}

fn default_angle_lo() -> f64 {
    -PI
}

fn default_angle_hi() -> f64 {
    PI
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "sweep".to_string(),
            save_tables: true,
            save_summary: true,
            format: None,
            angle_lo: default_angle_lo(),
            angle_hi: default_angle_hi(),
        }
    }
}

// Main sweep configuration structure, loaded from sweep.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SweepConfig {
    pub sweep: RunConfig,
    #[serde(default)]
    pub parameters: ParameterSet,
    pub swept: Vec<SweptConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SweepConfig {
    /// Loads the sweep configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {:#}", path_ref.display(), e))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SweepConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects definitions that could never produce a valid sweep.
    pub fn validate(&self) -> Result<()> {
        if self.sweep.replicates == 0 {
            anyhow::bail!("replicates must be greater than 0.");
        }
        if self.sweep.steps == 0 {
            anyhow::bail!("steps must be greater than 0.");
        }
        if self.sweep.step_interval == 0 {
            anyhow::bail!("step_interval must be greater than 0.");
        }
        if let Some(timeout) = self.sweep.run_timeout_secs {
            if !(timeout.is_finite() && timeout > 0.0) {
                anyhow::bail!("run_timeout_secs must be a positive number of seconds.");
            }
        }
        if self.swept.is_empty() {
            anyhow::bail!("at least one [[swept]] parameter is required.");
        }

        let mut seen = HashSet::new();
        for swept in &self.swept {
            if !seen.insert(swept.name.as_str()) {
                anyhow::bail!("swept parameter '{}' is listed twice.", swept.name);
            }
            if self.parameters.contains(&swept.name) {
                anyhow::bail!("'{}' is both a fixed and a swept parameter.", swept.name);
            }
            if swept.values.is_empty() {
                anyhow::bail!("swept parameter '{}' has no values.", swept.name);
            }
            if let Some(bad) = swept.values.iter().find(|v| !v.is_finite()) {
                anyhow::bail!("swept parameter '{}' has non-finite value {}.", swept.name, bad);
            }
        }
        if let Some((name, value)) = self.parameters.iter().find(|(_, v)| !v.is_finite()) {
            anyhow::bail!("fixed parameter '{}' has non-finite value {}.", name, value);
        }

        if !(self.output.angle_lo.is_finite()
            && self.output.angle_hi.is_finite()
            && self.output.angle_hi > self.output.angle_lo)
        {
            anyhow::bail!(
                "angle interval [{}, {}) is empty or not finite.",
                self.output.angle_lo,
                self.output.angle_hi
            );
        }

        Ok(())
    }
}
