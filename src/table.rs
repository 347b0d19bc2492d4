use crate::error::SweepError;
use serde::Serialize;
use std::ops::Range;

/// Row of a unified model table: one per run and recorded step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRow {
    pub run_id: u64,
    pub swept: Vec<f64>,
    pub replicate: u32,
    pub step: u32,
    pub values: Vec<f64>,
}

/// Row of a unified agent table: one per run, recorded step and individual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRow {
    pub run_id: u64,
    pub swept: Vec<f64>,
    pub replicate: u32,
    pub step: u32,
    pub agent_id: usize,
    pub values: Vec<f64>,
}

/// Common view of model and agent rows used by the reducers and exporters.
pub trait TableRow {
    /// Whether rows of this type identify an individual.
    const HAS_AGENT_ID: bool;

    fn run_id(&self) -> u64;
    fn swept(&self) -> &[f64];
    fn replicate(&self) -> u32;
    fn step(&self) -> u32;
    fn agent_id(&self) -> Option<usize>;
    fn values(&self) -> &[f64];
}

impl TableRow for ModelRow {
    const HAS_AGENT_ID: bool = false;

    fn run_id(&self) -> u64 {
        self.run_id
    }
    fn swept(&self) -> &[f64] {
        &self.swept
    }
    fn replicate(&self) -> u32 {
        self.replicate
    }
    fn step(&self) -> u32 {
        self.step
    }
    fn agent_id(&self) -> Option<usize> {
        None
    }
    fn values(&self) -> &[f64] {
        &self.values
    }
}

impl TableRow for AgentRow {
    const HAS_AGENT_ID: bool = true;

    fn run_id(&self) -> u64 {
        self.run_id
    }
    fn swept(&self) -> &[f64] {
        &self.swept
    }
    fn replicate(&self) -> u32 {
        self.replicate
    }
    fn step(&self) -> u32 {
        self.step
    }
    fn agent_id(&self) -> Option<usize> {
        Some(self.agent_id)
    }
    fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Long-form table ordered by run id, then step, then agent id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table<R> {
    /// Names of the swept parameters carried by every row.
    pub swept_names: Vec<String>,
    /// Names of the observation fields in `values`.
    pub columns: Vec<String>,
    pub rows: Vec<R>,
}

pub type UnifiedModelTable = Table<ModelRow>;
pub type UnifiedAgentTable = Table<AgentRow>;

impl<R: TableRow> Table<R> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, SweepError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SweepError::MissingColumn { column: name.to_string() })
    }

    pub fn swept_index(&self, name: &str) -> Result<usize, SweepError> {
        self.swept_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SweepError::MissingColumn { column: name.to_string() })
    }

    /// Rows of one run, in table order.
    pub fn rows_for_run(&self, run_id: u64) -> impl Iterator<Item = &R> {
        self.rows.iter().filter(move |r| r.run_id() == run_id)
    }

    /// Distinct run ids in table order.
    pub fn run_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::new();
        for row in &self.rows {
            if ids.last() != Some(&row.run_id()) {
                ids.push(row.run_id());
            }
        }
        ids
    }

    /// Largest recorded step, if any row exists.
    pub fn last_step(&self) -> Option<u32> {
        self.rows.iter().map(TableRow::step).max()
    }
}

/// Contiguous rows of one run at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBlock {
    pub run_id: u64,
    pub step: u32,
    pub rows: Range<usize>,
}

impl Table<AgentRow> {
    /// Splits the table into its (run, step) blocks, in table order.
    pub fn step_blocks(&self) -> Vec<StepBlock> {
        let mut blocks: Vec<StepBlock> = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            match blocks.last_mut() {
                Some(block) if block.run_id == row.run_id && block.step == row.step => block.rows.end = i + 1,
                _ => blocks.push(StepBlock { run_id: row.run_id, step: row.step, rows: i..i + 1 }),
            }
        }
        blocks
    }
}
