//! Matrix-shaped views of the agent table.

use crate::error::SweepError;
use crate::table::{AgentRow, StepBlock, UnifiedAgentTable};
use serde::Serialize;

/// Lineage increases at or above this are births; the genealogy counter moves in whole steps.
pub const BIRTH_THRESHOLD: f64 = 0.9;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix<T = f64> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Matrix<T> {
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self { rows, cols, data: vec![value; rows * cols] }
    }

    /// Builds a matrix from equally long rows.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self, SweepError> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(SweepError::integrity(
                None,
                None,
                format!("matrix row {bad} has {} entries, expected {cols}", rows[bad].len()),
            ));
        }
        let n_rows = rows.len();
        Ok(Self { rows: n_rows, cols, data: rows.into_iter().flatten().collect() })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn column(&self, col: usize) -> Vec<T> {
        (0..self.rows).map(|r| self.get(r, col).clone()).collect()
    }
}

/// Order of the individuals along the columns of a time-by-individual view.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOrder {
    AgentId,
    /// Ascending by this column's value at each step, ties broken by agent id.
    Column(String),
}

/// Per-individual values of one swept setting at one step: `[individual][replicate]`.
///
/// Replicates appear in run-id order. `step` defaults to the last step recorded
/// for the setting. Every selected run must report the same individuals.
pub fn final_state_projection(
    agents: &UnifiedAgentTable,
    swept: &[f64],
    step: Option<u32>,
    column: &str,
) -> Result<Matrix, SweepError> {
    let column_index = agents.column_index(column)?;
    let blocks: Vec<StepBlock> = agents
        .step_blocks()
        .into_iter()
        .filter(|b| agents.rows[b.rows.start].swept == swept)
        .collect();
    let step = match step.or_else(|| blocks.iter().map(|b| b.step).max()) {
        Some(step) => step,
        None => return Err(SweepError::UnknownGroup { key: format!("swept values {swept:?}") }),
    };

    let mut run_ids: Vec<u64> = blocks.iter().map(|b| b.run_id).collect();
    run_ids.dedup();

    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        let block = blocks
            .iter()
            .find(|b| b.run_id == run_id && b.step == step)
            .ok_or_else(|| SweepError::integrity(Some(run_id), Some(step), "run has no agent rows at this step"))?;
        let rows = &agents.rows[block.rows.clone()];
        check_dense_ids(rows, run_id, step)?;
        columns.push(rows.iter().map(|r| r.values[column_index]).collect());
    }

    let num_agents = columns.first().map_or(0, Vec::len);
    if let Some(bad) = columns.iter().position(|c| c.len() != num_agents) {
        return Err(SweepError::integrity(
            None,
            Some(step),
            format!("replicate {bad} has {} individuals, replicate 0 has {num_agents}", columns[bad].len()),
        ));
    }
    let mut matrix = Matrix::filled(num_agents, columns.len(), 0.0);
    for (replicate, values) in columns.iter().enumerate() {
        for (agent, value) in values.iter().enumerate() {
            matrix.set(agent, replicate, *value);
        }
    }
    Ok(matrix)
}

/// `steps x individuals` view of one run, re-sorted independently at every step.
pub fn time_by_individual(
    agents: &UnifiedAgentTable,
    run_id: u64,
    column: &str,
    order: &AgentOrder,
) -> Result<Matrix, SweepError> {
    let column_index = agents.column_index(column)?;
    let order_index = match order {
        AgentOrder::AgentId => None,
        AgentOrder::Column(name) => Some(agents.column_index(name)?),
    };

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for block in agents.step_blocks().into_iter().filter(|b| b.run_id == run_id) {
        let block_rows = &agents.rows[block.rows.clone()];
        check_dense_ids(block_rows, run_id, block.step)?;
        let sorted = sorted_by(block_rows, order_index);
        rows.push(sorted.iter().map(|r| r.values[column_index]).collect());
    }
    if rows.is_empty() {
        return Err(SweepError::UnknownGroup { key: format!("run {run_id}") });
    }
    Matrix::from_rows(rows)
}

/// Rows ordered by the given column (ties by agent id), or by agent id.
fn sorted_by(rows: &[AgentRow], order_index: Option<usize>) -> Vec<&AgentRow> {
    let mut sorted: Vec<&AgentRow> = rows.iter().collect();
    if let Some(index) = order_index {
        sorted.sort_by(|a, b| a.values[index].total_cmp(&b.values[index]).then(a.agent_id.cmp(&b.agent_id)));
    } else {
        sorted.sort_by_key(|r| r.agent_id);
    }
    sorted
}

fn check_dense_ids(rows: &[AgentRow], run_id: u64, step: u32) -> Result<(), SweepError> {
    match rows.iter().enumerate().find(|(i, r)| r.agent_id != *i) {
        Some((i, r)) => Err(SweepError::integrity(
            Some(run_id),
            Some(step),
            format!("expected agent id {i} at position {i}, found {}", r.agent_id),
        )),
        None => Ok(()),
    }
}

/// Marks birth events in a `steps x individuals` lineage matrix.
///
/// Each cell is the difference to the previous step of the same column. A cell
/// holds `Some(1.0)` when that difference is positive and reaches `threshold`;
/// every other cell is masked (`None`), whatever the threshold. The first step
/// has no predecessor and is always masked.
pub fn birth_events(lineage: &Matrix, threshold: f64) -> Matrix<Option<f64>> {
    let mut events = Matrix::filled(lineage.rows(), lineage.cols(), None);
    for row in 1..lineage.rows() {
        for col in 0..lineage.cols() {
            let diff = lineage.get(row, col) - lineage.get(row - 1, col);
            if diff > 0.0 && diff >= threshold {
                events.set(row, col, Some(1.0));
            }
        }
    }
    events
}

/// Averages consecutive blocks of `block` rows.
///
/// The row count must divide evenly; anything else is rejected rather than
/// truncated or padded.
pub fn block_average(matrix: &Matrix, block: usize) -> Result<Matrix, SweepError> {
    if block == 0 || matrix.rows() % block != 0 {
        return Err(SweepError::config(format!(
            "{} steps cannot be averaged in blocks of {}",
            matrix.rows(),
            block
        )));
    }
    let mut averaged = Matrix::filled(matrix.rows() / block, matrix.cols(), 0.0);
    for out_row in 0..averaged.rows() {
        for col in 0..matrix.cols() {
            let sum: f64 = (0..block).map(|k| matrix.get(out_row * block + k, col)).sum();
            averaged.set(out_row, col, sum / block as f64);
        }
    }
    Ok(averaged)
}

/// Run ids spread across a sweep for `columns` side-by-side panels.
pub fn representative_runs(total_runs: usize, columns: usize) -> Result<Vec<u64>, SweepError> {
    if columns == 0 || total_runs == 0 {
        return Err(SweepError::config("need at least one run and one panel"));
    }
    let spacing = total_runs as f64 / (columns as f64 - 0.9);
    Ok((0..columns).map(|i| (i as f64 * spacing).floor() as u64).collect())
}

/// Mean and spread of one column across replicates, by rank of another column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankProfile {
    /// Replicate mean per rank (0 = lowest ranking value).
    pub mean: Vec<f64>,
    /// Population standard deviation across replicates per rank.
    pub std: Vec<f64>,
    pub replicates: usize,
}

/// Sorts the individuals of each run by `rank_column` at every step in
/// `first_step..=last_step`, averages `value_column` per rank over those steps,
/// then summarizes each rank across the replicates of the swept setting.
pub fn rank_sorted_profile(
    agents: &UnifiedAgentTable,
    swept: &[f64],
    first_step: u32,
    last_step: u32,
    value_column: &str,
    rank_column: &str,
) -> Result<RankProfile, SweepError> {
    let value_index = agents.column_index(value_column)?;
    let rank_index = agents.column_index(rank_column)?;

    let mut per_replicate: Vec<Vec<f64>> = Vec::new();
    let mut current: Option<(u64, Vec<f64>, usize)> = None;
    let blocks = agents.step_blocks().into_iter().filter(|b| {
        agents.rows[b.rows.start].swept == swept && (first_step..=last_step).contains(&b.step)
    });

    for block in blocks {
        let rows = &agents.rows[block.rows.clone()];
        let ranked: Vec<f64> = sorted_by(rows, Some(rank_index)).iter().map(|r| r.values[value_index]).collect();

        let same_run = matches!(&current, Some((run_id, _, _)) if *run_id == block.run_id);
        if same_run {
            if let Some((_, sums, steps)) = current.as_mut() {
                if sums.len() != ranked.len() {
                    return Err(SweepError::integrity(Some(block.run_id), Some(block.step), "individual count changed"));
                }
                sums.iter_mut().zip(&ranked).for_each(|(s, v)| *s += v);
                *steps += 1;
            }
        } else {
            if let Some((_, sums, steps)) = current.take() {
                per_replicate.push(sums.into_iter().map(|s| s / steps as f64).collect());
            }
            current = Some((block.run_id, ranked, 1));
        }
    }
    if let Some((_, sums, steps)) = current {
        per_replicate.push(sums.into_iter().map(|s| s / steps as f64).collect());
    }

    let ranks = match per_replicate.first() {
        Some(first) => first.len(),
        None => {
            return Err(SweepError::EmptySample {
                what: format!("steps {first_step}..={last_step} at swept values {swept:?}"),
            })
        }
    };
    if per_replicate.iter().any(|r| r.len() != ranks) {
        return Err(SweepError::integrity(None, None, "replicates report different individual counts"));
    }

    let mut mean = Vec::with_capacity(ranks);
    let mut std = Vec::with_capacity(ranks);
    for rank in 0..ranks {
        let samples: Vec<f64> = per_replicate.iter().map(|r| r[rank]).collect();
        let m = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / samples.len() as f64;
        mean.push(m);
        std.push(var.sqrt());
    }
    Ok(RankProfile { mean, std, replicates: per_replicate.len() })
}
