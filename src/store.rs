use crate::cancel::RunGuard;
use crate::error::SweepError;
use log::trace;
use serde::{Deserialize, Serialize};

/// Column layout of the observations a simulation emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSchema {
    /// Names of the population-level fields, in record order.
    pub model_columns: Vec<String>,
    /// Names of the per-individual fields, in record order.
    pub agent_columns: Vec<String>,
    /// Individuals are identified by `0..num_agents`.
    pub num_agents: usize,
}

impl ObservationSchema {
    pub fn new<M, A>(model_columns: M, agent_columns: A, num_agents: usize) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            model_columns: model_columns.into_iter().map(Into::into).collect(),
            agent_columns: agent_columns.into_iter().map(Into::into).collect(),
            num_agents,
        }
    }
}

/// One population-level row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObservation {
    pub step: u32,
    pub values: Vec<f64>,
}

/// One per-individual row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentObservation {
    pub step: u32,
    pub agent_id: usize,
    pub values: Vec<f64>,
}

/// Receives observation records pushed by a running simulation.
///
/// Records are handed over by value; the sink never looks back into the simulation.
pub trait ObservationSink {
    fn record_model_step(&mut self, step: u32, fields: Vec<f64>) -> Result<(), SweepError>;

    /// Records one row per individual. `agents` pairs each identifier with its fields.
    fn record_agent_step(&mut self, step: u32, agents: Vec<(usize, Vec<f64>)>) -> Result<(), SweepError>;
}

/// Append-only observation buffer of a single run.
#[derive(Debug)]
pub struct ObservationStore {
    run_id: u64,
    schema: ObservationSchema,
    model_rows: Vec<ModelObservation>,
    agent_rows: Vec<AgentObservation>,
    /// Steps accepted so far; checked against the buffers when merging.
    model_steps: usize,
    agent_steps: usize,
    last_model_step: Option<u32>,
    last_agent_step: Option<u32>,
    guard: Option<RunGuard>,
}

impl ObservationStore {
    pub fn new(run_id: u64, schema: ObservationSchema) -> Self {
        Self {
            run_id,
            schema,
            model_rows: Vec::new(),
            agent_rows: Vec::new(),
            model_steps: 0,
            agent_steps: 0,
            last_model_step: None,
            last_agent_step: None,
            guard: None,
        }
    }

    /// Attaches a cancellation/time budget checked before every record.
    pub fn with_guard(mut self, guard: RunGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn schema(&self) -> &ObservationSchema {
        &self.schema
    }

    /// Model rows in insertion (= step) order.
    pub fn model_table(&self) -> &[ModelObservation] {
        &self.model_rows
    }

    /// Agent rows ordered by step, then by agent identifier.
    pub fn agent_table(&self) -> &[AgentObservation] {
        &self.agent_rows
    }

    pub fn recorded_model_steps(&self) -> usize {
        self.model_steps
    }

    pub fn recorded_agent_steps(&self) -> usize {
        self.agent_steps
    }

    /// Re-checks the guard, e.g. once the simulation has returned.
    pub fn check_guard(&self) -> Result<(), SweepError> {
        match &self.guard {
            Some(guard) => guard.check(),
            None => Ok(()),
        }
    }

    fn check_step(&self, last: Option<u32>, step: u32) -> Result<(), SweepError> {
        match last {
            Some(last) if step <= last => Err(SweepError::integrity(
                Some(self.run_id),
                Some(step),
                format!("step {step} does not follow previously recorded step {last}"),
            )),
            _ => Ok(()),
        }
    }

    fn check_width(&self, step: u32, what: &str, got: usize, expected: usize) -> Result<(), SweepError> {
        if got != expected {
            return Err(SweepError::integrity(
                Some(self.run_id),
                Some(step),
                format!("{what} row has {got} fields, schema declares {expected}"),
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn drop_agent_row_for_test(&mut self, index: usize) {
        self.agent_rows.remove(index);
    }
}

impl ObservationSink for ObservationStore {
    fn record_model_step(&mut self, step: u32, fields: Vec<f64>) -> Result<(), SweepError> {
        self.check_guard()?;
        self.check_step(self.last_model_step, step)?;
        self.check_width(step, "model", fields.len(), self.schema.model_columns.len())?;

        self.model_rows.push(ModelObservation { step, values: fields });
        self.model_steps += 1;
        self.last_model_step = Some(step);
        trace!("Run {}: recorded model step {}", self.run_id, step);
        Ok(())
    }

    fn record_agent_step(&mut self, step: u32, mut agents: Vec<(usize, Vec<f64>)>) -> Result<(), SweepError> {
        self.check_guard()?;
        self.check_step(self.last_agent_step, step)?;

        let num_agents = self.schema.num_agents;
        if agents.len() != num_agents {
            return Err(SweepError::integrity(
                Some(self.run_id),
                Some(step),
                format!("{} agent rows reported, expected {}", agents.len(), num_agents),
            ));
        }

        // Every identifier in 0..num_agents exactly once
        let mut seen = vec![false; num_agents];
        for (agent_id, values) in &agents {
            let slot = seen.get_mut(*agent_id).ok_or_else(|| {
                SweepError::integrity(
                    Some(self.run_id),
                    Some(step),
                    format!("agent id {agent_id} outside 0..{num_agents}"),
                )
            })?;
            if *slot {
                return Err(SweepError::integrity(
                    Some(self.run_id),
                    Some(step),
                    format!("agent id {agent_id} reported twice"),
                ));
            }
            *slot = true;
            self.check_width(step, "agent", values.len(), self.schema.agent_columns.len())?;
        }

        agents.sort_by_key(|(agent_id, _)| *agent_id);
        self.agent_rows.extend(
            agents
                .into_iter()
                .map(|(agent_id, values)| AgentObservation { step, agent_id, values }),
        );
        self.agent_steps += 1;
        self.last_agent_step = Some(step);
        trace!("Run {}: recorded {} agents at step {}", self.run_id, num_agents, step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;

    fn store(num_agents: usize) -> ObservationStore {
        ObservationStore::new(0, ObservationSchema::new(["mean_x"], ["x", "y"], num_agents))
    }

    #[test]
    fn keeps_insertion_order() {
        let mut store = store(1);
        for step in [0, 2, 5] {
            store.record_model_step(step, vec![step as f64]).unwrap();
        }
        let steps: Vec<u32> = store.model_table().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![0, 2, 5]);
        assert_eq!(store.recorded_model_steps(), 3);
    }

    #[test]
    fn rejects_repeated_or_decreasing_steps() {
        let mut store = store(1);
        store.record_model_step(3, vec![0.0]).unwrap();
        assert!(store.record_model_step(3, vec![0.0]).is_err());
        let err = store.record_model_step(1, vec![0.0]).unwrap_err();
        assert!(matches!(err, SweepError::DataIntegrity { step: Some(1), .. }));
        assert_eq!(store.model_table().len(), 1);
    }

    #[test]
    fn duplicated_agent_id_is_rejected_not_overwritten() {
        let mut store = store(3);
        let agents = vec![(0, vec![0.0, 0.0]), (1, vec![1.0, 1.0]), (1, vec![2.0, 2.0])];
        let err = store.record_agent_step(0, agents).unwrap_err();
        assert!(err.to_string().contains("agent id 1 reported twice"));
        assert!(store.agent_table().is_empty());
        assert_eq!(store.recorded_agent_steps(), 0);
    }

    #[test]
    fn agent_rows_are_sorted_by_identifier() {
        let mut store = store(3);
        let agents = vec![(2, vec![2.0, 0.0]), (0, vec![0.0, 0.0]), (1, vec![1.0, 0.0])];
        store.record_agent_step(0, agents).unwrap();
        let ids: Vec<usize> = store.agent_table().iter().map(|r| r.agent_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_out_of_range_ids_and_wrong_widths() {
        let mut store = store(2);
        assert!(store.record_agent_step(0, vec![(0, vec![0.0, 0.0]), (2, vec![0.0, 0.0])]).is_err());
        assert!(store.record_agent_step(0, vec![(0, vec![0.0, 0.0])]).is_err());
        assert!(store.record_agent_step(0, vec![(0, vec![0.0]), (1, vec![0.0, 0.0])]).is_err());
        assert!(store.record_model_step(0, vec![]).is_err());
    }

    #[test]
    fn cancelled_guard_stops_recording() {
        let token = CancelToken::new();
        let mut store = store(1).with_guard(RunGuard::new(0, token.clone(), None));
        store.record_model_step(0, vec![1.0]).unwrap();
        token.cancel();
        assert!(matches!(
            store.record_model_step(1, vec![1.0]),
            Err(SweepError::Cancelled { run_id: Some(0) })
        ));
    }
}
