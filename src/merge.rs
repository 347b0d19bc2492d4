use crate::error::SweepError;
use crate::sweep::{RunRecord, SweepOutcome};
use crate::table::{AgentRow, ModelRow, Table, UnifiedAgentTable, UnifiedModelTable};
use log::{debug, info};

/// The two long-form tables built from a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedTables {
    pub model: UnifiedModelTable,
    pub agent: UnifiedAgentTable,
}

/// Merges the completed runs of an outcome. Failed runs are never included.
///
/// When no run completed, the tables are empty but keep the column layout the
/// failed runs reported, so reductions over them yield undefined groups.
pub fn merge_outcome(outcome: &SweepOutcome) -> Result<UnifiedTables, SweepError> {
    let mut tables = merge_runs(&outcome.swept_names, &outcome.runs)?;
    if outcome.runs.is_empty() {
        if let Some(schema) = &outcome.schema {
            tables.model.columns = schema.model_columns.clone();
            tables.agent.columns = schema.agent_columns.clone();
        }
    }
    Ok(tables)
}

/// Concatenates per-run observations into unified tables tagged with run id and swept values.
///
/// Output is ordered by run id, then step, then agent id. Every run must share
/// the same column layout. The row count of each table must equal the number of
/// steps each store accepted (times its agent count); any shortfall is a
/// data-integrity error, never a silent truncation.
pub fn merge_runs(swept_names: &[String], runs: &[RunRecord]) -> Result<UnifiedTables, SweepError> {
    let mut ordered: Vec<&RunRecord> = runs.iter().collect();
    ordered.sort_by_key(|r| r.run_id);
    if let Some(pair) = ordered.windows(2).find(|pair| pair[0].run_id == pair[1].run_id) {
        return Err(SweepError::integrity(Some(pair[0].run_id), None, "run id appears twice in merge input"));
    }

    let (model_columns, agent_columns) = match ordered.first() {
        Some(first) => {
            let schema = first.store.schema();
            (schema.model_columns.clone(), schema.agent_columns.clone())
        }
        None => (Vec::new(), Vec::new()),
    };

    let mut model_rows = Vec::new();
    let mut agent_rows = Vec::new();
    let mut expected_model_rows = 0usize;
    let mut expected_agent_rows = 0usize;

    for record in ordered {
        let store = &record.store;
        let schema = store.schema();
        if record.swept.len() != swept_names.len() {
            return Err(SweepError::integrity(
                Some(record.run_id),
                None,
                format!("run carries {} swept values for {} swept parameters", record.swept.len(), swept_names.len()),
            ));
        }
        if schema.model_columns != model_columns || schema.agent_columns != agent_columns {
            return Err(SweepError::integrity(Some(record.run_id), None, "column layout differs from other runs"));
        }

        // Every recorded step carries one model row and a full set of agent rows
        if store.recorded_agent_steps() != store.recorded_model_steps() {
            return Err(SweepError::integrity(
                Some(record.run_id),
                None,
                format!(
                    "{} model steps recorded but {} agent steps",
                    store.recorded_model_steps(),
                    store.recorded_agent_steps()
                ),
            ));
        }
        let run_model_rows = store.recorded_model_steps();
        let run_agent_rows = run_model_rows * schema.num_agents;
        if store.model_table().len() != run_model_rows {
            return Err(SweepError::integrity(
                Some(record.run_id),
                None,
                format!("store holds {} model rows for {} recorded steps", store.model_table().len(), run_model_rows),
            ));
        }
        if store.agent_table().len() != run_agent_rows {
            return Err(SweepError::integrity(
                Some(record.run_id),
                None,
                format!(
                    "store holds {} agent rows, expected {} steps x {} agents",
                    store.agent_table().len(),
                    store.recorded_agent_steps(),
                    schema.num_agents
                ),
            ));
        }
        expected_model_rows += run_model_rows;
        expected_agent_rows += run_agent_rows;

        model_rows.extend(store.model_table().iter().map(|obs| ModelRow {
            run_id: record.run_id,
            swept: record.swept.clone(),
            replicate: record.replicate,
            step: obs.step,
            values: obs.values.clone(),
        }));
        agent_rows.extend(store.agent_table().iter().map(|obs| AgentRow {
            run_id: record.run_id,
            swept: record.swept.clone(),
            replicate: record.replicate,
            step: obs.step,
            agent_id: obs.agent_id,
            values: obs.values.clone(),
        }));
        debug!("Merged run {} ({} model rows, {} agent rows)", record.run_id, run_model_rows, run_agent_rows);
    }

    if model_rows.len() != expected_model_rows {
        return Err(SweepError::integrity(
            None,
            None,
            format!("model table has {} rows, expected {}", model_rows.len(), expected_model_rows),
        ));
    }
    if agent_rows.len() != expected_agent_rows {
        return Err(SweepError::integrity(
            None,
            None,
            format!("agent table has {} rows, expected {}", agent_rows.len(), expected_agent_rows),
        ));
    }

    info!("Merged {} runs: {} model rows, {} agent rows", runs.len(), model_rows.len(), agent_rows.len());
    Ok(UnifiedTables {
        model: Table { swept_names: swept_names.to_vec(), columns: model_columns, rows: model_rows },
        agent: Table { swept_names: swept_names.to_vec(), columns: agent_columns, rows: agent_rows },
    })
}
