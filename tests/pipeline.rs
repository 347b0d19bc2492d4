use anyhow::Result;
use std::f64::consts::PI;
use sweep_common::{FailurePolicy, ParameterSet};
use sweep_engine::aggregate::{at_step, group_reduce, group_reduce_where, GroupKey, Reducer};
use sweep_engine::export::write_table_to;
use sweep_engine::matrix::final_state_projection;
use sweep_engine::report::{build_summary, ReportSpec};
use sweep_engine::{
    merge_outcome, run_sweep, Execution, ObservationSchema, ObservationSink, ProxyModelFactory, RunContext,
    Simulation, SweepError, SweepSpec, SweptParameter, UnifiedTables, WrapInterval,
};

/// `num_agents` individuals that each report `x + agent_id + 10 * replicate`, every step.
struct Flat {
    x: f64,
    offset: f64,
    num_agents: usize,
    duplicate_at: Option<u32>,
    fail: bool,
    step: u32,
}

impl Simulation for Flat {
    fn schema(&self) -> ObservationSchema {
        ObservationSchema::new(["level"], ["value"], self.num_agents)
    }

    fn run(&mut self, steps: u32, step_interval: u32, sink: &mut dyn ObservationSink) -> Result<()> {
        for _ in 0..steps {
            if self.fail && self.step == 1 {
                anyhow::bail!("population collapsed");
            }
            if self.step % step_interval == 0 {
                sink.record_model_step(self.step, vec![self.x])?;
                let mut agents: Vec<(usize, Vec<f64>)> =
                    (0..self.num_agents).map(|id| (id, vec![self.x + id as f64 + self.offset])).collect();
                if self.duplicate_at == Some(self.step) {
                    agents[1].0 = 0;
                }
                sink.record_agent_step(self.step, agents)?;
            }
            self.step += 1;
        }
        Ok(())
    }

    fn last_step(&self) -> u32 {
        self.step
    }
}

fn flat(num_agents: usize, duplicate_at: Option<u32>, fail_x: Option<f64>) -> impl Fn(&ParameterSet, &RunContext) -> Result<Flat> + Sync {
    move |params, ctx| {
        let x = params.require("x")?;
        let offset = ctx.replicate as f64 * 10.0;
        Ok(Flat { x, offset, num_agents, duplicate_at, fail: Some(x) == fail_x, step: 0 })
    }
}

fn proxy_spec(execution: Execution) -> SweepSpec {
    let fixed = ParameterSet::new()
        .with("numAgents", 12.0)
        .with("competition", 0.5)
        .with("selection_pressure", 0.3)
        .with("practice_mutation_rate", PI / 90.0)
        .with("goal_angle", PI / 4.0);
    SweepSpec::new(fixed, SweptParameter::new("talent_sd", vec![0.0, 1.0]), 2, 8, 2)
        .with_seed(2017)
        .with_execution(execution)
}

fn csv_bytes(tables: &UnifiedTables) -> (Vec<u8>, Vec<u8>) {
    let mut model = Vec::new();
    let mut agent = Vec::new();
    write_table_to(&tables.model, &mut model).unwrap();
    write_table_to(&tables.agent, &mut agent).unwrap();
    (model, agent)
}

#[test]
fn constant_model_sweep_end_to_end() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0, 2.0]), 2, 3, 1);
    let outcome = run_sweep(&spec, &flat(1, None, None)).unwrap();
    let tables = merge_outcome(&outcome).unwrap();

    assert_eq!(tables.model.len(), 12);
    assert_eq!(tables.agent.len(), 12);

    let summary = group_reduce(&tables.model, &[GroupKey::swept("x")], "level", Reducer::Linear).unwrap();
    assert_eq!(summary.labels(), vec![vec![1.0], vec![2.0]]);
    assert_eq!(summary.means(), vec![Some(1.0), Some(2.0)]);
    assert_eq!(summary.stds(), vec![Some(0.0), Some(0.0)]);
}

#[test]
fn duplicate_agent_id_is_a_data_integrity_error() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0]), 1, 3, 1);
    let err = run_sweep(&spec, &flat(2, Some(1), None)).unwrap_err();
    match err {
        SweepError::DataIntegrity { run_id, step, detail } => {
            assert_eq!(run_id, Some(0));
            assert_eq!(step, Some(1));
            assert!(detail.contains("reported twice"));
        }
        other => panic!("expected a data integrity error, got {other}"),
    }
}

#[test]
fn data_integrity_is_fatal_even_when_isolating() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0, 2.0]), 1, 3, 1)
        .with_failure_policy(FailurePolicy::Isolate)
        .with_execution(Execution::Sequential);
    assert!(matches!(run_sweep(&spec, &flat(2, Some(0), None)), Err(SweepError::DataIntegrity { .. })));
}

#[test]
fn isolated_failure_is_excluded_and_reported() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0, 2.0]), 2, 3, 1)
        .with_failure_policy(FailurePolicy::Isolate);
    let outcome = run_sweep(&spec, &flat(1, None, Some(2.0))).unwrap();
    assert_eq!(outcome.failed_run_ids(), vec![2, 3]);
    assert!(!outcome.is_complete());

    let tables = merge_outcome(&outcome).unwrap();
    assert_eq!(tables.model.run_ids(), vec![0, 1]);
    let report = ReportSpec { linear_columns: vec!["level".into()], circular_columns: Vec::new(), interval: WrapInterval::RADIANS };
    let summary = build_summary(&tables, &outcome, &report).unwrap();
    assert_eq!(summary.failed_runs.len(), 2);
    assert!(summary.failed_runs[0].cause.contains("population collapsed"));
    // The swept value with no surviving run has no group at all
    assert_eq!(summary.final_state[0].groups.len(), 1);
}

#[test]
fn abort_policy_stops_the_sweep() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0, 2.0]), 1, 3, 1)
        .with_execution(Execution::Sequential);
    let err = run_sweep(&spec, &flat(1, None, Some(2.0))).unwrap_err();
    assert!(matches!(err, SweepError::Simulation { run_id: 1, .. }));
}

#[test]
fn final_state_projection_is_individuals_by_replicates() {
    let spec = SweepSpec::new(ParameterSet::new(), SweptParameter::new("x", vec![1.0, 5.0]), 3, 4, 1);
    let outcome = run_sweep(&spec, &flat(2, None, None)).unwrap();
    let tables = merge_outcome(&outcome).unwrap();

    let matrix = final_state_projection(&tables.agent, &[5.0], None, "value").unwrap();
    assert_eq!((matrix.rows(), matrix.cols()), (2, 3));
    // Rows are individuals, columns are replicates in order
    assert_eq!(matrix.row(0), &[5.0, 15.0, 25.0]);
    assert_eq!(matrix.row(1), &[6.0, 16.0, 26.0]);
    for replicate in 0..3 {
        let base = 5.0 + 10.0 * replicate as f64;
        assert_eq!(matrix.column(replicate), vec![base, base + 1.0]);
    }
}

#[test]
fn proxy_sweep_is_deterministic() {
    let first = merge_outcome(&run_sweep(&proxy_spec(Execution::Sequential), &ProxyModelFactory).unwrap()).unwrap();
    let second = merge_outcome(&run_sweep(&proxy_spec(Execution::Sequential), &ProxyModelFactory).unwrap()).unwrap();
    assert_eq!(csv_bytes(&first), csv_bytes(&second));
}

#[test]
fn worker_count_does_not_change_results() {
    let sequential = merge_outcome(&run_sweep(&proxy_spec(Execution::Sequential), &ProxyModelFactory).unwrap()).unwrap();
    let parallel =
        merge_outcome(&run_sweep(&proxy_spec(Execution::Parallel { workers: 3 }), &ProxyModelFactory).unwrap()).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn proxy_sweep_rows_and_circular_practice() {
    let outcome = run_sweep(&proxy_spec(Execution::Parallel { workers: 0 }), &ProxyModelFactory).unwrap();
    let tables = merge_outcome(&outcome).unwrap();
    // 4 runs, steps 0, 2, 4, 6
    assert_eq!(tables.model.len(), 4 * 4);
    assert_eq!(tables.agent.len(), 4 * 4 * 12);
    assert_eq!(tables.model.last_step(), Some(6));

    let practice = group_reduce_where(
        &tables.model,
        at_step(6),
        &[GroupKey::swept("talent_sd")],
        "mean_practice",
        Reducer::Circular(WrapInterval::RADIANS),
    )
    .unwrap();
    for (_, stat) in &practice.groups {
        let mean = stat.mean.unwrap();
        assert!((-PI..PI).contains(&mean));
        assert!(stat.std.unwrap() >= 0.0);
    }

    let summary = build_summary(&tables, &outcome, &ReportSpec::proxy_model(WrapInterval::RADIANS)).unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.final_state.len(), 5);
    assert_eq!(summary.dynamics[0].groups.len(), 2 * 4);
}
