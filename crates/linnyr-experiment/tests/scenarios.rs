//! End-to-end experiment scenarios.

use linnyr_model::{Chart, ChartVariable, Expr, Experiment, Model, NodeRef};
use linnyr_solver::{MockSolver, RunConfig, Solution, SolutionStatus, Solver, VariableKind};

use linnyr_experiment::{ExperimentError, ExperimentRunner};

#[test]
fn dimensions_sharing_a_selector_are_rejected_as_non_orthogonal() {
    let mut model = Model::new();
    let experiment_id = model.experiments.insert(Experiment {
        title: "demand scan".to_string(),
        dimensions: vec![
            vec!["lo".to_string(), "hi".to_string()],
            vec!["lo".to_string(), "mid".to_string()],
        ],
        charts: Vec::new(),
        settings_selectors: Vec::new(),
        actor_selectors: Vec::new(),
        combination_selectors: Vec::new(),
        excluded_selectors: Vec::new(),
        clusters_to_ignore: Vec::new(),
        runs: Vec::new(),
    });

    let mut solver = MockSolver::new();
    let config = RunConfig {
        block_length: 1,
        look_ahead: 0,
        start_period: 0,
        end_period: 0,
        timeout_period: 30.0,
    };

    let mut runner = ExperimentRunner::new(&mut model);
    let err = runner.run(experiment_id, &mut solver, &config).unwrap_err();
    match err {
        ExperimentError::Combination(inner) => {
            assert_eq!(inner.to_string().contains("lo"), true);
        }
        other => panic!("expected a combination error, got {other:?}"),
    }
}

#[test]
fn a_two_by_one_experiment_runs_each_combination_and_records_its_chart_series() {
    let mut model = Model::new();
    let top = model.top_cluster;
    let p = model.add_process("P", top).unwrap();
    let q = model.add_product("Q").unwrap();
    model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 10.0);
    model.products.get_mut(q).unwrap().price = Expr::constant("price", 1.0);
    model
        .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
        .unwrap();

    let chart_id = model.charts.insert(Chart {
        title: "P level".to_string(),
        bins: 0,
        histogram: false,
        variables: vec![ChartVariable {
            object: "p".to_string(),
            attribute: Some("level".to_string()),
            color: "#000".to_string(),
            scale_factor: 1.0,
            line_width: 1.0,
            stacked: false,
            sorted: false,
            visible: true,
            wildcard_index: None,
        }],
    });

    let experiment_id = model.experiments.insert(Experiment {
        title: "two scenarios".to_string(),
        dimensions: vec![vec!["a".to_string(), "b".to_string()]],
        charts: vec![chart_id],
        settings_selectors: Vec::new(),
        actor_selectors: Vec::new(),
        combination_selectors: Vec::new(),
        excluded_selectors: Vec::new(),
        clusters_to_ignore: Vec::new(),
        runs: Vec::new(),
    });

    let mut solver = MockSolver::new();
    solver.logon("u").unwrap();
    for _ in 0..2 {
        let tableau = linnyr_solver::TableauBuilder::new(&model).build(
            0,
            1,
            0,
            &linnyr_solver::Carry::default(),
        );
        let values: Vec<f64> = tableau
            .variables
            .iter()
            .map(|v| match v.kind {
                VariableKind::Level if v.node == NodeRef::Process(p) => 10.0,
                VariableKind::OnOff => 1.0,
                _ => 0.0,
            })
            .collect();
        solver.queue(Solution {
            block: 0,
            round: 0,
            status: SolutionStatus::Optimal,
            solver_seconds: 0.0,
            messages: Vec::new(),
            variable_values: values,
        });
    }

    let config = RunConfig {
        block_length: 1,
        look_ahead: 0,
        start_period: 0,
        end_period: 0,
        timeout_period: 30.0,
    };

    let mut runner = ExperimentRunner::new(&mut model);
    runner.run(experiment_id, &mut solver, &config).unwrap();

    let experiment = model.experiments.get(experiment_id).unwrap();
    assert_eq!(experiment.runs.len(), 2);
    for run in &experiment.runs {
        let (_, series) = &run.variable_series[0];
        assert_eq!(series, &vec![10.0]);
        let (_, stats) = &run.variable_stats[0];
        assert_eq!(stats.mean, 10.0);
    }
}
