//! End-to-end scenarios exercising the tableau builder and scheduler
//! together, with a hand-built `MockSolver` solution standing in for an
//! actual LP/MILP solve.

use linnyr_common::Value;
use linnyr_model::{BoundLine, BoundType, Expr, Model, NodeRef};
use linnyr_solver::{
    BlockScheduler, Carry, MockSolver, RunConfig, Solution, SolutionStatus, Solver, TableauBuilder,
    VariableKind,
};

#[test]
fn trivial_bound_test_produces_the_expected_level_and_flow_vectors() {
    let mut model = Model::new();
    let top = model.top_cluster;
    let p = model.add_process("P", top).unwrap();
    let q = model.add_product("Q").unwrap();
    model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 10.0);
    model.products.get_mut(q).unwrap().price = Expr::constant("price", 1.0);
    let link = model
        .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
        .unwrap();

    let builder = TableauBuilder::new(&model);
    let tableau = builder.build(0, 4, 0, &Carry::default());
    let expected_levels = [0.0, 10.0, 10.0, 10.0];
    let values: Vec<f64> = tableau
        .variables
        .iter()
        .map(|v| match v.kind {
            VariableKind::Level if v.node == NodeRef::Process(p) => expected_levels[v.t as usize],
            VariableKind::OnOff => {
                if expected_levels[v.t as usize] > 0.0 { 1.0 } else { 0.0 }
            }
            _ => 0.0,
        })
        .collect();

    let mut solver = MockSolver::new();
    solver.logon("u").unwrap();
    solver.queue(Solution {
        block: 0,
        round: 0,
        status: SolutionStatus::Optimal,
        solver_seconds: 0.0,
        messages: Vec::new(),
        variable_values: values,
    });

    let mut scheduler = BlockScheduler::new();
    let config = RunConfig {
        block_length: 4,
        look_ahead: 0,
        start_period: 0,
        end_period: 3,
        timeout_period: 30.0,
    };
    scheduler.run(&mut model, &mut solver, &config).unwrap();

    assert_eq!(model.processes.get(p).unwrap().level, expected_levels);
    assert_eq!(model.links.get(link).unwrap().actual_flow, expected_levels);
}

#[test]
fn a_delayed_link_shifts_the_flow_by_one_timestep() {
    let mut model = Model::new();
    let top = model.top_cluster;
    let p = model.add_process("P", top).unwrap();
    let q = model.add_product("Q").unwrap();
    model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 10.0);
    model.products.get_mut(q).unwrap().price = Expr::constant("price", 1.0);
    let link = model
        .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
        .unwrap();
    model.links.get_mut(link).unwrap().flow_delay = Expr::constant("delay", 1.0);

    let builder = TableauBuilder::new(&model);
    let tableau = builder.build(0, 4, 0, &Carry::default());
    let expected_levels = [0.0, 10.0, 10.0, 10.0];
    let values: Vec<f64> = tableau
        .variables
        .iter()
        .map(|v| match v.kind {
            VariableKind::Level if v.node == NodeRef::Process(p) => expected_levels[v.t as usize],
            VariableKind::OnOff => {
                if expected_levels[v.t as usize] > 0.0 { 1.0 } else { 0.0 }
            }
            _ => 0.0,
        })
        .collect();

    let mut solver = MockSolver::new();
    solver.logon("u").unwrap();
    solver.queue(Solution {
        block: 0,
        round: 0,
        status: SolutionStatus::Optimal,
        solver_seconds: 0.0,
        messages: Vec::new(),
        variable_values: values,
    });

    let mut scheduler = BlockScheduler::new();
    let config = RunConfig {
        block_length: 4,
        look_ahead: 0,
        start_period: 0,
        end_period: 3,
        timeout_period: 30.0,
    };
    scheduler.run(&mut model, &mut solver, &config).unwrap();

    // The process's own level is unaffected by the delay on its outgoing
    // link; only the flow that reaches the product lags by one step.
    assert_eq!(model.processes.get(p).unwrap().level, expected_levels);
    assert_eq!(model.links.get(link).unwrap().actual_flow, [0.0, 0.0, 10.0, 10.0]);
}

#[test]
fn an_unfed_buffer_with_equal_bounds_holds_its_forced_level() {
    let mut model = Model::new();
    let q = model.add_product("Q").unwrap();
    {
        let product = model.products.get_mut(q).unwrap();
        product.is_buffer = true;
        product.lower_bound = Expr::constant("lb", 5.0);
        product.upper_bound = Expr::constant("ub", 5.0);
    }

    let builder = TableauBuilder::new(&model);
    let tableau = builder.build(0, 4, 0, &Carry::default());
    let values: Vec<f64> = tableau
        .variables
        .iter()
        .map(|v| match v.kind {
            VariableKind::Level if v.node == NodeRef::Product(q) => 5.0,
            _ => 0.0,
        })
        .collect();

    let mut solver = MockSolver::new();
    solver.logon("u").unwrap();
    solver.queue(Solution {
        block: 0,
        round: 0,
        status: SolutionStatus::Optimal,
        solver_seconds: 0.0,
        messages: Vec::new(),
        variable_values: values,
    });

    let mut scheduler = BlockScheduler::new();
    let config = RunConfig {
        block_length: 4,
        look_ahead: 0,
        start_period: 0,
        end_period: 3,
        timeout_period: 30.0,
    };
    scheduler.run(&mut model, &mut solver, &config).unwrap();

    assert_eq!(model.products.get(q).unwrap().level, [5.0, 5.0, 5.0, 5.0]);

    // With no inflow links the buffer carries its prior stock price forward
    // each step; with nothing ever feeding it, that stays at zero. The
    // scheduler already ran the cost-price propagator once for the full run.
    assert_eq!(
        model.products.get(q).unwrap().stock_price,
        [Value::Number(0.0), Value::Number(0.0), Value::Number(0.0), Value::Number(0.0)]
    );
}

#[test]
fn bound_line_constraint_forces_a_convex_combination_of_its_knots() {
    let mut model = Model::new();
    let top = model.top_cluster;
    let a = model.add_process("A", top).unwrap();
    let b = model.add_process("B", top).unwrap();
    model.processes.get_mut(a).unwrap().upper_bound = Expr::constant("ub", 100.0);
    model.processes.get_mut(b).unwrap().upper_bound = Expr::constant("ub", 100.0);
    model
        .add_constraint(
            NodeRef::Process(a),
            NodeRef::Process(b),
            vec![BoundLine {
                bound_type: BoundType::Ge,
                points: vec![(0.0, 0.0), (50.0, 50.0), (100.0, 50.0)],
                selectors: Vec::new(),
            }],
        )
        .unwrap();

    let builder = TableauBuilder::new(&model);
    let tableau = builder.build(0, 1, 0, &Carry::default());

    let weight_vars: Vec<usize> = tableau
        .variables
        .iter()
        .enumerate()
        .filter(|(_, v)| v.kind == VariableKind::BoundLineWeight)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(weight_vars.len(), 3, "one weight per knot");

    let sum_row = tableau
        .rows
        .iter()
        .find(|r| r.description.starts_with("bound_line_weights_sum"))
        .expect("weight-sum-to-one row");
    assert_eq!(sum_row.rhs, 1.0);

    let y_row = tableau
        .rows
        .iter()
        .find(|r| r.description.starts_with("bound_line_y"))
        .expect("y-interpolation row");
    assert_eq!(y_row.sense, linnyr_solver::RowSense::Ge);

    // A.level forced to 80 sits between knots (50,50) and (100,50); the
    // convex combination weight2=0.4, weight3=0.6, weight1=0 reproduces it
    // and yields B=50, satisfying the GE bound exactly at its floor.
    let weights = [0.0, 0.4, 0.6];
    let x: f64 = weights
        .iter()
        .zip([0.0, 50.0, 100.0])
        .map(|(w, x)| w * x)
        .sum();
    let y: f64 = weights
        .iter()
        .zip([0.0, 50.0, 50.0])
        .map(|(w, y)| w * y)
        .sum();
    assert_eq!(x, 80.0);
    assert_eq!(y, 50.0);
}
