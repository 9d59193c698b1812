//! Thin binary wiring the domain crates into one end-to-end run: build a
//! small demonstration model, run it through the block scheduler against a
//! mock solver, and print the resulting document as XML. Exists to
//! smoke-test the crate stack from the command line; no actual solver
//! process is reachable from here.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use linnyr_model::{Expr, Model, ModelConfig, NodeRef};
use linnyr_solver::{BlockScheduler, MockSolver, RunConfig, Solution, SolutionStatus, Solver, TableauBuilder};
use linnyr_xml::ModelDocument;

#[derive(Parser)]
#[command(name = "linnyr", about = "Run a demonstration Linny-R model through the scheduler")]
struct Args {
    /// Path to a JSON file overriding the built-in `ModelConfig` defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match args.config {
        Some(path) => ModelConfig::load(&path).with_context(|| format!("loading config from {}", path.display()))?,
        None => ModelConfig::default(),
    };

    let model = build_demo_model(&config).context("building demonstration model")?;
    let mut doc = ModelDocument::new(model);
    doc.currency_unit = config.default_currency_unit.clone();
    doc.time_unit = config.default_time_unit.clone();
    doc.time_scale = config.default_time_scale;
    doc.default_scale_unit = config.default_scale_unit.clone();
    doc.dataset_precision = config.dataset_precision;
    doc.results_precision = config.results_precision;

    run_demo(&mut doc.model).context("running demonstration model")?;

    let xml = linnyr_xml::write_document(&doc).context("serializing result document")?;
    println!("{xml}");
    Ok(())
}

fn build_demo_model(config: &ModelConfig) -> anyhow::Result<Model> {
    let mut model = Model::new();
    config
        .apply_scale_units(&mut model.units)
        .map_err(anyhow::Error::msg)
        .context("applying configured scale units")?;

    let top = model.top_cluster;
    let plant = model.add_process("Plant", top).map_err(|d| anyhow::anyhow!(d.to_string()))?;
    model.processes.get_mut(plant).unwrap().upper_bound = Expr::constant("ub", 10.0);

    let power = model.add_product("Power").map_err(|d| anyhow::anyhow!(d.to_string()))?;
    model.products.get_mut(power).unwrap().price = Expr::constant("price", 1.0);

    model
        .add_link(NodeRef::Process(plant), NodeRef::Product(power), Expr::constant("rate", 1.0))
        .map_err(|d| anyhow::anyhow!(d.to_string()))?;

    Ok(model)
}

/// Runs the demo model for a single four-timestep block against a
/// `MockSolver` primed with the trivial all-lower-bound solution — there is
/// no real solver behind this binary, only a scheduling smoke test.
fn run_demo(model: &mut Model) -> anyhow::Result<()> {
    let config = RunConfig {
        block_length: 4,
        look_ahead: 0,
        start_period: 0,
        end_period: 3,
        timeout_period: 30.0,
    };

    let builder = TableauBuilder::new(model);
    let tableau = builder.build(config.start_period, config.block_length, config.look_ahead, &Default::default());
    let variable_values: Vec<f64> = tableau.variables.iter().map(|v| v.lower).collect();

    let mut solver = MockSolver::new();
    solver.logon("linnyr-cli").map_err(|e| anyhow::anyhow!(e.to_string()))?;
    solver.queue(Solution {
        block: 0,
        round: 0,
        status: SolutionStatus::Optimal,
        solver_seconds: 0.0,
        messages: vec!["mock solve".to_string()],
        variable_values,
    });

    let mut scheduler = BlockScheduler::new();
    scheduler
        .run(model, &mut solver, &config)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}
