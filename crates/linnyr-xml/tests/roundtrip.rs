//! Write→read round trips for a representative model document.

use std::io::{Read, Write};

use linnyr_model::{BoundLine, BoundType, Expr, Model, NodeRef};
use linnyr_xml::{read_document, write_document, ModelDocument};

fn sample_model() -> Model {
    let mut model = Model::new();
    model.units.add("kW", 1000.0, "1").unwrap();

    let actor = model.add_actor("Operator").unwrap();
    model.actors.get_mut(actor).unwrap().weight = Expr::constant("weight", 2.0);

    let top = model.top_cluster;
    let sub = model.add_cluster("Generation", top).unwrap();

    let p = model.add_process("Plant", sub).unwrap();
    model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 10.0);
    model.processes.get_mut(p).unwrap().actor = actor;

    let q = model.add_product("Power").unwrap();
    model.products.get_mut(q).unwrap().scale_unit = "kW".to_string();
    model.products.get_mut(q).unwrap().price = Expr::constant("price", 5.0);

    let link = model
        .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
        .unwrap();
    model.links.get_mut(link).unwrap().share_of_cost = 0.5;

    let r = model.add_process("Consumer", top).unwrap();
    model
        .add_constraint(
            NodeRef::Process(p),
            NodeRef::Process(r),
            vec![BoundLine {
                bound_type: BoundType::Le,
                points: vec![(0.0, 0.0), (100.0, 100.0)],
                selectors: vec!["peak".to_string()],
            }],
        )
        .unwrap();

    let dataset_id = model.datasets.insert(linnyr_model::Dataset {
        name: "Demand".to_string(),
        id: "demand".to_string(),
        default_value: 0.0,
        scale_unit: "kW".to_string(),
        time_scale: 1.0,
        time_unit: "hour".to_string(),
        interpolation: linnyr_model::InterpolationMethod::Nearest,
        periodic: true,
        array: false,
        raw_data: vec![1.0, 2.5, 2.5, 4.0],
        modifiers: vec![linnyr_model::DatasetModifier {
            selector: "peak".to_string(),
            expression: Expr::constant("scale", 1.5),
        }],
    });
    let _ = dataset_id;

    let chart = model.charts.insert(linnyr_model::Chart {
        title: "Power output".to_string(),
        bins: 10,
        histogram: false,
        variables: vec![linnyr_model::ChartVariable {
            object: "Plant".to_string(),
            attribute: Some("level".to_string()),
            color: "#ff0000".to_string(),
            scale_factor: 1.0,
            line_width: 1.0,
            stacked: false,
            sorted: false,
            visible: true,
            wildcard_index: None,
        }],
    });

    model.experiments.insert(linnyr_model::Experiment {
        title: "Sweep".to_string(),
        dimensions: vec![vec!["low".to_string(), "high".to_string()]],
        charts: vec![chart],
        settings_selectors: vec!["b=6".to_string()],
        actor_selectors: Vec::new(),
        combination_selectors: Vec::new(),
        excluded_selectors: Vec::new(),
        clusters_to_ignore: Vec::new(),
        runs: vec![linnyr_model::ExperimentRun {
            number: 1,
            wall_clock_start: 0.0,
            wall_clock_recorded: 1.5,
            time_step_count: 4,
            duration: 1.5,
            variable_stats: vec![(
                "Plant.level".to_string(),
                linnyr_model::VariableStats {
                    n: 4,
                    sum: 10.0,
                    mean: 2.5,
                    variance: 0.0,
                    min: 0.0,
                    max: 10.0,
                    non_zero_tally: 3,
                    exceptions: 0,
                    last: 4.0,
                },
            )],
            variable_series: vec![("Plant.level".to_string(), vec![0.0, 10.0, 10.0, 10.0])],
            solver_messages: vec![(0, "optimal".to_string())],
        }],
    });

    model
}

#[test]
fn a_populated_document_round_trips_through_xml() {
    let mut doc = ModelDocument::new(sample_model());
    doc.name = "Demo".to_string();
    doc.author = "Tester".to_string();

    let xml = write_document(&doc).unwrap();
    let parsed = read_document(&xml).unwrap();

    assert_eq!(parsed.name, "Demo");
    assert_eq!(parsed.author, "Tester");
    assert_eq!(parsed.model.processes.len(), doc.model.processes.len());
    assert_eq!(parsed.model.products.len(), doc.model.products.len());
    assert_eq!(parsed.model.links.len(), 1);
    assert_eq!(parsed.model.constraints.len(), 1);
    assert_eq!(parsed.model.datasets.len(), 1);
    assert_eq!(parsed.model.charts.len(), 1);
    assert_eq!(parsed.model.experiments.len(), 1);

    let plant = parsed.model.lookup_process("plant").expect("plant process survives");
    assert_eq!(parsed.model.processes.get(plant).unwrap().upper_bound.source, "10");

    let sub = parsed.model.lookup_cluster("generation").expect("sub-cluster survives");
    assert!(parsed.model.clusters.get(sub).unwrap().child_processes.contains(&plant));

    let power = parsed.model.lookup_product("power").expect("power product survives");
    assert_eq!(parsed.model.products.get(power).unwrap().scale_unit, "kW");

    let dataset = parsed.model.datasets.iter().next().unwrap().1;
    assert_eq!(dataset.raw_data, vec![1.0, 2.5, 2.5, 4.0]);
    assert_eq!(dataset.modifiers.len(), 1);

    let experiment = parsed.model.experiments.iter().next().unwrap().1;
    assert_eq!(experiment.charts.len(), 1);
    assert_eq!(experiment.runs.len(), 1);
    assert_eq!(experiment.runs[0].variable_series[0].1, vec![0.0, 10.0, 10.0, 10.0]);
}

#[test]
fn a_document_round_trips_through_a_file_on_disk() {
    let doc = ModelDocument::new(sample_model());
    let xml = write_document(&doc).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(xml.as_bytes()).unwrap();
    file.flush().unwrap();

    let mut saved = String::new();
    std::fs::File::open(file.path()).unwrap().read_to_string(&mut saved).unwrap();
    let parsed = read_document(&saved).unwrap();

    assert_eq!(parsed.model.processes.len(), doc.model.processes.len());
    assert_eq!(parsed.model.experiments.len(), 1);
}

#[test]
fn an_empty_document_round_trips() {
    let doc = ModelDocument::new(Model::new());
    let xml = write_document(&doc).unwrap();
    let parsed = read_document(&xml).unwrap();
    assert_eq!(parsed.default_scale_unit, linnyr_model::BASE_UNIT);
    assert_eq!(parsed.model.processes.len(), 0);
}
