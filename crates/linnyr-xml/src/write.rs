//! Serializes a [`ModelDocument`] into its XML document shape: one
//! `<model>` root, a fixed-order run of scalar children, then one
//! container element per entity kind.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use linnyr_model::{BoundType, Cluster, ClusterId, LinkMultiplier, Model, NodeRef};

use crate::error::XmlError;
use crate::rawdata;
use crate::ModelDocument;

type W = Writer<Vec<u8>>;

pub fn write_document(doc: &ModelDocument) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("model");
    root.push_attribute(("next-process-number", doc.model.next_process_number().to_string().as_str()));
    root.push_attribute(("next-product-number", doc.model.next_product_number().to_string().as_str()));
    root.push_attribute(("current-timestep", doc.current_timestep.to_string().as_str()));
    root.push_attribute(("zoom", doc.zoom.to_string().as_str()));
    root.push_attribute(("rounds", doc.rounds.to_string().as_str()));
    root.push_attribute(("encrypt", bool_attr(doc.encrypt)));
    root.push_attribute(("decimal-comma", bool_attr(doc.decimal_comma)));
    root.push_attribute(("align-to-grid", bool_attr(doc.align_to_grid)));
    root.push_attribute(("cost-prices", bool_attr(doc.cost_prices)));
    root.push_attribute(("report-results", bool_attr(doc.report_results)));
    root.push_attribute(("block-arrows", bool_attr(doc.block_arrows)));
    writer.write_event(Event::Start(root))?;

    text_element(&mut writer, "name", &doc.name)?;
    text_element(&mut writer, "author", &doc.author)?;
    text_element(&mut writer, "notes", &doc.notes)?;
    text_element(&mut writer, "version", &doc.version)?;
    text_element(&mut writer, "last-saved", &doc.last_saved)?;
    text_element(&mut writer, "time-scale", &doc.time_scale.to_string())?;
    text_element(&mut writer, "time-unit", &doc.time_unit)?;
    text_element(&mut writer, "default-scale-unit", &doc.default_scale_unit)?;
    text_element(&mut writer, "currency-unit", &doc.currency_unit)?;
    text_element(&mut writer, "grid-pixels", &doc.grid_pixels.to_string())?;
    text_element(&mut writer, "timeout-period", &doc.timeout_period.to_string())?;
    text_element(&mut writer, "block-length", &doc.block_length.to_string())?;
    text_element(&mut writer, "start-period", &doc.start_period.to_string())?;
    text_element(&mut writer, "end-period", &doc.end_period.to_string())?;
    text_element(&mut writer, "look-ahead-period", &doc.look_ahead_period.to_string())?;
    text_element(&mut writer, "round-sequence", &doc.round_sequence)?;

    write_scale_units(&mut writer, &doc.model)?;
    write_actors(&mut writer, &doc.model)?;
    write_processes(&mut writer, &doc.model)?;
    write_products(&mut writer, &doc.model)?;
    write_links(&mut writer, &doc.model)?;
    write_constraints(&mut writer, &doc.model)?;
    write_clusters(&mut writer, &doc.model)?;
    write_datasets(&mut writer, &doc.model, doc.dataset_precision)?;
    write_charts(&mut writer, &doc.model)?;

    raw_passthrough(&mut writer, "base-case-selectors", &doc.base_case_selectors)?;
    write_experiments(&mut writer, &doc.model, doc.results_precision)?;
    raw_passthrough(&mut writer, "sensitivity-parameters", &doc.sensitivity_parameters)?;
    raw_passthrough(&mut writer, "sensitivity-outcomes", &doc.sensitivity_outcomes)?;
    raw_passthrough(&mut writer, "sensitivity-delta", &doc.sensitivity_delta)?;
    raw_passthrough(&mut writer, "sensitivity-runs", &doc.sensitivity_runs)?;
    raw_passthrough(&mut writer, "imports", &doc.imports)?;
    raw_passthrough(&mut writer, "exports", &doc.exports)?;

    writer.write_event(Event::End(BytesEnd::new("model")))?;
    let bytes = writer.into_inner();
    Ok(String::from_utf8(bytes).expect("quick-xml writer always emits valid UTF-8"))
}

fn bool_attr(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn text_element(writer: &mut W, name: &str, text: &str) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    if !text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Writes pre-formed XML content verbatim inside `<name>…</name>`, for the
/// elements this crate treats as an opaque passthrough blob.
fn raw_passthrough(writer: &mut W, name: &str, inner_xml: &str) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    if !inner_xml.is_empty() {
        writer.get_mut().extend_from_slice(inner_xml.as_bytes());
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_scale_units(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("scaleunits")))?;
    for (name, scalar, base) in model.units.iter() {
        let mut el = BytesStart::new("scaleunit");
        el.push_attribute(("name", name));
        el.push_attribute(("scalar", scalar.to_string().as_str()));
        el.push_attribute(("base", base));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("scaleunits")))?;
    Ok(())
}

fn write_actors(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("actors")))?;
    for id in model.actors.creation_order() {
        let actor = model.actors.get(id).unwrap();
        let mut el = BytesStart::new("actor");
        el.push_attribute(("id", actor.id.as_str()));
        el.push_attribute(("name", actor.name.as_str()));
        el.push_attribute(("weight", actor.weight.source.as_str()));
        el.push_attribute(("round-flags", actor.round_flags.to_string().as_str()));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("actors")))?;
    Ok(())
}

fn write_processes(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("processes")))?;
    for id in model.processes.creation_order() {
        let p = model.processes.get(id).unwrap();
        let actor_id = model.actors.get(p.actor).map(|a| a.id.as_str()).unwrap_or_default();
        let cluster_id = model.clusters.get(p.cluster).map(|c| c.id.as_str()).unwrap_or_default();
        let mut el = BytesStart::new("process");
        el.push_attribute(("id", p.id.as_str()));
        el.push_attribute(("code", p.code.as_str()));
        el.push_attribute(("name", p.name.as_str()));
        el.push_attribute(("actor", actor_id));
        el.push_attribute(("cluster", cluster_id));
        el.push_attribute(("lower-bound", p.lower_bound.source.as_str()));
        el.push_attribute(("upper-bound", p.upper_bound.source.as_str()));
        el.push_attribute(("equal-bounds", bool_attr(p.equal_bounds)));
        el.push_attribute(("initial-level", p.initial_level.source.as_str()));
        el.push_attribute(("pace", p.pace.to_string().as_str()));
        el.push_attribute(("integer-level", bool_attr(p.integer_level)));
        el.push_attribute(("semi-continuous", bool_attr(p.semi_continuous)));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("processes")))?;
    Ok(())
}

fn write_products(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("products")))?;
    for id in model.products.creation_order() {
        let q = model.products.get(id).unwrap();
        let mut el = BytesStart::new("product");
        el.push_attribute(("id", q.id.as_str()));
        el.push_attribute(("code", q.code.as_str()));
        el.push_attribute(("name", q.name.as_str()));
        el.push_attribute(("scale-unit", q.scale_unit.as_str()));
        el.push_attribute(("lower-bound", q.lower_bound.source.as_str()));
        el.push_attribute(("upper-bound", q.upper_bound.source.as_str()));
        el.push_attribute(("initial-level", q.initial_level.source.as_str()));
        el.push_attribute(("price", q.price.source.as_str()));
        el.push_attribute(("is-source", bool_attr(q.is_source)));
        el.push_attribute(("is-sink", bool_attr(q.is_sink)));
        el.push_attribute(("is-buffer", bool_attr(q.is_buffer)));
        el.push_attribute(("is-data", bool_attr(q.is_data)));
        el.push_attribute(("no-slack", bool_attr(q.no_slack)));
        el.push_attribute(("no-links", bool_attr(q.no_links)));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("products")))?;
    Ok(())
}

fn node_ref_id(model: &Model, node: NodeRef) -> String {
    match node {
        NodeRef::Process(id) => model.processes.get(id).map(|p| p.id.clone()).unwrap_or_default(),
        NodeRef::Product(id) => model.products.get(id).map(|p| p.id.clone()).unwrap_or_default(),
    }
}

fn multiplier_code(multiplier: LinkMultiplier) -> &'static str {
    match multiplier {
        LinkMultiplier::Positive => "P",
        LinkMultiplier::Zero => "Z",
        LinkMultiplier::StartUp => "SU",
        LinkMultiplier::ShutDown => "SD",
        LinkMultiplier::FirstCommit => "FC",
        LinkMultiplier::SpinningReserve => "SR",
        LinkMultiplier::PeakIncrease => "PI",
    }
}

fn write_links(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("links")))?;
    for id in model.links.creation_order() {
        let link = model.links.get(id).unwrap();
        let mut el = BytesStart::new("link");
        el.push_attribute(("id", link.id.as_str()));
        let from = node_ref_id(model, link.from);
        let to = node_ref_id(model, link.to);
        el.push_attribute(("from", from.as_str()));
        el.push_attribute(("to", to.as_str()));
        el.push_attribute(("relative-rate", link.relative_rate.source.as_str()));
        el.push_attribute(("flow-delay", link.flow_delay.source.as_str()));
        el.push_attribute(("multiplier", multiplier_code(link.multiplier)));
        el.push_attribute(("share-of-cost", link.share_of_cost.to_string().as_str()));
        el.push_attribute(("is-feedback", bool_attr(link.is_feedback)));
        writer.write_event(Event::Empty(el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("links")))?;
    Ok(())
}

fn bound_type_code(bound_type: BoundType) -> &'static str {
    match bound_type {
        BoundType::Le => "LE",
        BoundType::Eq => "EQ",
        BoundType::Ge => "GE",
    }
}

fn write_constraints(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("constraints")))?;
    for id in model.constraints.creation_order() {
        let c = model.constraints.get(id).unwrap();
        let mut el = BytesStart::new("constraint");
        el.push_attribute(("id", c.id.as_str()));
        let from = node_ref_id(model, c.from);
        let to = node_ref_id(model, c.to);
        el.push_attribute(("from", from.as_str()));
        el.push_attribute(("to", to.as_str()));
        el.push_attribute(("no-slack", bool_attr(c.no_slack)));
        el.push_attribute(("share-of-cost", c.share_of_cost.to_string().as_str()));
        el.push_attribute((
            "soc-direction",
            match c.soc_direction {
                linnyr_model::CostShareDirection::FromToTo => "from-to-to",
                linnyr_model::CostShareDirection::ToToFrom => "to-to-from",
            },
        ));
        writer.write_event(Event::Start(el))?;
        for line in &c.bound_lines {
            let mut line_el = BytesStart::new("bound-line");
            line_el.push_attribute(("type", bound_type_code(line.bound_type)));
            let points = line
                .points
                .iter()
                .map(|(x, y)| format!("{x},{y}"))
                .collect::<Vec<_>>()
                .join(";");
            line_el.push_attribute(("points", points.as_str()));
            line_el.push_attribute(("selectors", line.selectors.join(" ").as_str()));
            writer.write_event(Event::Empty(line_el))?;
        }
        writer.write_event(Event::End(BytesEnd::new("constraint")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("constraints")))?;
    Ok(())
}

fn write_clusters(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("clusters")))?;
    write_cluster(writer, model, model.top_cluster)?;
    writer.write_event(Event::End(BytesEnd::new("clusters")))?;
    Ok(())
}

fn write_cluster(writer: &mut W, model: &Model, id: ClusterId) -> Result<(), XmlError> {
    let cluster: &Cluster = model.clusters.get(id).unwrap();
    let actor_id = model.actors.get(cluster.actor).map(|a| a.id.as_str()).unwrap_or_default();
    let mut el = BytesStart::new("cluster");
    el.push_attribute(("id", cluster.id.as_str()));
    el.push_attribute(("name", cluster.name.as_str()));
    el.push_attribute(("actor", actor_id));
    el.push_attribute(("ignore", bool_attr(cluster.ignore)));
    el.push_attribute(("black-box", bool_attr(cluster.black_box)));
    writer.write_event(Event::Start(el))?;

    if !cluster.notes.is_empty() {
        text_element(writer, "notes", &cluster.notes)?;
    }
    for &pid in &cluster.child_processes {
        if let Some(process) = model.processes.get(pid) {
            let mut pel = BytesStart::new("process-ref");
            pel.push_attribute(("id", process.id.as_str()));
            writer.write_event(Event::Empty(pel))?;
        }
    }
    for position in &cluster.product_positions {
        if let Some(product) = model.products.get(position.product) {
            let mut qel = BytesStart::new("product-position");
            qel.push_attribute(("id", product.id.as_str()));
            qel.push_attribute(("x", position.x.to_string().as_str()));
            qel.push_attribute(("y", position.y.to_string().as_str()));
            writer.write_event(Event::Empty(qel))?;
        }
    }
    for &child in &cluster.child_clusters {
        write_cluster(writer, model, child)?;
    }

    writer.write_event(Event::End(BytesEnd::new("cluster")))?;
    Ok(())
}

fn write_datasets(writer: &mut W, model: &Model, precision: u32) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("datasets")))?;
    for id in model.datasets.creation_order() {
        let d = model.datasets.get(id).unwrap();
        let mut el = BytesStart::new("dataset");
        el.push_attribute(("id", d.id.as_str()));
        el.push_attribute(("name", d.name.as_str()));
        el.push_attribute(("default-value", d.default_value.to_string().as_str()));
        el.push_attribute(("scale-unit", d.scale_unit.as_str()));
        el.push_attribute(("time-scale", d.time_scale.to_string().as_str()));
        el.push_attribute(("time-unit", d.time_unit.as_str()));
        el.push_attribute((
            "interpolation",
            match d.interpolation {
                linnyr_model::InterpolationMethod::Nearest => "nearest",
                linnyr_model::InterpolationMethod::WeightedMean => "weighted-mean",
                linnyr_model::InterpolationMethod::WeightedSum => "weighted-sum",
                linnyr_model::InterpolationMethod::Max => "max",
            },
        ));
        el.push_attribute(("periodic", bool_attr(d.periodic)));
        el.push_attribute(("array", bool_attr(d.array)));
        writer.write_event(Event::Start(el))?;
        text_element(writer, "raw-data", &rawdata::encode(&d.raw_data, precision))?;
        for modifier in &d.modifiers {
            let mut mel = BytesStart::new("modifier");
            mel.push_attribute(("selector", modifier.selector.as_str()));
            mel.push_attribute(("expression", modifier.expression.source.as_str()));
            writer.write_event(Event::Empty(mel))?;
        }
        writer.write_event(Event::End(BytesEnd::new("dataset")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("datasets")))?;
    Ok(())
}

fn write_charts(writer: &mut W, model: &Model) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("charts")))?;
    for id in model.charts.creation_order() {
        let chart = model.charts.get(id).unwrap();
        let mut el = BytesStart::new("chart");
        el.push_attribute(("title", chart.title.as_str()));
        el.push_attribute(("bins", chart.bins.to_string().as_str()));
        el.push_attribute(("histogram", bool_attr(chart.histogram)));
        writer.write_event(Event::Start(el))?;
        for variable in &chart.variables {
            let mut vel = BytesStart::new("variable");
            vel.push_attribute(("object", variable.object.as_str()));
            vel.push_attribute(("attribute", variable.attribute.as_deref().unwrap_or("")));
            vel.push_attribute(("color", variable.color.as_str()));
            vel.push_attribute(("scale-factor", variable.scale_factor.to_string().as_str()));
            vel.push_attribute(("line-width", variable.line_width.to_string().as_str()));
            vel.push_attribute(("stacked", bool_attr(variable.stacked)));
            vel.push_attribute(("sorted", bool_attr(variable.sorted)));
            vel.push_attribute(("visible", bool_attr(variable.visible)));
            if let Some(index) = variable.wildcard_index {
                vel.push_attribute(("wildcard-index", index.to_string().as_str()));
            }
            writer.write_event(Event::Empty(vel))?;
        }
        writer.write_event(Event::End(BytesEnd::new("chart")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("charts")))?;
    Ok(())
}

fn write_experiments(writer: &mut W, model: &Model, precision: u32) -> Result<(), XmlError> {
    writer.write_event(Event::Start(BytesStart::new("experiments")))?;
    for id in model.experiments.creation_order() {
        let experiment = model.experiments.get(id).unwrap();
        let mut el = BytesStart::new("experiment");
        el.push_attribute(("title", experiment.title.as_str()));
        writer.write_event(Event::Start(el))?;

        writer.write_event(Event::Start(BytesStart::new("dimensions")))?;
        for dimension in &experiment.dimensions {
            text_element(writer, "dimension", &dimension.join(" "))?;
        }
        writer.write_event(Event::End(BytesEnd::new("dimensions")))?;

        writer.write_event(Event::Start(BytesStart::new("charts")))?;
        for &chart_id in &experiment.charts {
            if let Some(chart) = model.charts.get(chart_id) {
                let mut cel = BytesStart::new("chart-ref");
                cel.push_attribute(("title", chart.title.as_str()));
                writer.write_event(Event::Empty(cel))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("charts")))?;

        text_element(writer, "settings-selectors", &experiment.settings_selectors.join(" "))?;
        text_element(writer, "actor-selectors", &experiment.actor_selectors.join(" "))?;
        text_element(writer, "combination-selectors", &experiment.combination_selectors.join(";"))?;
        text_element(writer, "excluded-selectors", &experiment.excluded_selectors.join(" "))?;
        text_element(writer, "clusters-to-ignore", &experiment.clusters_to_ignore.join(" "))?;

        writer.write_event(Event::Start(BytesStart::new("runs")))?;
        for run in &experiment.runs {
            let mut rel = BytesStart::new("run");
            rel.push_attribute(("number", run.number.to_string().as_str()));
            rel.push_attribute(("wall-clock-start", run.wall_clock_start.to_string().as_str()));
            rel.push_attribute(("wall-clock-recorded", run.wall_clock_recorded.to_string().as_str()));
            rel.push_attribute(("time-step-count", run.time_step_count.to_string().as_str()));
            rel.push_attribute(("duration", run.duration.to_string().as_str()));
            writer.write_event(Event::Start(rel))?;
            for (name, stats) in &run.variable_stats {
                let mut sel = BytesStart::new("stats");
                sel.push_attribute(("variable", name.as_str()));
                sel.push_attribute(("n", stats.n.to_string().as_str()));
                sel.push_attribute(("sum", stats.sum.to_string().as_str()));
                sel.push_attribute(("mean", stats.mean.to_string().as_str()));
                sel.push_attribute(("variance", stats.variance.to_string().as_str()));
                sel.push_attribute(("min", stats.min.to_string().as_str()));
                sel.push_attribute(("max", stats.max.to_string().as_str()));
                sel.push_attribute(("non-zero-tally", stats.non_zero_tally.to_string().as_str()));
                sel.push_attribute(("exceptions", stats.exceptions.to_string().as_str()));
                sel.push_attribute(("last", stats.last.to_string().as_str()));
                writer.write_event(Event::Empty(sel))?;
            }
            for (name, series) in &run.variable_series {
                let mut vel = BytesStart::new("series");
                vel.push_attribute(("variable", name.as_str()));
                writer.write_event(Event::Start(vel))?;
                writer.write_event(Event::Text(BytesText::new(&linnyr_experiment::rle::encode(series, precision))))?;
                writer.write_event(Event::End(BytesEnd::new("series")))?;
            }
            for (block, message) in &run.solver_messages {
                let mut mel = BytesStart::new("message");
                mel.push_attribute(("block", block.to_string().as_str()));
                writer.write_event(Event::Start(mel))?;
                writer.write_event(Event::Text(BytesText::new(message)))?;
                writer.write_event(Event::End(BytesEnd::new("message")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("run")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("runs")))?;

        writer.write_event(Event::End(BytesEnd::new("experiment")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("experiments")))?;
    Ok(())
}
