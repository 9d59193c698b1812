//! Parses the XML shape [`crate::write::write_document`] emits back into a
//! [`ModelDocument`]. Mirrors `write.rs` element-for-element; a document this
//! crate didn't produce itself is accepted as long as it matches the same
//! shape.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use linnyr_model::{
    BoundLine, BoundType, ChartId, ChartVariable, ClusterId, CostShareDirection,
    Dataset, DatasetModifier, Expr, InterpolationMethod, LinkMultiplier, Model, NodeRef,
    ProcessId, VariableStats,
};

use crate::error::XmlError;
use crate::rawdata;
use crate::ModelDocument;

type R<'a> = Reader<&'a [u8]>;

pub fn read_document(xml: &str) -> Result<ModelDocument, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = ModelDocument::new(Model::new());
    let mut chart_titles: HashMap<String, ChartId> = HashMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"model" => {
                read_root_attributes(&mut doc, &e)?;
                read_model_body(&mut reader, xml, &mut doc, &mut chart_titles)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(doc)
}

fn attr(e: &BytesStart, name: &str) -> Result<Option<String>, XmlError> {
    for a in e.attributes() {
        let a = a?;
        if a.key.as_ref() == name.as_bytes() {
            let value_str = std::str::from_utf8(&a.value)?;
            return Ok(Some(quick_xml::escape::unescape(value_str)?.into_owned()));
        }
    }
    Ok(None)
}

fn req_attr(e: &BytesStart, element: &'static str, name: &'static str) -> Result<String, XmlError> {
    attr(e, name)?.ok_or(XmlError::MissingAttribute { element, attribute: name })
}

fn parse_num<T: std::str::FromStr>(
    element: &'static str,
    attribute: &'static str,
    expected: &'static str,
    value: &str,
) -> Result<T, XmlError> {
    value.parse().map_err(|_| XmlError::InvalidAttribute {
        element,
        attribute,
        expected,
        value: value.to_string(),
    })
}

fn bool_val(value: &str) -> bool {
    value == "true"
}

/// Reads text content up to the element's matching close tag. Only valid
/// right after consuming a `Start` event for a leaf element — none of the
/// elements this is used for nest a same-named child.
fn read_text(reader: &mut R) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&quick_xml::escape::unescape(std::str::from_utf8(&t)?)?),
            Event::CData(t) => text.push_str(std::str::from_utf8(&t.into_inner())?),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Captures the exact source bytes between a container's open and close tag,
/// for elements outside this crate's modeled scope. Tracks nesting depth so
/// a passthrough blob may itself contain same-named children.
fn read_raw_passthrough(reader: &mut R, xml: &str) -> Result<String, XmlError> {
    let start = reader.buffer_position() as usize;
    let mut depth = 0i32;
    loop {
        let pos_before = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(xml[start..pos_before].to_string());
                }
                depth -= 1;
            }
            Event::Eof => return Ok(xml[start..pos_before].to_string()),
            _ => {}
        }
    }
}

fn read_root_attributes(doc: &mut ModelDocument, e: &BytesStart) -> Result<(), XmlError> {
    if let Some(v) = attr(e, "current-timestep")? {
        doc.current_timestep = parse_num("model", "current-timestep", "integer", &v)?;
    }
    if let Some(v) = attr(e, "zoom")? {
        doc.zoom = parse_num("model", "zoom", "number", &v)?;
    }
    if let Some(v) = attr(e, "rounds")? {
        doc.rounds = parse_num("model", "rounds", "integer", &v)?;
    }
    if let Some(v) = attr(e, "encrypt")? {
        doc.encrypt = bool_val(&v);
    }
    if let Some(v) = attr(e, "decimal-comma")? {
        doc.decimal_comma = bool_val(&v);
    }
    if let Some(v) = attr(e, "align-to-grid")? {
        doc.align_to_grid = bool_val(&v);
    }
    if let Some(v) = attr(e, "cost-prices")? {
        doc.cost_prices = bool_val(&v);
    }
    if let Some(v) = attr(e, "report-results")? {
        doc.report_results = bool_val(&v);
    }
    if let Some(v) = attr(e, "block-arrows")? {
        doc.block_arrows = bool_val(&v);
    }
    // `next-process-number`/`next-product-number` are not restored directly:
    // re-adding processes and products in document order reproduces the
    // same counters on its own.
    Ok(())
}

fn read_model_body(
    reader: &mut R,
    xml: &str,
    doc: &mut ModelDocument,
    chart_titles: &mut HashMap<String, ChartId>,
) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"model" => return Ok(()),
            Event::Eof => return Ok(()),
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"name" => doc.name = read_text(reader)?,
                    b"author" => doc.author = read_text(reader)?,
                    b"notes" => doc.notes = read_text(reader)?,
                    b"version" => doc.version = read_text(reader)?,
                    b"last-saved" => doc.last_saved = read_text(reader)?,
                    b"time-scale" => {
                        let t = read_text(reader)?;
                        doc.time_scale = parse_num("time-scale", "text", "number", &t)?;
                    }
                    b"time-unit" => doc.time_unit = read_text(reader)?,
                    b"default-scale-unit" => doc.default_scale_unit = read_text(reader)?,
                    b"currency-unit" => doc.currency_unit = read_text(reader)?,
                    b"grid-pixels" => {
                        let t = read_text(reader)?;
                        doc.grid_pixels = parse_num("grid-pixels", "text", "integer", &t)?;
                    }
                    b"timeout-period" => {
                        let t = read_text(reader)?;
                        doc.timeout_period = parse_num("timeout-period", "text", "number", &t)?;
                    }
                    b"block-length" => {
                        let t = read_text(reader)?;
                        doc.block_length = parse_num("block-length", "text", "integer", &t)?;
                    }
                    b"start-period" => {
                        let t = read_text(reader)?;
                        doc.start_period = parse_num("start-period", "text", "integer", &t)?;
                    }
                    b"end-period" => {
                        let t = read_text(reader)?;
                        doc.end_period = parse_num("end-period", "text", "integer", &t)?;
                    }
                    b"look-ahead-period" => {
                        let t = read_text(reader)?;
                        doc.look_ahead_period = parse_num("look-ahead-period", "text", "integer", &t)?;
                    }
                    b"round-sequence" => doc.round_sequence = read_text(reader)?,
                    b"scaleunits" => read_scale_units(reader, &mut doc.model)?,
                    b"actors" => read_actors(reader, &mut doc.model)?,
                    b"processes" => read_processes(reader, &mut doc.model)?,
                    b"products" => read_products(reader, &mut doc.model)?,
                    b"links" => read_links(reader, &mut doc.model)?,
                    b"constraints" => read_constraints(reader, &mut doc.model)?,
                    b"clusters" => read_clusters(reader, &mut doc.model)?,
                    b"datasets" => read_datasets(reader, &mut doc.model)?,
                    b"charts" => read_charts(reader, &mut doc.model, chart_titles)?,
                    b"base-case-selectors" => {
                        doc.base_case_selectors = read_raw_passthrough(reader, xml)?;
                    }
                    b"experiments" => read_experiments(reader, &mut doc.model, chart_titles)?,
                    b"sensitivity-parameters" => {
                        doc.sensitivity_parameters = read_raw_passthrough(reader, xml)?;
                    }
                    b"sensitivity-outcomes" => {
                        doc.sensitivity_outcomes = read_raw_passthrough(reader, xml)?;
                    }
                    b"sensitivity-delta" => {
                        doc.sensitivity_delta = read_raw_passthrough(reader, xml)?;
                    }
                    b"sensitivity-runs" => {
                        doc.sensitivity_runs = read_raw_passthrough(reader, xml)?;
                    }
                    b"imports" => doc.imports = read_raw_passthrough(reader, xml)?,
                    b"exports" => doc.exports = read_raw_passthrough(reader, xml)?,
                    _ => skip_element(reader)?,
                }
            }
            Event::Empty(e) => {
                // An empty passthrough container (e.g. `<imports/>`) carries
                // no text and needs no special handling beyond leaving its
                // target field at the empty-string default.
                let _ = e;
            }
            _ => {}
        }
    }
}

/// Consumes events until the matching `End` for the element whose `Start`
/// was just read, ignoring everything in between. Used for entity kinds not
/// in this crate's modeled scope that still need to be skipped cleanly.
fn skip_element(reader: &mut R) -> Result<(), XmlError> {
    let mut depth = 0i32;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_scale_units(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"scaleunits" => return Ok(()),
            Event::Empty(e) if e.name().as_ref() == b"scaleunit" => {
                let name = req_attr(&e, "scaleunit", "name")?;
                let scalar_s = req_attr(&e, "scaleunit", "scalar")?;
                let scalar = parse_num("scaleunit", "scalar", "number", &scalar_s)?;
                let base = req_attr(&e, "scaleunit", "base")?;
                if !model.units.contains(&name) {
                    model.units.add(&name, scalar, &base).map_err(XmlError::Model)?;
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_actors(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"actors" => return Ok(()),
            Event::Empty(e) if e.name().as_ref() == b"actor" => {
                let name = req_attr(&e, "actor", "name")?;
                let id = model.add_actor(&name).map_err(|d| XmlError::Model(d.to_string()))?;
                if let Some(weight_s) = attr(&e, "weight")? {
                    let round_flags_s = attr(&e, "round-flags")?.unwrap_or_else(|| "0".to_string());
                    let round_flags = parse_num("actor", "round-flags", "integer", &round_flags_s)?;
                    let actor = model.actors.get_mut(id).expect("just inserted");
                    actor.weight = Expr::new("weight", weight_s);
                    actor.round_flags = round_flags;
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_processes(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"processes" => return Ok(()),
            Event::Empty(e) if e.name().as_ref() == b"process" => {
                let name = req_attr(&e, "process", "name")?;
                // The owning cluster is fixed up once `<clusters>` names the
                // `<process-ref>` that actually claims this process.
                let top = model.top_cluster;
                let id = model
                    .add_process(&name, top)
                    .map_err(|d| XmlError::Model(d.to_string()))?;
                let process = model.processes.get_mut(id).expect("just inserted");
                if let Some(v) = attr(&e, "lower-bound")? {
                    process.lower_bound = Expr::new("lb", v);
                }
                if let Some(v) = attr(&e, "upper-bound")? {
                    process.upper_bound = Expr::new("ub", v);
                }
                if let Some(v) = attr(&e, "equal-bounds")? {
                    process.equal_bounds = bool_val(&v);
                }
                if let Some(v) = attr(&e, "initial-level")? {
                    process.initial_level = Expr::new("il", v);
                }
                if let Some(v) = attr(&e, "pace")? {
                    process.pace = parse_num("process", "pace", "integer", &v)?;
                }
                if let Some(v) = attr(&e, "integer-level")? {
                    process.integer_level = bool_val(&v);
                }
                if let Some(v) = attr(&e, "semi-continuous")? {
                    process.semi_continuous = bool_val(&v);
                }
                if let Some(actor_id) = attr(&e, "actor")? {
                    if !actor_id.is_empty() {
                        if let Some(aid) = model.lookup_actor(&actor_id) {
                            model.processes.get_mut(id).expect("just inserted").actor = aid;
                        }
                    }
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_products(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"products" => return Ok(()),
            Event::Empty(e) if e.name().as_ref() == b"product" => {
                let name = req_attr(&e, "product", "name")?;
                let id = model.add_product(&name).map_err(|d| XmlError::Model(d.to_string()))?;
                let product = model.products.get_mut(id).expect("just inserted");
                if let Some(v) = attr(&e, "scale-unit")? {
                    product.scale_unit = v;
                }
                if let Some(v) = attr(&e, "lower-bound")? {
                    product.lower_bound = Expr::new("lb", v);
                }
                if let Some(v) = attr(&e, "upper-bound")? {
                    product.upper_bound = Expr::new("ub", v);
                }
                if let Some(v) = attr(&e, "initial-level")? {
                    product.initial_level = Expr::new("il", v);
                }
                if let Some(v) = attr(&e, "price")? {
                    product.price = Expr::new("price", v);
                }
                if let Some(v) = attr(&e, "is-source")? {
                    product.is_source = bool_val(&v);
                }
                if let Some(v) = attr(&e, "is-sink")? {
                    product.is_sink = bool_val(&v);
                }
                if let Some(v) = attr(&e, "is-buffer")? {
                    product.is_buffer = bool_val(&v);
                }
                if let Some(v) = attr(&e, "is-data")? {
                    product.is_data = bool_val(&v);
                }
                if let Some(v) = attr(&e, "no-slack")? {
                    product.no_slack = bool_val(&v);
                }
                if let Some(v) = attr(&e, "no-links")? {
                    product.no_links = bool_val(&v);
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn resolve_node(model: &Model, id: &str) -> Option<NodeRef> {
    if let Some(p) = model.lookup_process(id) {
        return Some(NodeRef::Process(p));
    }
    model.lookup_product(id).map(NodeRef::Product)
}

fn parse_multiplier(code: &str) -> LinkMultiplier {
    match code {
        "Z" => LinkMultiplier::Zero,
        "SU" => LinkMultiplier::StartUp,
        "SD" => LinkMultiplier::ShutDown,
        "FC" => LinkMultiplier::FirstCommit,
        "SR" => LinkMultiplier::SpinningReserve,
        "PI" => LinkMultiplier::PeakIncrease,
        _ => LinkMultiplier::Positive,
    }
}

fn read_links(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"links" => return Ok(()),
            Event::Empty(e) if e.name().as_ref() == b"link" => {
                let from_id = req_attr(&e, "link", "from")?;
                let to_id = req_attr(&e, "link", "to")?;
                let from = resolve_node(model, &from_id)
                    .ok_or_else(|| XmlError::UnresolvedReference { element: "link", id: from_id.clone() })?;
                let to = resolve_node(model, &to_id)
                    .ok_or_else(|| XmlError::UnresolvedReference { element: "link", id: to_id.clone() })?;
                let rate = attr(&e, "relative-rate")?.unwrap_or_else(|| "1".to_string());
                let id = model
                    .add_link(from, to, Expr::new("relative-rate", rate))
                    .map_err(|d| XmlError::Model(d.to_string()))?;
                let link = model.links.get_mut(id).expect("just inserted");
                if let Some(v) = attr(&e, "flow-delay")? {
                    link.flow_delay = Expr::new("delay", v);
                }
                if let Some(v) = attr(&e, "multiplier")? {
                    link.multiplier = parse_multiplier(&v);
                }
                if let Some(v) = attr(&e, "share-of-cost")? {
                    link.share_of_cost = parse_num("link", "share-of-cost", "number", &v)?;
                }
                if let Some(v) = attr(&e, "is-feedback")? {
                    link.is_feedback = bool_val(&v);
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn parse_bound_type(code: &str) -> BoundType {
    match code {
        "EQ" => BoundType::Eq,
        "GE" => BoundType::Ge,
        _ => BoundType::Le,
    }
}

fn parse_points(text: &str) -> Vec<(f64, f64)> {
    text.split(';')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let (x, y) = pair.split_once(',')?;
            Some((x.parse().ok()?, y.parse().ok()?))
        })
        .collect()
}

fn read_constraints(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"constraints" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"constraint" => {
                let from_id = req_attr(&e, "constraint", "from")?;
                let to_id = req_attr(&e, "constraint", "to")?;
                let no_slack = attr(&e, "no-slack")?.map(|v| bool_val(&v)).unwrap_or(false);
                let share_of_cost = match attr(&e, "share-of-cost")? {
                    Some(v) => parse_num("constraint", "share-of-cost", "number", &v)?,
                    None => 0.0,
                };
                let soc_direction = match attr(&e, "soc-direction")?.as_deref() {
                    Some("to-to-from") => CostShareDirection::ToToFrom,
                    _ => CostShareDirection::FromToTo,
                };

                let mut bound_lines = Vec::new();
                loop {
                    match reader.read_event()? {
                        Event::End(e2) if e2.name().as_ref() == b"constraint" => break,
                        Event::Empty(e2) if e2.name().as_ref() == b"bound-line" => {
                            let bound_type = attr(&e2, "type")?
                                .map(|v| parse_bound_type(&v))
                                .unwrap_or(BoundType::Le);
                            let points = attr(&e2, "points")?
                                .map(|v| parse_points(&v))
                                .unwrap_or_default();
                            let selectors = attr(&e2, "selectors")?
                                .map(|v| v.split(' ').filter(|s| !s.is_empty()).map(str::to_string).collect())
                                .unwrap_or_default();
                            bound_lines.push(BoundLine { bound_type, points, selectors });
                        }
                        Event::Eof => break,
                        _ => {}
                    }
                }

                let from = resolve_node(model, &from_id)
                    .ok_or_else(|| XmlError::UnresolvedReference { element: "constraint", id: from_id.clone() })?;
                let to = resolve_node(model, &to_id)
                    .ok_or_else(|| XmlError::UnresolvedReference { element: "constraint", id: to_id.clone() })?;
                let id = model
                    .add_constraint(from, to, bound_lines)
                    .map_err(|d| XmlError::Model(d.to_string()))?;
                let constraint = model.constraints.get_mut(id).expect("just inserted");
                constraint.no_slack = no_slack;
                constraint.share_of_cost = share_of_cost;
                constraint.soc_direction = soc_direction;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn move_process_to_cluster(model: &mut Model, pid: ProcessId, cluster: ClusterId) {
    let Some(process) = model.processes.get(pid) else { return };
    let old_cluster = process.cluster;
    if old_cluster == cluster {
        return;
    }
    if let Some(old) = model.clusters.get_mut(old_cluster) {
        old.child_processes.retain(|&p| p != pid);
    }
    model.processes.get_mut(pid).expect("checked above").cluster = cluster;
    if let Some(new) = model.clusters.get_mut(cluster) {
        new.child_processes.push(pid);
    }
}

fn read_clusters(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"clusters" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"cluster" => {
                // The first `<cluster>` inside `<clusters>` describes the
                // model's own top cluster rather than a newly created one.
                let top = model.top_cluster;
                read_cluster(reader, model, top, &e)?;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_cluster(reader: &mut R, model: &mut Model, id: ClusterId, start: &BytesStart) -> Result<(), XmlError> {
    if let Some(name) = attr(start, "name")? {
        model.clusters.get_mut(id).expect("valid cluster").name = name;
    }
    if let Some(actor_id) = attr(start, "actor")? {
        if !actor_id.is_empty() {
            if let Some(aid) = model.lookup_actor(&actor_id) {
                model.clusters.get_mut(id).expect("valid cluster").actor = aid;
            }
        }
    }
    if let Some(v) = attr(start, "ignore")? {
        model.clusters.get_mut(id).expect("valid cluster").ignore = bool_val(&v);
    }
    if let Some(v) = attr(start, "black-box")? {
        model.clusters.get_mut(id).expect("valid cluster").black_box = bool_val(&v);
    }

    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"cluster" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"notes" => {
                let notes = read_text(reader)?;
                model.clusters.get_mut(id).expect("valid cluster").notes = notes;
            }
            Event::Empty(e) if e.name().as_ref() == b"process-ref" => {
                let pid_str = req_attr(&e, "process-ref", "id")?;
                if let Some(pid) = model.lookup_process(&pid_str) {
                    move_process_to_cluster(model, pid, id);
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"product-position" => {
                let qid_str = req_attr(&e, "product-position", "id")?;
                let x_s = req_attr(&e, "product-position", "x")?;
                let y_s = req_attr(&e, "product-position", "y")?;
                if let Some(qid) = model.lookup_product(&qid_str) {
                    let x = parse_num("product-position", "x", "number", &x_s)?;
                    let y = parse_num("product-position", "y", "number", &y_s)?;
                    model
                        .clusters
                        .get_mut(id)
                        .expect("valid cluster")
                        .product_positions
                        .push(linnyr_model::ProductPosition { product: qid, x, y });
                }
            }
            Event::Start(e) if e.name().as_ref() == b"cluster" => {
                let name = req_attr(&e, "cluster", "name")?;
                let child = model.add_cluster(&name, id).map_err(|d| XmlError::Model(d.to_string()))?;
                read_cluster(reader, model, child, &e)?;
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn parse_interpolation(code: &str) -> InterpolationMethod {
    match code {
        "weighted-mean" => InterpolationMethod::WeightedMean,
        "weighted-sum" => InterpolationMethod::WeightedSum,
        "max" => InterpolationMethod::Max,
        _ => InterpolationMethod::Nearest,
    }
}

fn read_datasets(reader: &mut R, model: &mut Model) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"datasets" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"dataset" => {
                let name = req_attr(&e, "dataset", "name")?;
                let id = linnyr_model::ids::canonical_id(&name);
                let default_value = match attr(&e, "default-value")? {
                    Some(v) => parse_num("dataset", "default-value", "number", &v)?,
                    None => 0.0,
                };
                let scale_unit = attr(&e, "scale-unit")?.unwrap_or_else(|| linnyr_model::BASE_UNIT.to_string());
                let time_scale = match attr(&e, "time-scale")? {
                    Some(v) => parse_num("dataset", "time-scale", "number", &v)?,
                    None => 1.0,
                };
                let time_unit = attr(&e, "time-unit")?.unwrap_or_else(|| "hour".to_string());
                let interpolation = attr(&e, "interpolation")?
                    .map(|v| parse_interpolation(&v))
                    .unwrap_or(InterpolationMethod::Nearest);
                let periodic = attr(&e, "periodic")?.map(|v| bool_val(&v)).unwrap_or(false);
                let array = attr(&e, "array")?.map(|v| bool_val(&v)).unwrap_or(false);

                let mut raw_data = Vec::new();
                let mut modifiers = Vec::new();
                loop {
                    match reader.read_event()? {
                        Event::End(e2) if e2.name().as_ref() == b"dataset" => break,
                        Event::Start(e2) if e2.name().as_ref() == b"raw-data" => {
                            let text = read_text(reader)?;
                            raw_data = rawdata::decode(&text);
                        }
                        Event::Empty(e2) if e2.name().as_ref() == b"modifier" => {
                            let selector = req_attr(&e2, "modifier", "selector")?;
                            let expression = attr(&e2, "expression")?.unwrap_or_default();
                            modifiers.push(DatasetModifier {
                                selector,
                                expression: Expr::new("modifier", expression),
                            });
                        }
                        Event::Eof => break,
                        _ => {}
                    }
                }

                if !model.datasets.iter().any(|(_, d)| d.id == id) {
                    model.datasets.insert(Dataset {
                        name,
                        id,
                        default_value,
                        scale_unit,
                        time_scale,
                        time_unit,
                        interpolation,
                        periodic,
                        array,
                        raw_data,
                        modifiers,
                    });
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_charts(reader: &mut R, model: &mut Model, chart_titles: &mut HashMap<String, ChartId>) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"charts" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"chart" => {
                let title = req_attr(&e, "chart", "title")?;
                let bins = match attr(&e, "bins")? {
                    Some(v) => parse_num("chart", "bins", "integer", &v)?,
                    None => 0,
                };
                let histogram = attr(&e, "histogram")?.map(|v| bool_val(&v)).unwrap_or(false);

                let mut variables = Vec::new();
                loop {
                    match reader.read_event()? {
                        Event::End(e2) if e2.name().as_ref() == b"chart" => break,
                        Event::Empty(e2) if e2.name().as_ref() == b"variable" => {
                            let object = req_attr(&e2, "variable", "object")?;
                            let attribute = attr(&e2, "attribute")?.filter(|s| !s.is_empty());
                            let color = attr(&e2, "color")?.unwrap_or_default();
                            let scale_factor = match attr(&e2, "scale-factor")? {
                                Some(v) => parse_num("variable", "scale-factor", "number", &v)?,
                                None => 1.0,
                            };
                            let line_width = match attr(&e2, "line-width")? {
                                Some(v) => parse_num("variable", "line-width", "number", &v)?,
                                None => 1.0,
                            };
                            let stacked = attr(&e2, "stacked")?.map(|v| bool_val(&v)).unwrap_or(false);
                            let sorted = attr(&e2, "sorted")?.map(|v| bool_val(&v)).unwrap_or(false);
                            let visible = attr(&e2, "visible")?.map(|v| bool_val(&v)).unwrap_or(true);
                            let wildcard_index = match attr(&e2, "wildcard-index")? {
                                Some(v) => Some(parse_num("variable", "wildcard-index", "integer", &v)?),
                                None => None,
                            };
                            variables.push(ChartVariable {
                                object,
                                attribute,
                                color,
                                scale_factor,
                                line_width,
                                stacked,
                                sorted,
                                visible,
                                wildcard_index,
                            });
                        }
                        Event::Eof => break,
                        _ => {}
                    }
                }

                let chart_id = model.charts.insert(linnyr_model::Chart { title: title.clone(), bins, histogram, variables });
                chart_titles.insert(title, chart_id);
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_experiments(
    reader: &mut R,
    model: &mut Model,
    chart_titles: &HashMap<String, ChartId>,
) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"experiments" => return Ok(()),
            Event::Start(e) if e.name().as_ref() == b"experiment" => {
                let title = req_attr(&e, "experiment", "title")?;
                let mut dimensions = Vec::new();
                let mut charts = Vec::new();
                let mut settings_selectors = Vec::new();
                let mut actor_selectors = Vec::new();
                let mut combination_selectors = Vec::new();
                let mut excluded_selectors = Vec::new();
                let mut clusters_to_ignore = Vec::new();
                let mut runs = Vec::new();

                loop {
                    match reader.read_event()? {
                        Event::End(e2) if e2.name().as_ref() == b"experiment" => break,
                        Event::Start(e2) => match e2.name().as_ref() {
                            b"dimensions" => {
                                dimensions = read_string_list(reader, "dimensions", "dimension", ' ')?;
                            }
                            b"charts" => {
                                charts = read_chart_refs(reader, chart_titles)?;
                            }
                            b"settings-selectors" => {
                                settings_selectors = split_nonempty(&read_text(reader)?, ' ');
                            }
                            b"actor-selectors" => {
                                actor_selectors = split_nonempty(&read_text(reader)?, ' ');
                            }
                            b"combination-selectors" => {
                                combination_selectors = split_nonempty(&read_text(reader)?, ';');
                            }
                            b"excluded-selectors" => {
                                excluded_selectors = split_nonempty(&read_text(reader)?, ' ');
                            }
                            b"clusters-to-ignore" => {
                                clusters_to_ignore = split_nonempty(&read_text(reader)?, ' ');
                            }
                            b"runs" => {
                                runs = read_runs(reader)?;
                            }
                            _ => skip_element(reader)?,
                        },
                        Event::Eof => break,
                        _ => {}
                    }
                }

                model.experiments.insert(linnyr_model::Experiment {
                    title,
                    dimensions,
                    charts,
                    settings_selectors,
                    actor_selectors,
                    combination_selectors,
                    excluded_selectors,
                    clusters_to_ignore,
                    runs,
                });
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn split_nonempty(text: &str, sep: char) -> Vec<String> {
    text.split(sep).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn read_string_list(reader: &mut R, container: &'static str, leaf: &'static str, sep: char) -> Result<Vec<Vec<String>>, XmlError> {
    let mut out = Vec::new();
    let container_bytes = container.as_bytes();
    let leaf_bytes = leaf.as_bytes();
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == container_bytes => return Ok(out),
            Event::Start(e) if e.name().as_ref() == leaf_bytes => {
                out.push(split_nonempty(&read_text(reader)?, sep));
            }
            Event::Eof => return Ok(out),
            _ => {}
        }
    }
}

fn read_chart_refs(reader: &mut R, chart_titles: &HashMap<String, ChartId>) -> Result<Vec<ChartId>, XmlError> {
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"charts" => return Ok(out),
            Event::Empty(e) if e.name().as_ref() == b"chart-ref" => {
                let title = req_attr(&e, "chart-ref", "title")?;
                if let Some(&id) = chart_titles.get(&title) {
                    out.push(id);
                }
            }
            Event::Eof => return Ok(out),
            _ => {}
        }
    }
}

fn read_runs(reader: &mut R) -> Result<Vec<linnyr_model::ExperimentRun>, XmlError> {
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::End(e) if e.name().as_ref() == b"runs" => return Ok(out),
            Event::Start(e) if e.name().as_ref() == b"run" => {
                let number = parse_num("run", "number", "integer", &req_attr(&e, "run", "number")?)?;
                let wall_clock_start = parse_num("run", "wall-clock-start", "number", &req_attr(&e, "run", "wall-clock-start")?)?;
                let wall_clock_recorded =
                    parse_num("run", "wall-clock-recorded", "number", &req_attr(&e, "run", "wall-clock-recorded")?)?;
                let time_step_count = parse_num("run", "time-step-count", "integer", &req_attr(&e, "run", "time-step-count")?)?;
                let duration = parse_num("run", "duration", "number", &req_attr(&e, "run", "duration")?)?;

                let mut variable_stats = Vec::new();
                let mut variable_series = Vec::new();
                let mut solver_messages = Vec::new();
                loop {
                    match reader.read_event()? {
                        Event::End(e2) if e2.name().as_ref() == b"run" => break,
                        Event::Empty(e2) if e2.name().as_ref() == b"stats" => {
                            let name = req_attr(&e2, "stats", "variable")?;
                            let stats = VariableStats {
                                n: parse_num("stats", "n", "integer", &req_attr(&e2, "stats", "n")?)?,
                                sum: parse_num("stats", "sum", "number", &req_attr(&e2, "stats", "sum")?)?,
                                mean: parse_num("stats", "mean", "number", &req_attr(&e2, "stats", "mean")?)?,
                                variance: parse_num("stats", "variance", "number", &req_attr(&e2, "stats", "variance")?)?,
                                min: parse_num("stats", "min", "number", &req_attr(&e2, "stats", "min")?)?,
                                max: parse_num("stats", "max", "number", &req_attr(&e2, "stats", "max")?)?,
                                non_zero_tally: parse_num("stats", "non-zero-tally", "integer", &req_attr(&e2, "stats", "non-zero-tally")?)?,
                                exceptions: parse_num("stats", "exceptions", "integer", &req_attr(&e2, "stats", "exceptions")?)?,
                                last: parse_num("stats", "last", "number", &req_attr(&e2, "stats", "last")?)?,
                            };
                            variable_stats.push((name, stats));
                        }
                        Event::Start(e2) if e2.name().as_ref() == b"series" => {
                            let name = req_attr(&e2, "series", "variable")?;
                            let text = read_text(reader)?;
                            variable_series.push((name, linnyr_experiment::rle::decode(&text)));
                        }
                        Event::Start(e2) if e2.name().as_ref() == b"message" => {
                            let block = parse_num("message", "block", "integer", &req_attr(&e2, "message", "block")?)?;
                            let text = read_text(reader)?;
                            solver_messages.push((block, text));
                        }
                        Event::Eof => break,
                        _ => {}
                    }
                }

                out.push(linnyr_model::ExperimentRun {
                    number,
                    wall_clock_start,
                    wall_clock_recorded,
                    time_step_count,
                    duration,
                    variable_stats,
                    variable_series,
                    solver_messages,
                });
            }
            Event::Eof => return Ok(out),
            _ => {}
        }
    }
}
