//! Fixed-point cost-price propagation over a solved run: `CP(process|product, t)`,
//! `UCP(link, t)`, `transfer_cp(constraint, t)`.

use linnyr_common::Value;
use linnyr_model::{CostShareDirection, Id, Link, Model, NodeRef, ProcessId, ProductId};

use crate::context_eval::eval_value_at;

const NEAR_ZERO: f64 = 1e-9;

pub struct CostPricePropagator<'a> {
    model: &'a mut Model,
}

impl<'a> CostPricePropagator<'a> {
    pub fn new(model: &'a mut Model) -> Self {
        Self { model }
    }

    /// Propagates cost prices for every timestep in `[block_start,
    /// block_start + block_len)`, one timestep at a time — later timesteps
    /// may read a buffered product's stock price from `t - 1`, but nothing
    /// within a timestep's own iteration depends on a later timestep.
    pub fn propagate_block(&mut self, block_start: i64, block_len: i64) {
        for t in block_start..block_start + block_len {
            self.propagate_timestep(t);
        }
    }

    fn propagate_timestep(&mut self, t: i64) {
        let process_ids: Vec<ProcessId> = self.model.processes.creation_order().collect();
        let product_ids: Vec<ProductId> = self.model.products.creation_order().collect();

        if process_ids
            .iter()
            .any(|&pid| level_at(self.model, NodeRef::Process(pid), t) < 0.0)
        {
            for &pid in &process_ids {
                write_process_cp(self.model, pid, t, Value::Undefined);
            }
            for &qid in &product_ids {
                write_product_cp(self.model, qid, t, Value::Undefined);
            }
            return;
        }

        let mut unknown_processes = process_ids;
        let mut unknown_products = product_ids;

        self.seed_transfer_prices(t);
        self.seed_source_link_prices(t);
        self.initialize_processes(t, &mut unknown_processes);
        self.initialize_products(t, &mut unknown_products);

        loop {
            let before = unknown_processes.len() + unknown_products.len();
            self.resolve_ready_processes(t, &mut unknown_processes);
            self.resolve_ready_products(t, &mut unknown_products);
            if unknown_processes.is_empty() && unknown_products.is_empty() {
                break;
            }
            if unknown_processes.len() + unknown_products.len() == before
                && !self.relax(t, &mut unknown_processes)
            {
                break;
            }
        }

        self.finalize_product_highest_cost_price(t);
    }

    /// Rule 2: constraints with non-negligible levels on both endpoints and
    /// positive share-of-cost get a transfer rate.
    fn seed_transfer_prices(&mut self, t: i64) {
        for cid in self.model.constraints.creation_order().collect::<Vec<_>>() {
            let constraint = self.model.constraints.get(cid).unwrap();
            if constraint.share_of_cost <= 0.0 {
                continue;
            }
            let from_level = level_at(self.model, constraint.from, t);
            let to_level = level_at(self.model, constraint.to, t);
            if from_level.abs() <= NEAR_ZERO || to_level.abs() <= NEAR_ZERO {
                continue;
            }
            let ratio = match constraint.soc_direction {
                CostShareDirection::FromToTo => from_level / to_level,
                CostShareDirection::ToToFrom => to_level / from_level,
            };
            let transfer_cp = constraint.share_of_cost * ratio;
            write_at(
                &mut self.model.constraints.get_mut(cid).unwrap().transfer_cost_price,
                t,
                Value::Number(transfer_cp),
            );
        }
    }

    /// Rule 5: links whose source has a market price, or a product→product
    /// link (always `NoCost`), get `UCP` without waiting on the fixed point.
    fn seed_source_link_prices(&mut self, t: i64) {
        for lid in self.model.links.creation_order().collect::<Vec<_>>() {
            let link = self.model.links.get(lid).unwrap();
            let rate = eval_link_rate(self.model, lid, t);
            let ucp = match (link.from, link.to) {
                (NodeRef::Product(_), NodeRef::Product(_)) => Some(Value::NoCost),
                (NodeRef::Product(source_qid), _) => {
                    let product = self.model.products.get(source_qid).unwrap();
                    eval_value_at(self.model, &product.id, "price", t)
                        .filter(|price| *price != 0.0)
                        .map(|price| Value::Number(price * rate))
                }
                (NodeRef::Process(_), _) => None,
            };
            if let Some(ucp) = ucp {
                write_at(&mut self.model.links.get_mut(lid).unwrap().unit_cost_price, t, ucp);
            }
        }
    }

    /// Rule 3: a process with no input links and no cost-affecting incoming
    /// constraint gets `CP = max(0, -Σ negative output prices × rate)`.
    fn initialize_processes(&mut self, t: i64, unknown: &mut Vec<ProcessId>) {
        let mut resolved = Vec::new();
        for &pid in unknown.iter() {
            let has_inputs = self
                .model
                .links
                .iter()
                .any(|(_, l)| l.to == NodeRef::Process(pid));
            let has_cost_constraint = self
                .model
                .constraints
                .iter()
                .any(|(_, c)| c.to == NodeRef::Process(pid) && c.share_of_cost > 0.0);
            if has_inputs || has_cost_constraint {
                continue;
            }
            let outgoing_to_products: Vec<(Id<Link>, ProductId)> = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.from == NodeRef::Process(pid))
                .filter_map(|(id, l)| match l.to {
                    NodeRef::Product(qid) => Some((id, qid)),
                    NodeRef::Process(_) => None,
                })
                .collect();
            let mut deficit = 0.0;
            for (lid, sink_qid) in outgoing_to_products {
                let sink_id = self.model.products.get(sink_qid).unwrap().id.clone();
                if let Some(price) = eval_value_at(self.model, &sink_id, "price", t) {
                    if price < 0.0 {
                        deficit += -price * eval_link_rate(self.model, lid, t);
                    }
                }
            }
            write_process_cp(self.model, pid, t, Value::Number(deficit.max(0.0)));
            resolved.push(pid);
        }
        unknown.retain(|pid| !resolved.contains(pid));
    }

    /// Rule 4: a product whose every inflow link carries no cost gets
    /// `NoCost`; a product with no inflow links stays unknown (it falls to
    /// the buffered-carry path in the iteration/relaxation passes).
    fn initialize_products(&mut self, t: i64, unknown: &mut Vec<ProductId>) {
        let mut resolved = Vec::new();
        for &qid in unknown.iter() {
            let inflow_costs: Vec<Value> = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.to == NodeRef::Product(qid))
                .map(|(_, l)| l.unit_cost_price.get(t as usize).copied())
                .collect::<Option<Vec<_>>>()
                .unwrap_or_default();
            let inflow_count = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.to == NodeRef::Product(qid))
                .count();
            if inflow_count == 0 || inflow_costs.len() != inflow_count {
                continue;
            }
            if inflow_costs.iter().all(|c| is_costless(*c)) {
                write_product_cp(self.model, qid, t, Value::NoCost);
                resolved.push(qid);
            }
        }
        unknown.retain(|qid| !resolved.contains(qid));
    }

    /// Iteration rule: a process becomes known once every inbound link's
    /// `UCP` and every inbound transfer constraint's `transfer_cp` is known.
    fn resolve_ready_processes(&mut self, t: i64, unknown: &mut Vec<ProcessId>) {
        let mut resolved = Vec::new();
        for &pid in unknown.iter() {
            let inbound: Vec<_> = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.to == NodeRef::Process(pid))
                .map(|(id, l)| (id, l.unit_cost_price.get(t as usize).copied()))
                .collect();
            if inbound.iter().any(|(_, ucp)| ucp.is_none()) {
                continue;
            }
            let transfers: Vec<_> = self
                .model
                .constraints
                .iter()
                .filter(|(_, c)| c.to == NodeRef::Process(pid))
                .map(|(_, c)| c.transfer_cost_price.get(t as usize).copied())
                .collect();
            if transfers.iter().any(|v| v.is_none()) {
                continue;
            }
            let cp: f64 = inbound
                .iter()
                .map(|(_, v)| (*v).and_then(|v| v.as_number()).unwrap_or(0.0))
                .sum::<f64>()
                + transfers
                    .iter()
                    .map(|v| (*v).and_then(|v| v.as_number()).unwrap_or(0.0))
                    .sum::<f64>();
            write_process_cp(self.model, pid, t, Value::Number(cp));
            self.propagate_process_outputs(pid, t, cp);
            resolved.push(pid);
        }
        unknown.retain(|pid| !resolved.contains(pid));
    }

    fn propagate_process_outputs(&mut self, pid: ProcessId, t: i64, cp: f64) {
        let outgoing: Vec<_> = self
            .model
            .links
            .iter()
            .filter(|(_, l)| l.from == NodeRef::Process(pid))
            .map(|(id, l)| (id, l.share_of_cost))
            .collect();
        for (lid, share) in outgoing {
            let rate = eval_link_rate(self.model, lid, t);
            let attenuation = if share > 0.0 { share } else { 1.0 };
            let ucp = cp * rate * attenuation;
            write_at(&mut self.model.links.get_mut(lid).unwrap().unit_cost_price, t, Value::Number(ucp));
        }
    }

    /// A product's `CP` is the production-weighted average of its
    /// cost-carrying inflows (rate-weighted), or the prior timestep's stock
    /// price when it is an unfed buffer.
    fn resolve_ready_products(&mut self, t: i64, unknown: &mut Vec<ProductId>) {
        let mut resolved = Vec::new();
        for &qid in unknown.iter() {
            let inflows: Vec<(Id<Link>, NodeRef)> = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.to == NodeRef::Product(qid))
                .map(|(id, l)| (id, l.from))
                .collect();
            let is_buffer = self.model.products.get(qid).unwrap().is_buffer;
            if inflows.is_empty() {
                if is_buffer {
                    let previous = self
                        .model
                        .products
                        .get(qid)
                        .unwrap()
                        .stock_price
                        .get((t - 1).max(0) as usize)
                        .copied()
                        .unwrap_or(Value::Number(0.0));
                    write_product_cp(self.model, qid, t, previous);
                    resolved.push(qid);
                }
                continue;
            }
            let mut total_weight = 0.0;
            let mut total_cost = 0.0;
            let mut all_known = true;
            for (lid, from) in &inflows {
                let rate = eval_link_rate(self.model, *lid, t);
                let cp = match from {
                    NodeRef::Process(source_pid) => process_cp(self.model, *source_pid, t),
                    NodeRef::Product(_) => Some(0.0),
                };
                match cp {
                    Some(cp) => {
                        total_weight += rate.abs();
                        total_cost += cp * rate;
                    }
                    None => {
                        all_known = false;
                        break;
                    }
                }
            }
            if !all_known {
                continue;
            }
            if total_weight > NEAR_ZERO {
                write_product_cp(self.model, qid, t, Value::Number(total_cost / total_weight));
            } else {
                write_product_cp(self.model, qid, t, Value::NoCost);
            }
            resolved.push(qid);
        }
        unknown.retain(|qid| !resolved.contains(qid));
    }

    /// Fall-backs, tried in order: zero-level processes, then zero-flow
    /// links, then buffered-product carries, each group in creation order.
    /// Returns `true` if a relaxation fired (the caller should retry).
    fn relax(&mut self, t: i64, unknown_processes: &mut Vec<ProcessId>) -> bool {
        if let Some(pos) = unknown_processes
            .iter()
            .position(|&pid| level_at(self.model, NodeRef::Process(pid), t).abs() <= NEAR_ZERO)
        {
            let pid = unknown_processes.remove(pos);
            write_process_cp(self.model, pid, t, Value::Number(0.0));
            return true;
        }

        for lid in self.model.links.creation_order().collect::<Vec<_>>() {
            let link = self.model.links.get(lid).unwrap();
            if link.unit_cost_price.get(t as usize).is_some() {
                continue;
            }
            if eval_link_rate(self.model, lid, t).abs() <= NEAR_ZERO {
                write_at(&mut self.model.links.get_mut(lid).unwrap().unit_cost_price, t, Value::NoCost);
                return true;
            }
        }

        for lid in self.model.links.creation_order().collect::<Vec<_>>() {
            let link = self.model.links.get(lid).unwrap();
            if link.unit_cost_price.get(t as usize).is_some() {
                continue;
            }
            let NodeRef::Product(source_qid) = link.from else { continue };
            if !self.model.products.get(source_qid).unwrap().is_buffer {
                continue;
            }
            let stock_price = self
                .model
                .products
                .get(source_qid)
                .unwrap()
                .stock_price
                .get((t - 1).max(0) as usize)
                .copied()
                .unwrap_or(Value::Number(0.0));
            write_at(&mut self.model.links.get_mut(lid).unwrap().unit_cost_price, t, stock_price);
            return true;
        }

        false
    }

    /// Closing rule: `highest_cost_price(p,t)` over cost-carrying incoming
    /// process links.
    fn finalize_product_highest_cost_price(&mut self, t: i64) {
        for qid in self.model.products.creation_order().collect::<Vec<_>>() {
            let inflows: Vec<_> = self
                .model
                .links
                .iter()
                .filter(|(_, l)| l.to == NodeRef::Product(qid) && l.share_of_cost > 0.0)
                .map(|(id, l)| (id, l.from, l.share_of_cost))
                .collect();
            let mut highest: Option<f64> = None;
            for (lid, from, share) in inflows {
                let NodeRef::Process(source_pid) = from else { continue };
                let Some(cp) = process_cp(self.model, source_pid, t) else { continue };
                let rate = eval_link_rate(self.model, lid, t);
                let candidate = if rate.abs() <= NEAR_ZERO {
                    if cp >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY }
                } else {
                    cp * share / rate
                };
                highest = Some(highest.map_or(candidate, |h: f64| h.max(candidate)));
            }
            if let Some(highest) = highest {
                write_at(
                    &mut self.model.products.get_mut(qid).unwrap().stock_price,
                    t,
                    Value::Number(highest),
                );
            }
        }
    }
}

fn level_at(model: &Model, node: NodeRef, t: i64) -> f64 {
    if t < 0 {
        return 0.0;
    }
    let vector = match node {
        NodeRef::Process(pid) => model.processes.get(pid).map(|p| &p.level),
        NodeRef::Product(qid) => model.products.get(qid).map(|p| &p.level),
    };
    vector.and_then(|v| v.get(t as usize)).copied().unwrap_or(0.0)
}

/// A process's cost price as a plain number for weighting purposes.
/// `NoCost` counts as zero; `Undefined`/`Computing`/anything else not yet
/// settled counts as unknown.
fn process_cp(model: &Model, pid: ProcessId, t: i64) -> Option<f64> {
    model.processes.get(pid).and_then(|p| p.cost_price.get(t as usize)).and_then(|v| match v {
        Value::Number(n) => Some(*n),
        Value::NoCost => Some(0.0),
        _ => None,
    })
}

/// `true` for a value that contributes nothing to an aggregate cost: an
/// explicit [`Value::NoCost`] or a numerically negligible [`Value::Number`].
fn is_costless(value: Value) -> bool {
    matches!(value, Value::NoCost) || value.as_number().is_some_and(|n| n.abs() <= NEAR_ZERO)
}

fn write_process_cp(model: &mut Model, pid: ProcessId, t: i64, value: Value) {
    if let Some(process) = model.processes.get_mut(pid) {
        write_at(&mut process.cost_price, t, value);
    }
}

fn write_product_cp(model: &mut Model, qid: ProductId, t: i64, value: Value) {
    if let Some(product) = model.products.get_mut(qid) {
        write_at(&mut product.stock_price, t, value);
    }
}

fn write_at(vector: &mut Vec<Value>, t: i64, value: Value) {
    if t < 0 {
        return;
    }
    let t = t as usize;
    if vector.len() <= t {
        vector.resize(t + 1, Value::NotComputed);
    }
    vector[t] = value;
}

fn eval_link_rate(model: &Model, lid: Id<Link>, t: i64) -> f64 {
    let Some(link) = model.links.get(lid) else { return 0.0 };
    let context = linnyr_model::ModelContext::new(model);
    let Some(program) = link.relative_rate.program() else { return 0.0 };
    let interpreter = linnyr_eval::Interpreter::new(&context, t, None);
    interpreter.evaluate(&program.program).as_number().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use linnyr_model::Expr;

    #[test]
    fn a_process_with_no_inputs_and_no_cost_links_gets_zero_cost_price() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P", top).unwrap();
        model.processes.get_mut(p).unwrap().level = vec![5.0];

        CostPricePropagator::new(&mut model).propagate_block(0, 1);

        assert_eq!(model.processes.get(p).unwrap().cost_price, vec![Value::Number(0.0)]);
    }

    #[test]
    fn a_market_priced_source_propagates_its_unit_cost_price_downstream() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let source = model.add_product("Fuel").unwrap();
        model.products.get_mut(source).unwrap().price = Expr::constant("price", 2.0);
        model.products.get_mut(source).unwrap().level = vec![10.0];
        let burner = model.add_process("Burner", top).unwrap();
        model.processes.get_mut(burner).unwrap().level = vec![10.0];
        model
            .add_link(
                NodeRef::Product(source),
                NodeRef::Process(burner),
                Expr::constant("rate", 1.0),
            )
            .unwrap();

        CostPricePropagator::new(&mut model).propagate_block(0, 1);

        let burner_cp = model.processes.get(burner).unwrap().cost_price[0];
        assert_eq!(burner_cp, Value::Number(2.0));
    }

    #[test]
    fn a_negative_level_aborts_propagation_for_that_timestep() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P", top).unwrap();
        model.processes.get_mut(p).unwrap().level = vec![-1.0];

        CostPricePropagator::new(&mut model).propagate_block(0, 1);

        assert_eq!(model.processes.get(p).unwrap().cost_price, vec![Value::Undefined]);
    }
}
