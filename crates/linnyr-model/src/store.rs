//! The model: one arena per entity kind, name indices for idempotent
//! `add…` methods, and cascading deletion.

use linnyr_common::{Diagnostic, ErrorKind};
use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::entities::*;
use crate::expr::Expr;
use crate::ids::{canonical_id, constraint_id, link_id, process_code, product_code};
use crate::unit::UnitRegistry;

pub struct Model {
    pub actors: Arena<Actor>,
    pub processes: Arena<Process>,
    pub products: Arena<Product>,
    pub clusters: Arena<Cluster>,
    pub links: Arena<Link>,
    pub constraints: Arena<Constraint>,
    pub datasets: Arena<Dataset>,
    pub charts: Arena<Chart>,
    pub experiments: Arena<Experiment>,
    pub units: UnitRegistry,

    pub top_cluster: ClusterId,
    pub default_actor: ActorId,

    actor_by_id: FxHashMap<String, ActorId>,
    process_by_id: FxHashMap<String, ProcessId>,
    product_by_id: FxHashMap<String, ProductId>,
    cluster_by_id: FxHashMap<String, ClusterId>,
    link_by_id: FxHashMap<String, LinkId>,
    constraint_by_id: FxHashMap<String, ConstraintId>,
    dataset_by_id: FxHashMap<String, DatasetId>,

    next_process_number: u32,
    next_product_number: u32,
}

/// Reserved name for the implicit actor owning unassigned processes —
/// present in every model and never deletable.
pub const NO_ACTOR: &str = "(no actor)";

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        let mut actors = Arena::new();
        let default_actor = actors.insert(Actor {
            name: NO_ACTOR.to_string(),
            id: canonical_id(NO_ACTOR),
            weight: Expr::constant("actor-weight", 1.0),
            round_flags: 0,
        });
        let mut actor_by_id = FxHashMap::default();
        actor_by_id.insert(canonical_id(NO_ACTOR), default_actor);

        let mut clusters = Arena::new();
        let top_cluster = clusters.insert(Cluster {
            name: "(top cluster)".to_string(),
            id: canonical_id("(top cluster)"),
            actor: default_actor,
            parent: None,
            child_clusters: Vec::new(),
            child_processes: Vec::new(),
            product_positions: Vec::new(),
            notes: String::new(),
            ignore: false,
            black_box: false,
        });
        let mut cluster_by_id = FxHashMap::default();
        cluster_by_id.insert(canonical_id("(top cluster)"), top_cluster);

        Self {
            actors,
            processes: Arena::new(),
            products: Arena::new(),
            clusters,
            links: Arena::new(),
            constraints: Arena::new(),
            datasets: Arena::new(),
            charts: Arena::new(),
            experiments: Arena::new(),
            units: UnitRegistry::new(),
            top_cluster,
            default_actor,
            actor_by_id,
            process_by_id: FxHashMap::default(),
            product_by_id: FxHashMap::default(),
            cluster_by_id,
            link_by_id: FxHashMap::default(),
            constraint_by_id: FxHashMap::default(),
            dataset_by_id: FxHashMap::default(),
            next_process_number: 1,
            next_product_number: 1,
        }
    }

    fn validate_name(name: &str) -> Result<(), Diagnostic> {
        if name.trim().is_empty() {
            return Err(Diagnostic::new(ErrorKind::InvalidName, "empty name"));
        }
        if name.chars().any(|c| c == '#' || c.is_control()) {
            return Err(Diagnostic::new(
                ErrorKind::InvalidName,
                "name contains reserved characters",
            ));
        }
        Ok(())
    }

    /// Idempotent: a second `add_actor` with the same name returns the
    /// existing actor rather than erroring or creating a duplicate.
    pub fn add_actor(&mut self, name: &str) -> Result<ActorId, Diagnostic> {
        Self::validate_name(name)?;
        if name.contains(':') {
            return Err(Diagnostic::new(
                ErrorKind::InvalidName,
                "actor names may not contain ':'",
            ));
        }
        let id = canonical_id(name);
        if let Some(existing) = self.actor_by_id.get(&id) {
            return Ok(*existing);
        }
        let actor_id = self.actors.insert(Actor {
            name: name.to_string(),
            id: id.clone(),
            weight: Expr::constant("actor-weight", 1.0),
            round_flags: 0,
        });
        self.actor_by_id.insert(id, actor_id);
        Ok(actor_id)
    }

    pub fn add_process(&mut self, name: &str, cluster: ClusterId) -> Result<ProcessId, Diagnostic> {
        Self::validate_name(name)?;
        let id = canonical_id(name);
        if let Some(existing) = self.process_by_id.get(&id) {
            return Ok(*existing);
        }
        if self.product_by_id.contains_key(&id) {
            return Err(Diagnostic::new(
                ErrorKind::EntityExists,
                format!("'{name}' already exists as a product"),
            ));
        }
        let code = process_code(self.next_process_number);
        self.next_process_number += 1;
        let process_id = self.processes.insert(Process {
            name: name.to_string(),
            id: id.clone(),
            code,
            actor: self.default_actor,
            cluster,
            lower_bound: Expr::constant("lb", 0.0),
            upper_bound: Expr::constant("ub", f64::INFINITY),
            equal_bounds: false,
            initial_level: Expr::constant("il", 0.0),
            pace: 1,
            integer_level: false,
            semi_continuous: false,
            level: Vec::new(),
            cost_price: Vec::new(),
        });
        self.process_by_id.insert(id, process_id);
        if let Some(c) = self.clusters.get_mut(cluster) {
            c.child_processes.push(process_id);
        }
        Ok(process_id)
    }

    pub fn add_product(&mut self, name: &str) -> Result<ProductId, Diagnostic> {
        Self::validate_name(name)?;
        let id = canonical_id(name);
        if let Some(existing) = self.product_by_id.get(&id) {
            return Ok(*existing);
        }
        if self.process_by_id.contains_key(&id) {
            return Err(Diagnostic::new(
                ErrorKind::EntityExists,
                format!("'{name}' already exists as a process"),
            ));
        }
        let code = product_code(self.next_product_number);
        self.next_product_number += 1;
        let product_id = self.products.insert(Product {
            name: name.to_string(),
            id: id.clone(),
            code,
            scale_unit: crate::unit::BASE_UNIT.to_string(),
            lower_bound: Expr::constant("lb", 0.0),
            upper_bound: Expr::constant("ub", f64::INFINITY),
            initial_level: Expr::constant("il", 0.0),
            price: Expr::constant("price", 0.0),
            is_source: false,
            is_sink: false,
            is_buffer: false,
            is_data: false,
            no_slack: false,
            no_links: false,
            level: Vec::new(),
            stock_price: Vec::new(),
        });
        self.product_by_id.insert(id, product_id);
        Ok(product_id)
    }

    pub fn add_cluster(
        &mut self,
        name: &str,
        parent: ClusterId,
    ) -> Result<ClusterId, Diagnostic> {
        Self::validate_name(name)?;
        let id = canonical_id(name);
        if let Some(existing) = self.cluster_by_id.get(&id) {
            return Ok(*existing);
        }
        let cluster_id = self.clusters.insert(Cluster {
            name: name.to_string(),
            id: id.clone(),
            actor: self.default_actor,
            parent: Some(parent),
            child_clusters: Vec::new(),
            child_processes: Vec::new(),
            product_positions: Vec::new(),
            notes: String::new(),
            ignore: false,
            black_box: false,
        });
        self.cluster_by_id.insert(id, cluster_id);
        if let Some(p) = self.clusters.get_mut(parent) {
            p.child_clusters.push(cluster_id);
        }
        Ok(cluster_id)
    }

    fn node_code(&self, node: NodeRef) -> Option<&str> {
        match node {
            NodeRef::Process(id) => self.processes.get(id).map(|p| p.code.as_str()),
            NodeRef::Product(id) => self.products.get(id).map(|p| p.code.as_str()),
        }
    }

    /// Rejects a process-to-process link and refuses to overwrite an
    /// existing link between the same ordered endpoint pair.
    pub fn add_link(
        &mut self,
        from: NodeRef,
        to: NodeRef,
        rate: Expr,
    ) -> Result<LinkId, Diagnostic> {
        if matches!((from, to), (NodeRef::Process(_), NodeRef::Process(_))) {
            return Err(Diagnostic::new(
                ErrorKind::InvalidName,
                "links between two processes are not allowed",
            ));
        }
        let (Some(from_code), Some(to_code)) = (self.node_code(from), self.node_code(to)) else {
            return Err(Diagnostic::new(ErrorKind::UnresolvedReference, "unknown endpoint"));
        };
        let id = link_id(from_code, to_code);
        if let Some(existing) = self.link_by_id.get(&id) {
            return Ok(*existing);
        }
        let link_id_value = self.links.insert(Link {
            id: id.clone(),
            from,
            to,
            relative_rate: rate,
            flow_delay: Expr::constant("delay", 0.0),
            multiplier: LinkMultiplier::Positive,
            share_of_cost: 0.0,
            is_feedback: false,
            actual_flow: Vec::new(),
            unit_cost_price: Vec::new(),
        });
        self.link_by_id.insert(id, link_id_value);
        Ok(link_id_value)
    }

    pub fn add_constraint(
        &mut self,
        from: NodeRef,
        to: NodeRef,
        bound_lines: Vec<BoundLine>,
    ) -> Result<ConstraintId, Diagnostic> {
        if from == to {
            return Err(Diagnostic::new(
                ErrorKind::InvalidName,
                "constraint endpoints must differ",
            ));
        }
        if bound_lines.is_empty() {
            return Err(Diagnostic::new(
                ErrorKind::InvalidName,
                "a constraint needs at least one bound line",
            ));
        }
        let (Some(from_code), Some(to_code)) = (self.node_code(from), self.node_code(to)) else {
            return Err(Diagnostic::new(ErrorKind::UnresolvedReference, "unknown endpoint"));
        };
        let id = constraint_id(from_code, to_code);
        if let Some(existing) = self.constraint_by_id.get(&id) {
            return Ok(*existing);
        }
        let constraint_id_value = self.constraints.insert(Constraint {
            id: id.clone(),
            from,
            to,
            bound_lines,
            no_slack: false,
            share_of_cost: 0.0,
            soc_direction: CostShareDirection::FromToTo,
            transfer_cost_price: Vec::new(),
        });
        self.constraint_by_id.insert(id, constraint_id_value);
        Ok(constraint_id_value)
    }

    /// Renaming an entity to its current name is always a successful no-op.
    pub fn rename_process(&mut self, id: ProcessId, new_name: &str) -> Result<(), Diagnostic> {
        let Some(process) = self.processes.get(id) else {
            return Err(Diagnostic::new(ErrorKind::UnresolvedReference, "unknown process"));
        };
        if process.name == new_name {
            return Ok(());
        }
        Self::validate_name(new_name)?;
        let new_id = canonical_id(new_name);
        if self.process_by_id.contains_key(&new_id) {
            return Err(Diagnostic::new(ErrorKind::EntityExists, new_name.to_string()));
        }
        let old_id = process.id.clone();
        self.process_by_id.remove(&old_id);
        self.process_by_id.insert(new_id.clone(), id);
        let process = self.processes.get_mut(id).unwrap();
        process.name = new_name.to_string();
        process.id = new_id;
        Ok(())
    }

    /// Deletes a process, cascading to every link/constraint that names it
    /// as an endpoint, emitting a plain-text undo fragment per removed
    /// entity before the mutation takes effect.
    pub fn delete_process(&mut self, id: ProcessId) -> Vec<String> {
        let mut undo_fragments = Vec::new();
        let link_ids: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(_, l)| l.from == NodeRef::Process(id) || l.to == NodeRef::Process(id))
            .map(|(lid, _)| lid)
            .collect();
        for lid in link_ids {
            if let Some(link) = self.links.get(lid) {
                undo_fragments.push(format!("<link id=\"{}\"/>", link.id));
            }
            self.links.remove(lid);
            self.link_by_id.retain(|_, v| *v != lid);
        }
        let constraint_ids: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.from == NodeRef::Process(id) || c.to == NodeRef::Process(id))
            .map(|(cid, _)| cid)
            .collect();
        for cid in constraint_ids {
            if let Some(c) = self.constraints.get(cid) {
                undo_fragments.push(format!("<constraint id=\"{}\"/>", c.id));
            }
            self.constraints.remove(cid);
            self.constraint_by_id.retain(|_, v| *v != cid);
        }
        if let Some(process) = self.processes.get(id) {
            undo_fragments.insert(0, format!("<process id=\"{}\"/>", process.id));
            let cluster = process.cluster;
            self.process_by_id.remove(&process.id);
            if let Some(c) = self.clusters.get_mut(cluster) {
                c.child_processes.retain(|p| *p != id);
            }
        }
        self.processes.remove(id);
        undo_fragments
    }

    pub fn lookup_process(&self, id: &str) -> Option<ProcessId> {
        self.process_by_id.get(id).copied()
    }

    pub fn lookup_product(&self, id: &str) -> Option<ProductId> {
        self.product_by_id.get(id).copied()
    }

    pub fn lookup_actor(&self, id: &str) -> Option<ActorId> {
        self.actor_by_id.get(id).copied()
    }

    pub fn lookup_cluster(&self, id: &str) -> Option<ClusterId> {
        self.cluster_by_id.get(id).copied()
    }

    /// The decimal code the next `add_process` call will assign.
    pub fn next_process_number(&self) -> u32 {
        self.next_process_number
    }

    /// The base-26 code number the next `add_product` call will assign.
    pub fn next_product_number(&self) -> u32 {
        self.next_product_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_actor_is_idempotent() {
        let mut model = Model::new();
        let a1 = model.add_actor("Alice").unwrap();
        let a2 = model.add_actor("Alice").unwrap();
        assert_eq!(a1, a2);
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P1", top).unwrap();
        assert!(model.rename_process(p, "P1").is_ok());
    }

    #[test]
    fn process_and_product_codes_differ_in_shape() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P1", top).unwrap();
        let q = model.add_product("Q1").unwrap();
        assert_eq!(model.processes.get(p).unwrap().code, "1");
        assert_eq!(model.products.get(q).unwrap().code, "A");
    }

    #[test]
    fn deleting_a_process_cascades_to_its_links() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P1", top).unwrap();
        let q = model.add_product("Q1").unwrap();
        model
            .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
            .unwrap();
        assert_eq!(model.links.len(), 1);
        let fragments = model.delete_process(p);
        assert_eq!(model.links.len(), 0);
        assert!(fragments.iter().any(|f| f.contains("process")));
        assert!(fragments.iter().any(|f| f.contains("link")));
    }

    #[test]
    fn process_to_process_links_are_rejected() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p1 = model.add_process("P1", top).unwrap();
        let p2 = model.add_process("P2", top).unwrap();
        let result = model.add_link(
            NodeRef::Process(p1),
            NodeRef::Process(p2),
            Expr::constant("rate", 1.0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn name_collision_across_kinds_is_rejected() {
        let mut model = Model::new();
        let top = model.top_cluster;
        model.add_process("X", top).unwrap();
        assert!(model.add_product("X").is_err());
    }
}
