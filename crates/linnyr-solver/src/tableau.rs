//! Per-block translation of a [`Model`] slice into an LP/MILP problem
//! description: variables, rows, integrality, and an objective.

use rustc_hash::FxHashMap;

use linnyr_model::{
    BoundType, Link, LinkMultiplier, Model, NodeRef, ProcessId, ProductId,
};

use crate::context_eval::eval_value_at;

const NEAR_ZERO: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Level,
    OnOff,
    StartUp,
    ShutDown,
    FirstCommit,
    PeakInc,
    BoundLineWeight,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub kind: VariableKind,
    pub node: NodeRef,
    pub t: i64,
    pub lower: f64,
    pub upper: f64,
    pub integer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    Le,
    Eq,
    Ge,
}

impl From<BoundType> for RowSense {
    fn from(b: BoundType) -> Self {
        match b {
            BoundType::Le => RowSense::Le,
            BoundType::Eq => RowSense::Eq,
            BoundType::Ge => RowSense::Ge,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    pub description: String,
    /// `(variable index, coefficient)` pairs; sparse by construction.
    pub coefficients: Vec<(usize, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

#[derive(Debug, Default, Clone)]
pub struct Tableau {
    pub variables: Vec<Variable>,
    pub rows: Vec<Row>,
    pub integer_vars: Vec<usize>,
    pub objective: Vec<(usize, f64)>,
    pub messages: Vec<String>,
}

impl Tableau {
    fn push_variable(&mut self, v: Variable) -> usize {
        let integer = v.integer;
        let index = self.variables.len();
        self.variables.push(v);
        if integer {
            self.integer_vars.push(index);
        }
        index
    }
}

/// Previous-block carry the tableau builder is pure with respect to, so a
/// rolling-horizon run can hand the prior block's edge state forward
/// without the builder needing to see the whole history.
#[derive(Debug, Default, Clone)]
pub struct Carry {
    pub process_level: FxHashMap<ProcessId, f64>,
    pub process_on_off: FxHashMap<ProcessId, bool>,
}

const BIG_M_MULTIPLIER_SET: [LinkMultiplier; 6] = [
    LinkMultiplier::Positive,
    LinkMultiplier::Zero,
    LinkMultiplier::StartUp,
    LinkMultiplier::ShutDown,
    LinkMultiplier::FirstCommit,
    LinkMultiplier::SpinningReserve,
];

pub struct TableauBuilder<'a> {
    model: &'a Model,
}

impl<'a> TableauBuilder<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    /// Builds the tableau for timesteps `[block_start .. block_start +
    /// block_len + look_ahead - 1]`, in a fixed kind order: actors (no
    /// variables of their own), processes, products,
    /// links, constraints.
    ///
    /// Round flags and pace are resolved here rather than through a
    /// multi-round resubmission loop: processes whose actor excludes round
    /// zero are pinned to their carried-in level instead of left free (the
    /// single-solve effect of "fixed at the prior round's level"), and
    /// `objective` only carries a term for the processes that remain free.
    /// A process with `pace > 1` is held equal to its own previous-timestep
    /// level except on pace-boundary timesteps.
    pub fn build(&self, block_start: i64, block_len: i64, look_ahead: i64, carry: &Carry) -> Tableau {
        let mut tableau = Tableau::default();
        let last_t = block_start + block_len + look_ahead - 1;

        let mut level_index: FxHashMap<(ProcessId, i64), usize> = FxHashMap::default();
        let mut on_off_index: FxHashMap<(ProcessId, i64), usize> = FxHashMap::default();
        let mut product_level_index: FxHashMap<(ProductId, i64), usize> = FxHashMap::default();

        for t in block_start..=last_t {
            for pid in self.model.processes.creation_order() {
                let process = self.model.processes.get(pid).unwrap();
                let ub = eval_value_at(self.model, &process.id, "ub", t).unwrap_or(f64::INFINITY);
                let lb = eval_value_at(self.model, &process.id, "lb", t).unwrap_or(0.0);

                let actor = self.model.actors.get(process.actor);
                let round_zero_included =
                    actor.map_or(true, |a| a.round_flags == 0 || a.round_flags & 1 != 0);
                let (lower, upper) = if round_zero_included {
                    (lb, ub)
                } else {
                    let fixed = carry
                        .process_level
                        .get(&pid)
                        .copied()
                        .or_else(|| eval_value_at(self.model, &process.id, "il", t))
                        .unwrap_or(lb);
                    (fixed, fixed)
                };

                let level_idx = tableau.push_variable(Variable {
                    kind: VariableKind::Level,
                    node: NodeRef::Process(pid),
                    t,
                    lower,
                    upper,
                    integer: process.integer_level,
                });
                level_index.insert((pid, t), level_idx);

                if round_zero_included {
                    if let Some(actor) = actor {
                        let weight = eval_link_expr(self.model, &actor.weight, t).unwrap_or(1.0);
                        tableau.objective.push((level_idx, weight));
                    }
                }

                if process.pace > 1 {
                    let steps_since_start = t - block_start;
                    if steps_since_start % process.pace as i64 != 0 {
                        if let Some(&prev_idx) = level_index.get(&(pid, t - 1)) {
                            tableau.rows.push(Row {
                                description: format!("pace_hold[{},{t}]", process.id),
                                coefficients: vec![(level_idx, 1.0), (prev_idx, -1.0)],
                                sense: RowSense::Eq,
                                rhs: 0.0,
                            });
                        }
                    }
                }

                let needs_on_off = self.model.links.iter().any(|(_, l)| {
                    l.from == NodeRef::Process(pid) && BIG_M_MULTIPLIER_SET.contains(&l.multiplier)
                });
                if !needs_on_off {
                    continue;
                }

                let highest_ub = self.highest_feasible_upper_bound(pid, t, ub);
                let on_off_idx = tableau.push_variable(Variable {
                    kind: VariableKind::OnOff,
                    node: NodeRef::Process(pid),
                    t,
                    lower: 0.0,
                    upper: 1.0,
                    integer: true,
                });
                on_off_index.insert((pid, t), on_off_idx);

                tableau.rows.push(Row {
                    description: format!("on_off_link[{},{t}]", process.id),
                    coefficients: vec![(level_idx, 1.0), (on_off_idx, -highest_ub)],
                    sense: RowSense::Le,
                    rhs: 0.0,
                });

                let previous_on_off = if t == block_start {
                    carry.process_on_off.get(&pid).copied().unwrap_or(false)
                } else {
                    false // same-block previous on_off handled via start/shutdown rows below
                };
                if let Some(&prev_idx) = on_off_index.get(&(pid, t - 1)) {
                    let start_up_idx = tableau.push_variable(Variable {
                        kind: VariableKind::StartUp,
                        node: NodeRef::Process(pid),
                        t,
                        lower: 0.0,
                        upper: 1.0,
                        integer: true,
                    });
                    let shut_down_idx = tableau.push_variable(Variable {
                        kind: VariableKind::ShutDown,
                        node: NodeRef::Process(pid),
                        t,
                        lower: 0.0,
                        upper: 1.0,
                        integer: true,
                    });
                    // on_off[t] - on_off[t-1] = start_up[t] - shut_down[t]
                    tableau.rows.push(Row {
                        description: format!("start_shut_order[{},{t}]", process.id),
                        coefficients: vec![
                            (on_off_idx, 1.0),
                            (prev_idx, -1.0),
                            (start_up_idx, -1.0),
                            (shut_down_idx, 1.0),
                        ],
                        sense: RowSense::Eq,
                        rhs: 0.0,
                    });
                } else if previous_on_off {
                    let shut_down_idx = tableau.push_variable(Variable {
                        kind: VariableKind::ShutDown,
                        node: NodeRef::Process(pid),
                        t,
                        lower: 0.0,
                        upper: 1.0,
                        integer: true,
                    });
                    tableau.rows.push(Row {
                        description: format!("carried_shutdown[{},{t}]", process.id),
                        coefficients: vec![(on_off_idx, 1.0), (shut_down_idx, 1.0)],
                        sense: RowSense::Eq,
                        rhs: 1.0,
                    });
                } else {
                    let first_commit_idx = tableau.push_variable(Variable {
                        kind: VariableKind::FirstCommit,
                        node: NodeRef::Process(pid),
                        t,
                        lower: 0.0,
                        upper: 1.0,
                        integer: true,
                    });
                    tableau.rows.push(Row {
                        description: format!("first_commit[{},{t}]", process.id),
                        coefficients: vec![(on_off_idx, 1.0), (first_commit_idx, -1.0)],
                        sense: RowSense::Eq,
                        rhs: 0.0,
                    });
                }

                if self.model.links.iter().any(|(_, l)| {
                    l.from == NodeRef::Process(pid) && l.multiplier == LinkMultiplier::PeakIncrease
                }) {
                    tableau.push_variable(Variable {
                        kind: VariableKind::PeakInc,
                        node: NodeRef::Process(pid),
                        t,
                        lower: 0.0,
                        upper: f64::INFINITY,
                        integer: false,
                    });
                }
            }

            for qid in self.model.products.creation_order() {
                let product = self.model.products.get(qid).unwrap();
                if !product.is_buffer {
                    continue;
                }
                let ub = eval_value_at(self.model, &product.id, "ub", t).unwrap_or(f64::INFINITY);
                let lb = eval_value_at(self.model, &product.id, "lb", t).unwrap_or(0.0);
                let idx = tableau.push_variable(Variable {
                    kind: VariableKind::Level,
                    node: NodeRef::Product(qid),
                    t,
                    lower: lb,
                    upper: ub,
                    integer: false,
                });
                product_level_index.insert((qid, t), idx);
            }

            self.add_flow_conservation_rows(&mut tableau, t, &level_index, &product_level_index);
            self.add_bound_line_rows(&mut tableau, t, &level_index);
        }

        tableau.messages.push(format!(
            "built tableau for t in [{block_start}, {last_t}]: {} variables, {} rows",
            tableau.variables.len(),
            tableau.rows.len()
        ));
        tableau
    }

    /// Walks back from `process`'s inflows to bound the feasible level by
    /// `rate x UB(source)` under binary multipliers, never below zero.
    fn highest_feasible_upper_bound(&self, pid: ProcessId, t: i64, own_ub: f64) -> f64 {
        let mut bound = own_ub;
        for (_, link) in self.model.links.iter() {
            if link.to != NodeRef::Process(pid) {
                continue;
            }
            let rate = eval_link_rate(self.model, link, t);
            let source_ub = match link.from {
                NodeRef::Process(source_pid) => self
                    .model
                    .processes
                    .get(source_pid)
                    .and_then(|p| eval_value_at(self.model, &p.id, "ub", t)),
                NodeRef::Product(source_pid) => self
                    .model
                    .products
                    .get(source_pid)
                    .and_then(|p| eval_value_at(self.model, &p.id, "ub", t)),
            };
            if let Some(source_ub) = source_ub {
                if source_ub.is_finite() {
                    bound = bound.min(rate * source_ub).max(0.0);
                }
            }
        }
        bound.max(0.0)
    }

    fn add_flow_conservation_rows(
        &self,
        tableau: &mut Tableau,
        t: i64,
        level_index: &FxHashMap<(ProcessId, i64), usize>,
        product_level_index: &FxHashMap<(ProductId, i64), usize>,
    ) {
        for qid in self.model.products.creation_order() {
            let product = self.model.products.get(qid).unwrap();
            let mut coefficients = Vec::new();
            for (_, link) in self.model.links.iter() {
                let delay = eval_link_delay(self.model, link, t).unwrap_or(0);
                let rate = eval_link_rate(self.model, link, t - delay);
                if link.to == NodeRef::Product(qid) {
                    if let NodeRef::Process(source_pid) = link.from {
                        if let Some(&idx) = level_index.get(&(source_pid, t - delay)) {
                            coefficients.push((idx, rate));
                        }
                    }
                }
                if link.from == NodeRef::Product(qid) {
                    if let NodeRef::Process(sink_pid) = link.to {
                        if let Some(&idx) = level_index.get(&(sink_pid, t - delay)) {
                            coefficients.push((idx, -rate));
                        }
                    }
                }
            }
            if coefficients.is_empty() {
                continue;
            }
            let rhs = if product.is_buffer {
                if let (Some(&idx_t), Some(&idx_prev)) = (
                    product_level_index.get(&(qid, t)),
                    product_level_index.get(&(qid, t - 1)),
                ) {
                    coefficients.push((idx_t, -1.0));
                    coefficients.push((idx_prev, 1.0));
                }
                0.0
            } else {
                0.0
            };
            tableau.rows.push(Row {
                description: format!("flow_conservation[{},{t}]", product.id),
                coefficients,
                sense: RowSense::Eq,
                rhs,
            });
        }
    }

    /// Encodes each constraint's active bound lines as a convex-combination
    /// (SOS2-style) row set: one weight variable per knot, weights sum to 1,
    /// and the level ratio is their weighted average of knot x/y values.
    fn add_bound_line_rows(
        &self,
        tableau: &mut Tableau,
        t: i64,
        level_index: &FxHashMap<(ProcessId, i64), usize>,
    ) {
        for (_, constraint) in self.model.constraints.iter() {
            let (NodeRef::Process(from_pid), NodeRef::Process(to_pid)) =
                (constraint.from, constraint.to)
            else {
                continue;
            };
            let (Some(&from_idx), Some(&to_idx)) =
                (level_index.get(&(from_pid, t)), level_index.get(&(to_pid, t)))
            else {
                continue;
            };
            let from_process = self.model.processes.get(from_pid).unwrap();
            let to_process = self.model.processes.get(to_pid).unwrap();
            let from_ub = eval_value_at(self.model, &from_process.id, "ub", t).unwrap_or(1.0);
            let to_ub = eval_value_at(self.model, &to_process.id, "ub", t).unwrap_or(1.0);
            let from_ub = if from_ub.abs() <= NEAR_ZERO { 1.0 } else { from_ub };
            let to_ub = if to_ub.abs() <= NEAR_ZERO { 1.0 } else { to_ub };
            for line in &constraint.bound_lines {
                if !line.selectors.is_empty() {
                    continue; // only selector-free (always active) lines without a combination context
                }
                let mut weight_indices = Vec::with_capacity(line.points.len());
                for _ in &line.points {
                    weight_indices.push(tableau.push_variable(Variable {
                        kind: VariableKind::BoundLineWeight,
                        node: constraint.from,
                        t,
                        lower: 0.0,
                        upper: 1.0,
                        integer: false,
                    }));
                }
                tableau.rows.push(Row {
                    description: format!("bound_line_weights_sum[{},{t}]", constraint.id),
                    coefficients: weight_indices.iter().map(|&i| (i, 1.0)).collect(),
                    sense: RowSense::Eq,
                    rhs: 1.0,
                });
                let x_coeffs: Vec<(usize, f64)> = weight_indices
                    .iter()
                    .zip(&line.points)
                    .map(|(&i, (x, _))| (i, *x / from_ub))
                    .collect();
                let mut from_row = x_coeffs.clone();
                from_row.push((from_idx, -1.0));
                tableau.rows.push(Row {
                    description: format!("bound_line_x[{},{t}]", constraint.id),
                    coefficients: from_row,
                    sense: RowSense::Eq,
                    rhs: 0.0,
                });
                let y_coeffs: Vec<(usize, f64)> = weight_indices
                    .iter()
                    .zip(&line.points)
                    .map(|(&i, (_, y))| (i, *y / to_ub))
                    .collect();
                let mut to_row = y_coeffs;
                to_row.push((to_idx, -1.0));
                tableau.rows.push(Row {
                    description: format!("bound_line_y[{},{t}]", constraint.id),
                    coefficients: to_row,
                    sense: line.bound_type.into(),
                    rhs: 0.0,
                });
            }
        }
    }
}

pub(crate) fn eval_link_rate(model: &Model, link: &Link, t: i64) -> f64 {
    eval_link_expr(model, &link.relative_rate, t).unwrap_or(0.0)
}

pub(crate) fn eval_link_delay(model: &Model, link: &Link, t: i64) -> Option<i64> {
    eval_link_expr(model, &link.flow_delay, t).map(|d| d.floor() as i64)
}

fn eval_link_expr(model: &Model, expr: &linnyr_model::Expr, t: i64) -> Option<f64> {
    let context = linnyr_model::ModelContext::new(model);
    let program = expr.program()?;
    let interpreter = linnyr_eval::Interpreter::new(&context, t, None);
    interpreter.evaluate(&program.program).as_number()
}
