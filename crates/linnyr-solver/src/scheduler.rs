//! Partitions the simulation horizon into blocks, submits each to a
//! [`Solver`], and splices the returned solution back into the model.

use tracing::{debug, info, instrument, warn};

use linnyr_model::{Model, NodeRef};

use crate::costprice::CostPricePropagator;
use crate::solver::{Solution, SolutionStatus, Solver, SolverBlock, SolverError};
use crate::tableau::{Carry, TableauBuilder, VariableKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Preparing,
    AwaitingSolver,
    Ingesting,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub block_length: i64,
    pub look_ahead: i64,
    pub start_period: i64,
    pub end_period: i64,
    pub timeout_period: f64,
}

#[derive(Debug, Clone)]
pub struct BlockMessage {
    pub block_number: u32,
    pub text: String,
}

pub struct BlockScheduler {
    pub state: State,
    pub current_block: u32,
    carry: Carry,
    messages: Vec<BlockMessage>,
}

impl BlockScheduler {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            current_block: 1,
            carry: Carry::default(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[BlockMessage] {
        &self.messages
    }

    /// Runs blocks to completion in ascending order, cooperatively: each
    /// `submit` call is treated as a synchronous round-trip here (a real
    /// host binds an async transport underneath the same [`Solver`] trait).
    #[instrument(skip(self, model, solver, config), fields(start = config.start_period, end = config.end_period))]
    pub fn run(
        &mut self,
        model: &mut Model,
        solver: &mut dyn Solver,
        config: &RunConfig,
    ) -> Result<(), SolverError> {
        let mut block_start = config.start_period;
        self.current_block = 1;
        while block_start <= config.end_period {
            self.state = State::Preparing;
            let block_len = config
                .block_length
                .min(config.end_period - block_start + 1);
            let builder = TableauBuilder::new(model);
            let tableau = builder.build(block_start, block_len, config.look_ahead, &self.carry);
            debug!(block = self.current_block, variables = tableau.variables.len(), "tableau built");

            self.state = State::AwaitingSolver;
            let request = SolverBlock {
                user: "linnyr".to_string(),
                token: String::new(),
                block_number: self.current_block,
                round_code: "0".to_string(),
                columns: tableau.variables.len(),
                data: format!("{} rows", tableau.rows.len()),
                solver: None,
                diagnose: false,
                timeout: config.timeout_period,
                inttol: 1e-6,
                mipgap: 1e-6,
            };
            let solution = match solver.submit(request) {
                Ok(s) => s,
                Err(err) => {
                    self.state = State::Failed;
                    self.messages.push(BlockMessage {
                        block_number: self.current_block,
                        text: err.to_string(),
                    });
                    warn!(block = self.current_block, error = %err, "block submission failed");
                    return Err(err);
                }
            };

            if solution.status == SolutionStatus::Timeout {
                self.state = State::Failed;
                self.messages.push(BlockMessage {
                    block_number: self.current_block,
                    text: "solver timeout".to_string(),
                });
                return Err(SolverError::Timeout(config.timeout_period as u64));
            }
            if solution.status != SolutionStatus::Optimal {
                self.state = State::Failed;
                self.messages.push(BlockMessage {
                    block_number: self.current_block,
                    text: format!("solver status {:?}", solution.status),
                });
                return Err(SolverError::Solver(format!("{:?}", solution.status)));
            }

            self.state = State::Ingesting;
            self.ingest(model, &tableau.variables, &solution, block_start);
            compute_actual_flows(model, block_start, block_len);
            self.messages
                .extend(solution.messages.iter().map(|m| BlockMessage {
                    block_number: self.current_block,
                    text: m.clone(),
                }));

            block_start += block_len;
            self.current_block += 1;
        }

        let run_length = config.end_period - config.start_period + 1;
        CostPricePropagator::new(model).propagate_block(config.start_period, run_length);

        self.state = State::Done;
        info!(blocks = self.current_block - 1, "run complete");
        Ok(())
    }

    fn ingest(
        &mut self,
        model: &mut Model,
        variables: &[crate::tableau::Variable],
        solution: &Solution,
        block_start: i64,
    ) {
        for (variable, &value) in variables.iter().zip(solution.variable_values.iter()) {
            if variable.kind != VariableKind::Level {
                continue;
            }
            match variable.node {
                NodeRef::Process(pid) => {
                    if let Some(process) = model.processes.get_mut(pid) {
                        write_at(&mut process.level, variable.t, value);
                        if variable.t == block_start {
                            self.carry.process_level.insert(pid, value);
                            self.carry.process_on_off.insert(pid, value > 0.0);
                        }
                    }
                }
                NodeRef::Product(qid) => {
                    if let Some(product) = model.products.get_mut(qid) {
                        write_at(&mut product.level, variable.t, value);
                    }
                }
            }
        }
    }
}

impl Default for BlockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives each link's `actual_flow` vector from the levels the scheduler
/// just ingested: `rate(t - delay) * level(process_endpoint, t - delay)`.
/// No tableau variable carries flow directly — it is read off whichever
/// endpoint is a process, matching the rate terms `tableau::
/// add_flow_conservation_rows` builds.
fn compute_actual_flows(model: &mut Model, block_start: i64, block_len: i64) {
    for lid in model.links.creation_order().collect::<Vec<_>>() {
        for t in block_start..block_start + block_len {
            let link = model.links.get(lid).unwrap();
            let delay = crate::tableau::eval_link_delay(model, link, t).unwrap_or(0);
            let source_t = t - delay;
            let process_level = match (link.from, link.to) {
                (NodeRef::Process(pid), _) | (_, NodeRef::Process(pid)) => model
                    .processes
                    .get(pid)
                    .and_then(|p| p.level.get(source_t.max(0) as usize))
                    .copied(),
                _ => None,
            };
            let Some(level) = process_level else { continue };
            let rate = crate::tableau::eval_link_rate(model, model.links.get(lid).unwrap(), source_t);
            let flow = rate * level;
            write_at(&mut model.links.get_mut(lid).unwrap().actual_flow, t, flow);
        }
    }
}

fn write_at(vector: &mut Vec<f64>, t: i64, value: f64) {
    if t < 0 {
        return;
    }
    let t = t as usize;
    if vector.len() <= t {
        vector.resize(t + 1, 0.0);
    }
    vector[t] = value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use linnyr_model::Expr;

    #[test]
    fn trivial_bound_scenario_ingests_levels_into_the_process_vector() {
        let mut model = Model::new();
        let top = model.top_cluster;
        let p = model.add_process("P", top).unwrap();
        let q = model.add_product("Q").unwrap();
        model.processes.get_mut(p).unwrap().upper_bound = Expr::constant("ub", 10.0);
        model.products.get_mut(q).unwrap().upper_bound = Expr::constant("ub", f64::INFINITY);
        model
            .add_link(NodeRef::Process(p), NodeRef::Product(q), Expr::constant("rate", 1.0))
            .unwrap();

        let mut solver = crate::solver::MockSolver::new();
        solver.logon("u").unwrap();
        for block in 0..1 {
            let _ = block;
        }
        // horizon 0..=2 in a single block: 3 level variables for P (no on_off
        // needed since the link carries Positive by default, which does
        // trigger on_off allocation — queue values for level+on_off pairs).
        let builder = TableauBuilder::new(&model);
        let tableau = builder.build(0, 3, 0, &Carry::default());
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

        let mut scheduler = BlockScheduler::new();
        let config = RunConfig {
            block_length: 3,
            look_ahead: 0,
            start_period: 0,
            end_period: 2,
            timeout_period: 30.0,
        };
        scheduler.run(&mut model, &mut solver, &config).unwrap();
        assert_eq!(model.processes.get(p).unwrap().level, vec![10.0, 10.0, 10.0]);
        assert_eq!(scheduler.state, State::Done);
    }
}
