//! Per-block tableau construction, the block scheduler, and the cost-price
//! propagator: the pieces that turn a compiled [`linnyr_model::Model`] into
//! LP/MILP submissions and splice a solver's answer back into it.

pub mod context_eval;
pub mod costprice;
pub mod scheduler;
pub mod solver;
pub mod tableau;

pub use costprice::CostPricePropagator;
pub use scheduler::{BlockMessage, BlockScheduler, RunConfig, State};
pub use solver::{LogonInfo, MockSolver, Solution, SolutionStatus, Solver, SolverBlock, SolverError};
pub use tableau::{Carry, Row, RowSense, Tableau, TableauBuilder, Variable, VariableKind};
