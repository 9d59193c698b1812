//! The external solver boundary: consumed, never implemented here.

use thiserror::Error;

/// One block's worth of tableau data, shaped for transport to an external
/// solver process — mirrors the wire fields an HTTP/IPC binding would need,
/// without committing to a transport.
#[derive(Debug, Clone)]
pub struct SolverBlock {
    pub user: String,
    pub token: String,
    pub block_number: u32,
    pub round_code: String,
    pub columns: usize,
    pub data: String,
    pub solver: Option<String>,
    pub diagnose: bool,
    pub timeout: f64,
    pub inttol: f64,
    pub mipgap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    Optimal,
    Infeasible,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub block: u32,
    pub round: u32,
    pub status: SolutionStatus,
    pub solver_seconds: f64,
    pub messages: Vec<String>,
    pub variable_values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct LogonInfo {
    pub token: String,
    pub preferred_solver: String,
    pub available_solvers: Vec<String>,
    pub working_directory: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver timed out after {0}s")]
    Timeout(u64),
    #[error("solver returned an error: {0}")]
    Solver(String),
    #[error("not logged on")]
    NotLoggedOn,
}

/// The boundary the scheduler calls through. Implemented by the HTTP/IPC
/// binding to an actual solver process in a host application; this crate
/// only consumes it, per the "Solver interface (consumed, not implemented)"
/// contract — `MockSolver` below exists purely to exercise the scheduler and
/// propagator in tests.
pub trait Solver {
    fn logon(&mut self, user: &str) -> Result<LogonInfo, SolverError>;
    fn logout(&mut self) -> Result<(), SolverError>;
    fn submit(&mut self, block: SolverBlock) -> Result<Solution, SolverError>;
}

/// A fixture solver for tests: returns whatever solution the test queued up
/// for the next `submit`, rather than solving anything. Submissions beyond
/// the queue return `SolverError::Solver`, so a test can assert exactly how
/// many blocks a scenario should submit.
#[derive(Default)]
pub struct MockSolver {
    logged_on: bool,
    queued_solutions: std::collections::VecDeque<Solution>,
}

impl MockSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, solution: Solution) {
        self.queued_solutions.push_back(solution);
    }
}

impl Solver for MockSolver {
    fn logon(&mut self, _user: &str) -> Result<LogonInfo, SolverError> {
        self.logged_on = true;
        Ok(LogonInfo {
            token: "mock-token".to_string(),
            preferred_solver: "mock".to_string(),
            available_solvers: vec!["mock".to_string()],
            working_directory: ".".to_string(),
        })
    }

    fn logout(&mut self) -> Result<(), SolverError> {
        self.logged_on = false;
        Ok(())
    }

    fn submit(&mut self, block: SolverBlock) -> Result<Solution, SolverError> {
        if !self.logged_on {
            return Err(SolverError::NotLoggedOn);
        }
        self.queued_solutions
            .pop_front()
            .map(|mut solution| {
                solution.block = block.block_number;
                solution
            })
            .ok_or_else(|| SolverError::Solver("no queued solution".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitting_without_logon_is_rejected() {
        let mut solver = MockSolver::new();
        let block = SolverBlock {
            user: "u".into(),
            token: "t".into(),
            block_number: 1,
            round_code: "0".into(),
            columns: 0,
            data: String::new(),
            solver: None,
            diagnose: false,
            timeout: 30.0,
            inttol: 1e-6,
            mipgap: 1e-6,
        };
        assert_eq!(solver.submit(block), Err(SolverError::NotLoggedOn));
    }

    #[test]
    fn queued_solution_is_returned_with_block_number_stamped() {
        let mut solver = MockSolver::new();
        solver.logon("u").unwrap();
        solver.queue(Solution {
            block: 0,
            round: 0,
            status: SolutionStatus::Optimal,
            solver_seconds: 0.01,
            messages: Vec::new(),
            variable_values: vec![1.0, 2.0],
        });
        let block = SolverBlock {
            user: "u".into(),
            token: "t".into(),
            block_number: 7,
            round_code: "0".into(),
            columns: 2,
            data: String::new(),
            solver: None,
            diagnose: false,
            timeout: 30.0,
            inttol: 1e-6,
            mipgap: 1e-6,
        };
        let solution = solver.submit(block).unwrap();
        assert_eq!(solution.block, 7);
        assert_eq!(solution.variable_values, vec![1.0, 2.0]);
    }
}
