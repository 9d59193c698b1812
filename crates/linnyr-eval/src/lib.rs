pub mod context;
pub mod engine;
pub mod interpreter;

pub use context::{EvaluationContext, is_wildcard_name};
pub use engine::{CompiledExpression, Evaluator, Frame};
pub use interpreter::Interpreter;
