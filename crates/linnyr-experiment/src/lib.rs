pub mod combination;
pub mod rle;
pub mod runner;
pub mod stats;

pub use combination::CombinationError;
pub use runner::{ExperimentError, ExperimentRunner};
