pub mod arena;
pub mod config;
pub mod context;
pub mod dataset;
pub mod entities;
pub mod expr;
pub mod ids;
pub mod store;
pub mod unit;

pub use arena::{Arena, Id};
pub use config::{ModelConfig, ScaleUnitConfig};
pub use context::ModelContext;
pub use entities::*;
pub use expr::Expr;
pub use store::{Model, NO_ACTOR};
pub use unit::{UnitRegistry, BASE_UNIT};
