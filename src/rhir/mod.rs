//! Relational high-level IR: the arena of entities produced by the front end,
//! a fixed-point control-flow optimizer, and a declarative JSON builder.

pub mod builder;
pub mod context;
pub mod entities;
pub mod optimizer;

pub use builder::{ModelFile, RhirBuilder};
pub use context::RhirContext;
pub use entities::*;
pub use optimizer::CfOptimizer;
