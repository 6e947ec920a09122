pub mod branching;
pub mod column_generation;
pub mod config;
pub mod error;
pub mod extract;
pub mod lp;
pub mod master;
pub mod model;
pub mod pricing;
pub mod problems;

pub use branching::{BnpSolution, BranchAndPrice, SearchStatus};
pub use config::BnpConfig;
pub use error::{Error, Result};
