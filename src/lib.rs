//! Chain Intel Library
//!
//! Multi-chain trading intelligence: trade reconstruction from raw transfers,
//! PNL and wallet tiering, common-trader intersection and deployer scoring.

pub mod chain;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use chain::{Chain, TokenSpec};
pub use config::Config;
pub use error::{Error, Result};
pub use service::IntelService;
