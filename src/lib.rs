//! Pump Cycler Library
//!
//! Resumable multi-account swap cycling for pump.fun tokens: a failover pool
//! of RPC endpoints, seeded share partitioning, an encrypted participant
//! keystore and a checkpointed pump/dump cycle runner.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod orchestrator;
pub mod partition;
pub mod pool;
pub mod random;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::{OrchestratorState, RunSummary, SwapOrchestrator};
