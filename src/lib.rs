pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::http::{router, AppState, GatewayOrchestrator};
pub use adapters::storage::{AuditBackendStore, InMemoryAuditStore, JsonlAuditStore};
pub use config::{ConfigHandle, GatewayConfig};
pub use crate::core::{
    audit::AuditRecorder, orchestrator::RequestOrchestrator, parser::RecordParser,
    reputation::ReputationChecker,
};
pub use utils::error::{GatewayError, Result};
