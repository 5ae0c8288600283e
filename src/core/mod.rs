pub mod audit;
pub mod orchestrator;
pub mod parser;
pub mod reputation;

pub use crate::domain::model::{AuditRecord, InputRecord, OutputRecord, ReputationVerdict};
pub use crate::domain::ports::{AuditStore, ReputationCheck};
pub use crate::utils::error::Result;
