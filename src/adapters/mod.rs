// Adapters layer: concrete implementations for external systems (http surface, audit storage).

pub mod http;
pub mod storage;
