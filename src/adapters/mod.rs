// Adapters layer: concrete implementations for external systems (http, listing site, places API, storage).

pub mod enrichment;
pub mod export;
pub mod http;
pub mod listing;
pub mod storage;
