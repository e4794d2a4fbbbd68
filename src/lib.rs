pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::CliConfig;

pub use adapters::storage::{InMemoryPlaceStore, JsonPlaceStore, LocalStorage};
pub use app::pipelines::PlacePipeline;
pub use config::TomlConfig;
pub use core::etl::{EtlEngine, RunReport, RunStats};
pub use utils::error::{EtlError, Result};
