pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::TomlConfig;

pub use adapters::codec::SpreadsheetCodec;
pub use adapters::storage::{AnyStorage, HttpStorage, LocalStorage};
pub use crate::core::{
    engine::ReconcileEngine,
    mapping::MappingStore,
    matcher::FieldMatcher,
    pipeline::ReconcilePipeline,
    session::{ReconcileSession, SessionOptions},
    synthesis::SynthesisEngine,
};
pub use utils::error::{ReconcileError, Result};
