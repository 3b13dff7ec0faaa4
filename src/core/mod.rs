pub mod engine;
pub mod mapping;
pub mod matcher;
pub mod pipeline;
pub mod session;
pub mod synthesis;

pub use crate::domain::model::{ExtractedInputs, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
