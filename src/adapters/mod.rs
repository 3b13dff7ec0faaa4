// Adapters layer: concrete implementations for external systems (workbook files, storage backends).

pub mod codec;
pub mod storage;
