// Domain layer: workbook model, mapping keys, generation options and ports.

pub mod keys;
pub mod model;
pub mod options;
pub mod ports;
