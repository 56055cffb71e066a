//! Library side of the `prep-refresh` binary.

pub mod dataset;
pub mod logging;
pub mod tasks;
