// projeto: lstmcotacao
// file: src/rna/mod.rs

pub mod data;
pub mod metrics;
pub mod model;
pub mod scaler;
pub mod serving;
pub mod storage;
pub mod sweep;
pub mod train;
