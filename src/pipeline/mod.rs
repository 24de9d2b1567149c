//! Dialogue processing pipeline.

pub mod analysis;
