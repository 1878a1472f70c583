//! Core pipeline orchestration and domain logic for riskclause.
//!
//! This crate ties together the risk model, document segmentation, clause
//! classification, result accumulation, and report aggregation into the
//! end-to-end `analyze` workflow.

pub mod accumulator;
pub mod aggregator;
pub mod pipeline;
