//! Export orchestration for accessreport.
//!
//! This crate ties together seed acquisition, per-user enrichment, record
//! projection, and the CSV writer into one end-to-end workflow
//! ([`pipeline::run_export`]).

pub mod enrichment;
pub mod pipeline;
pub mod projection;
pub mod seed;
