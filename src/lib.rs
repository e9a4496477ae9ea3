//! apiprobe: API security testing from API descriptions.
//!
//! Sources in several formats are ingested into one endpoint model, enriched from
//! a code workspace, matched against documentation and probed with attack payloads.

pub mod cli;
pub mod config;
pub mod dast;
pub mod enrichment;
pub mod errors;
pub mod ingest;
pub mod models;
pub mod payloads;
pub mod pipeline;
pub mod rag;
pub mod reporting;
