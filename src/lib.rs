//! Species stream-order probability pipeline.
//!
//! Loads a flowline network, watershed polygons and species ranges, derives
//! a per-species stream order threshold, and writes one probability column
//! per species into a table keyed by segment id.

pub mod analysis;
pub mod config;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod spatial;
pub mod table;
