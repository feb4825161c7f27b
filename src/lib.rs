//! autocv: job listing ingestion, deduplicated storage and CV tailoring.

pub mod ai;
pub mod config;
pub mod cv;
pub mod dates;
pub mod db;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod source;
