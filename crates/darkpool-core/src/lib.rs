pub mod brokerage;
pub mod centrality;
pub mod clustering;
#[cfg(feature = "louvain")]
pub mod community;
pub mod config;
pub mod error;
pub mod graph;
pub mod integration;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod pools;
pub mod stats;
pub mod types;
pub mod vulnerability;

pub use config::Config;
pub use error::AnalysisError;
pub use graph::BipartiteGraph;
pub use pipeline::{CollectionReport, NetworkReport, Pipeline};
pub use types::*;
