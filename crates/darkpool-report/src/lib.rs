//! Report generation for darkpool results: JSON files consumed between stages
//! and colored executive summaries for the terminal.

pub mod json;
pub mod text;
