//! Retrieval of `ads.txt` files for the collection stage.
//!
//! - HTTPS fetch of `https://{domain}/ads.txt` with a bounded worker pool
//! - Offline source reading `{dir}/{domain}.txt` for reproducible runs

pub mod client;
pub mod fetcher;
pub mod offline;

pub use client::*;
pub use fetcher::*;
pub use offline::*;
