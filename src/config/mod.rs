//! Configuration module for KB-Harvest
//!
//! Loads, parses and validates the TOML configuration: process-wide crawl limits,
//! the output database and one `[[job]]` table per documentation site.
//!
//! # Example
//!
//! ```no_run
//! use kb_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Fetch parallelism: {}", config.runtime.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CategoryHierarchy, Config, JobConfig, OutputConfig, RuntimeConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
