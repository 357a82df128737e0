//! Configuration module for cdx-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use cdx_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Requests time out after {}s", config.request.timeout_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CommonCrawlConfig, Config, RequestConfig, RunConfig, SourcesConfig, WaybackConfig,
};

// Re-export parser and validation functions
pub use parser::{load_config, load_or_default, parse_config};
pub use validation::{validate, validate_date_bound, KNOWN_SOURCES};
