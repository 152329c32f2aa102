//! Configuration module for Sumi-Lens
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_lens::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scan.toml")).unwrap();
//! println!("Scanning at most {} pages", config.crawl.max_pages);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlBudget, CrawlSection, DeviceKind, DeviceProfile, DeviceSection,
    EvaluatorConfig, FilterSection, OutputConfig, ScanSection, ScanType, ScopePolicy,
    StorageConfig, ThresholdConfig, UserAgentConfig, DEFAULT_EXCLUDED_EXTENSIONS,
};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_seed_url, validate_viewport_width};
