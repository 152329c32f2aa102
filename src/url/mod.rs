//! URL handling module for Sumi-Lens
//!
//! This module provides URL canonicalization, site scope checks, blacklist
//! matching and file-extension detection.

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, in_scope, registrable_domain, site_home};
pub use matcher::{path_extension, BlacklistPatterns};
pub use normalize::canonicalize_url;
