use crate::config::types::{
    Config, CrawlSection, DeviceKind, DeviceSection, EvaluatorConfig, FilterSection,
    OutputConfig, ScanSection, ScanType, UserAgentConfig,
};
use crate::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

/// Smallest allowed custom viewport width
pub const MIN_VIEWPORT_WIDTH: u32 = 320;

/// Largest allowed custom viewport width
pub const MAX_VIEWPORT_WIDTH: u32 = 1080;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scan_section(&config.scan)?;
    validate_crawl_section(&config.crawl)?;
    validate_device_section(&config.device)?;
    validate_filters(&config.filters)?;
    validate_headers(&config.headers)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_evaluator(&config.evaluator)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the scan target
fn validate_scan_section(scan: &ScanSection) -> Result<(), ConfigError> {
    if scan.url.trim().is_empty() {
        return Err(ConfigError::Validation("scan url cannot be empty".to_string()));
    }

    match scan.scan_type {
        ScanType::Custom => Err(ConfigError::Unsupported(
            "custom flow scans need an interactive browser session".to_string(),
        )),
        ScanType::LocalFile => Ok(()),
        _ => validate_seed_url(&scan.url),
    }
}

/// Validates a seed URL: must parse and use http(s)
pub fn validate_seed_url(seed: &str) -> Result<(), ConfigError> {
    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use http or https",
            seed
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has no host",
            seed
        )));
    }

    Ok(())
}

/// Validates crawl budget values
fn validate_crawl_section(crawl: &CrawlSection) -> Result<(), ConfigError> {
    if crawl.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            crawl.max_pages
        )));
    }

    if crawl.max_concurrency < 1 || crawl.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and 100, got {}",
            crawl.max_concurrency
        )));
    }

    if crawl.navigation_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "navigation_timeout_ms must be >= 100ms, got {}ms",
            crawl.navigation_timeout_ms
        )));
    }

    if crawl.max_retries > 5 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= 5, got {}",
            crawl.max_retries
        )));
    }

    if crawl.max_sitemap_links == Some(0) {
        return Err(ConfigError::Validation(
            "max_sitemap_links must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates device emulation settings
fn validate_device_section(device: &DeviceSection) -> Result<(), ConfigError> {
    match (device.profile, device.viewport_width) {
        (DeviceKind::Custom, None) => Err(ConfigError::Validation(
            "custom device profile requires viewport-width".to_string(),
        )),
        (DeviceKind::Custom, Some(width)) => validate_viewport_width(width),
        (_, Some(_)) => Err(ConfigError::Validation(
            "viewport-width is only valid with the custom device profile".to_string(),
        )),
        (_, None) => Ok(()),
    }
}

/// Validates a custom viewport width
pub fn validate_viewport_width(width: u32) -> Result<(), ConfigError> {
    if !(MIN_VIEWPORT_WIDTH..=MAX_VIEWPORT_WIDTH).contains(&width) {
        return Err(ConfigError::Validation(format!(
            "viewport width must be between {} and {}, got {}",
            MIN_VIEWPORT_WIDTH, MAX_VIEWPORT_WIDTH, width
        )));
    }
    Ok(())
}

/// Validates blacklist patterns and excluded extensions
fn validate_filters(filters: &FilterSection) -> Result<(), ConfigError> {
    for pattern in &filters.blacklist {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern(
                "Blacklist pattern cannot be empty".to_string(),
            ));
        }

        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", pattern, e)))?;
    }

    for ext in &filters.excluded_extensions {
        if ext.is_empty() || ext.contains('.') || ext.contains('/') {
            return Err(ConfigError::Validation(format!(
                "excluded extension must be a bare suffix like \"png\", got '{}'",
                ext
            )));
        }
    }

    Ok(())
}

/// Validates extra request headers
fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    for (name, value) in headers {
        reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::Validation(format!("Invalid header name '{}'", name)))?;
        reqwest::header::HeaderValue::from_str(value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}

fn validate_evaluator(config: &EvaluatorConfig) -> Result<(), ConfigError> {
    if let Some(program) = config.command.first() {
        if program.trim().is_empty() {
            return Err(ConfigError::Validation(
                "evaluator command program cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("database_path", &config.database_path),
        ("summary_path", &config.summary_path),
        ("report_path", &config.report_path),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }
    Ok(())
}
