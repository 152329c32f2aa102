//! Robots.txt handling module
//!
//! Fetches robots.txt once per origin and answers allow/deny questions for
//! the politeness filter.

mod cache;
mod parser;

pub use cache::RobotsCache;
pub use parser::ParsedRobots;

use reqwest::Client;

/// Fetches robots.txt for an origin
///
/// Missing files (4xx), server errors and network failures all yield an
/// allow-all ruleset; robots.txt never makes a scan fail.
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `origin` - The origin, e.g. `https://example.com`
pub async fn fetch_robots(client: &Client, origin: &str) -> ParsedRobots {
    let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));

    match client.get(&robots_url).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => {
                tracing::debug!("Loaded robots.txt from {}", robots_url);
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                tracing::warn!("Failed to read robots.txt body from {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(
                "No robots.txt at {} (HTTP {})",
                robots_url,
                response.status().as_u16()
            );
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
