//! Rendering collaborator and its HTTP-backed implementation
//!
//! The scheduler only sees the [`Renderer`] / [`RenderSession`] traits. The
//! shipped [`HttpRenderer`] returns the served HTML as the DOM snapshot; it
//! does not execute scripts.

use crate::config::{Config, CrawlBudget, DeviceProfile};
use crate::{ConfigError, ScanError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed per visit
const MAX_REDIRECTS: usize = 10;

/// Why a navigation did not produce a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("navigation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl NavigationError {
    pub fn into_scan_error(self, url: &Url) -> ScanError {
        match self {
            Self::Network(message) => ScanError::NetworkFailure {
                url: url.to_string(),
                message,
            },
            Self::Timeout { timeout_ms } => ScanError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms,
            },
        }
    }
}

/// A page as the renderer saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub http_status: u16,
    /// URL after redirects
    pub final_url: Url,
    pub content_type: String,
    /// Serialized DOM snapshot
    pub dom: String,
}

impl RenderedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }

    pub fn is_html(&self) -> bool {
        let content_type = self.content_type.to_ascii_lowercase();
        content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("application/xhtml+xml")
    }
}

/// Per-visit settings handed to the rendering session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitOptions {
    pub device: DeviceProfile,
    pub timeout_ms: u64,
    /// Capture a screenshot alongside the DOM snapshot, when supported
    pub include_screenshots: bool,
}

impl VisitOptions {
    pub fn from_budget(budget: &CrawlBudget) -> Self {
        Self {
            device: budget.device_profile.clone(),
            timeout_ms: budget.navigation_timeout_ms,
            include_screenshots: budget.include_screenshots,
        }
    }
}

/// Hands out rendering sessions, one per worker
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, ScanError>;
}

/// A single rendering context, used by one worker at a time
#[async_trait]
pub trait RenderSession: Send {
    async fn visit(
        &mut self,
        url: &Url,
        options: &VisitOptions,
    ) -> Result<RenderedPage, NavigationError>;

    async fn close(&mut self);
}

/// Builds the HTTP client shared by the renderer and robots/sitemap fetches
///
/// The user agent is `CrawlerName/Version (+ContactURL)`; configured extra
/// headers are sent with every request.
pub fn build_http_client(config: &Config) -> Result<Client, ScanError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::Validation(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::Validation(format!("Invalid header value for '{}': {}", name, e)))?;
        headers.insert(name, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Credentials taken from the seed URL, sent only to the seed's host
#[derive(Debug, Clone)]
struct SeedCredentials {
    host: String,
    username: String,
    password: Option<String>,
}

impl SeedCredentials {
    fn from_seed(seed: &Url) -> Option<Self> {
        if seed.username().is_empty() {
            return None;
        }
        Some(Self {
            host: seed.host_str()?.to_string(),
            username: seed.username().to_string(),
            password: seed.password().map(str::to_string),
        })
    }
}

/// Renderer that fetches pages over HTTP or from the local filesystem
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    credentials: Option<SeedCredentials>,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            credentials: None,
        }
    }

    /// Sends the seed URL's basic-auth credentials to the seed host
    pub fn with_seed_credentials(mut self, seed: &Url) -> Self {
        self.credentials = SeedCredentials::from_seed(seed);
        self
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, ScanError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
            warned_screenshots: false,
        }))
    }
}

struct HttpSession {
    client: Client,
    credentials: Option<SeedCredentials>,
    warned_screenshots: bool,
}

impl HttpSession {
    async fn visit_http(
        &self,
        url: &Url,
        device: &DeviceProfile,
        timeout_ms: u64,
    ) -> Result<RenderedPage, NavigationError> {
        let mut request = self
            .client
            .get(url.clone())
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(agent) = &device.user_agent {
            request = request.header(USER_AGENT, agent);
        }

        if let Some(creds) = &self.credentials {
            if url.host_str() == Some(creds.host.as_str()) {
                request = request.basic_auth(&creds.username, creds.password.as_ref());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        let http_status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let dom = response
            .text()
            .await
            .map_err(|e| classify(e, timeout_ms))?;

        Ok(RenderedPage {
            http_status,
            final_url,
            content_type,
            dom,
        })
    }
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn visit(
        &mut self,
        url: &Url,
        options: &VisitOptions,
    ) -> Result<RenderedPage, NavigationError> {
        if options.include_screenshots && !self.warned_screenshots {
            tracing::warn!("Screenshots requested but the HTTP renderer cannot capture them");
            self.warned_screenshots = true;
        }

        if url.scheme() == "file" {
            return visit_file(url).await;
        }
        self.visit_http(url, &options.device, options.timeout_ms)
            .await
    }

    async fn close(&mut self) {}
}

async fn visit_file(url: &Url) -> Result<RenderedPage, NavigationError> {
    let path = url
        .to_file_path()
        .map_err(|_| NavigationError::Network(format!("not a local path: {}", url)))?;

    match tokio::fs::read_to_string(&path).await {
        Ok(dom) => {
            let content_type = match path.extension().and_then(|e| e.to_str()) {
                Some("html") | Some("htm") | None => "text/html",
                Some("xhtml") => "application/xhtml+xml",
                Some(_) => "application/octet-stream",
            };
            Ok(RenderedPage {
                http_status: 200,
                final_url: url.clone(),
                content_type: content_type.to_string(),
                dom,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RenderedPage {
            http_status: 404,
            final_url: url.clone(),
            content_type: String::new(),
            dom: String::new(),
        }),
        Err(e) => Err(NavigationError::Network(e.to_string())),
    }
}

fn classify(error: reqwest::Error, timeout_ms: u64) -> NavigationError {
    if error.is_timeout() {
        NavigationError::Timeout { timeout_ms }
    } else if error.is_connect() {
        NavigationError::Network(format!("connection failed: {}", error))
    } else {
        NavigationError::Network(error.to_string())
    }
}
