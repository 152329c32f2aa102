use crate::config::ScopePolicy;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_lens::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the last two labels of a host (`blog.example.com` -> `example.com`)
///
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    let host = host.to_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }
    labels[labels.len() - 2..].join(".")
}

/// Site home: `scheme://[user:pass@]host[:port]` with no path
///
/// Credentials are kept so that sitemap probes against protected sites
/// authenticate the same way the seed does.
pub fn site_home(url: &Url) -> String {
    let mut home = format!("{}://", url.scheme());
    if !url.username().is_empty() {
        home.push_str(url.username());
        if let Some(password) = url.password() {
            home.push(':');
            home.push_str(password);
        }
        home.push('@');
    }
    if let Some(host) = url.host_str() {
        home.push_str(host);
    }
    if let Some(port) = url.port() {
        home.push_str(&format!(":{}", port));
    }
    home
}

/// Checks whether `candidate` belongs to the same site as `root`
pub fn in_scope(root: &Url, candidate: &Url, policy: ScopePolicy) -> bool {
    let (Some(root_host), Some(candidate_host)) = (root.host_str(), candidate.host_str()) else {
        // file:// pages only link to other local files
        return root.scheme() == candidate.scheme() && root.host_str().is_none();
    };

    match policy {
        ScopePolicy::SameHostname => {
            root_host.eq_ignore_ascii_case(candidate_host)
                && root.port_or_known_default() == candidate.port_or_known_default()
        }
        ScopePolicy::SameDomain => {
            registrable_domain(root_host) == registrable_domain(candidate_host)
        }
    }
}
