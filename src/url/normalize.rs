use crate::UrlError;
use url::Url;

/// Canonicalizes a URL so that every spelling of the same page maps to one key
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http`, `https` and `file` schemes
/// 3. Lowercase the scheme and host (done by the parser) and drop default ports
/// 4. Drop userinfo credentials
/// 5. Normalize path:
///    - Remove dot segments (. and ..) and repeated slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 6. Remove fragment (everything after #)
/// 7. Keep the query string as-is, dropping only an empty trailing `?`
///
/// # Examples
///
/// ```
/// use sumi_lens::url::canonicalize_url;
///
/// let a = canonicalize_url("https://X.com/a/#frag").unwrap();
/// let b = canonicalize_url("https://x.com/a").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://x.com/a");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    // Step 1: Parse the URL
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    // Step 2: Validate scheme
    match url.scheme() {
        "http" | "https" => {
            if url.host_str().is_none() {
                return Err(UrlError::MissingDomain);
            }
        }
        "file" => {}
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "Only http, https and file schemes are supported, got: {}",
                other
            )))
        }
    }

    // Step 4: Strip credentials
    if !url.username().is_empty() || url.password().is_some() {
        url.set_username("")
            .map_err(|_| UrlError::Malformed(format!("Cannot strip username from {}", url)))?;
        url.set_password(None)
            .map_err(|_| UrlError::Malformed(format!("Cannot strip password from {}", url)))?;
    }

    // Step 5: Normalize path
    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    // Step 6: Remove fragment
    url.set_fragment(None);

    // Step 7: Drop an empty query
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and trailing slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}
