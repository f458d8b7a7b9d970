use super::CanonicalIdentity;
use url::Url;

/// Hosts whose projects are addressed by a single path segment
const SINGLE_SEGMENT_HOSTS: &[&str] = &["osf.io"];

/// DOI prefix under which OSF registers project keys
const OSF_DOI_PREFIX: &str = "10.17605";

/// Normalizes a raw URL or identifier into a canonical identity
///
/// # Normalization Steps
///
/// 1. Trim and lowercase the input
/// 2. Accept `http://`, `https://`, scp-style `git@host:owner/id` or a bare `host/...`
/// 3. Remove `www.` prefix from the host
/// 4. Drop query string, fragment and empty path segments (trailing slashes)
/// 5. Rewrite `doi.org/10.17605/osf.io/<key>` to `osf.io/<key>`
/// 6. Take `owner/id` from the first two path segments, or `id` alone on
///    single-segment hosts
/// 7. Strip a trailing `.git` from the id
///
/// # Arguments
///
/// * `raw` - The URL or identifier to normalize
///
/// # Returns
///
/// * `Some(CanonicalIdentity)` - The normalized identity
/// * `None` - The input has no host or too few path segments
///
/// # Examples
///
/// ```
/// use osh_harvest::identity::normalize_identity;
///
/// let a = normalize_identity("https://github.com/acme/widget").unwrap();
/// let b = normalize_identity("https://github.com/acme/widget.git/").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "github.com/acme/widget");
/// ```
pub fn normalize_identity(raw: &str) -> Option<CanonicalIdentity> {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    let with_scheme = if let Some(rest) = lowered.strip_prefix("git@") {
        format!("https://{}", rest.replacen(':', "/", 1))
    } else if lowered.starts_with("http://") || lowered.starts_with("https://") {
        lowered
    } else if lowered.contains("://") {
        return None;
    } else {
        format!("https://{}", lowered)
    };

    let url = Url::parse(&with_scheme).ok()?;
    let mut host = url.host_str()?.trim_start_matches("www.").to_string();
    if !host.contains('.') {
        return None;
    }

    let mut segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    // Only OSF DOIs resolve to a project; other DOIs name papers, not repositories
    if host == "doi.org" || host.ends_with(".doi.org") {
        if segments.len() < 3 || segments[0] != OSF_DOI_PREFIX || segments[1] != "osf.io" {
            return None;
        }
        host = "osf.io".to_string();
        segments.drain(..2);
    }

    if SINGLE_SEGMENT_HOSTS.contains(&host.as_str()) {
        let key = strip_git_suffix(segments.first()?);
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        return Some(CanonicalIdentity::new(host, "", key));
    }

    let owner = *segments.first()?;
    let id = strip_git_suffix(segments.get(1)?);
    if id.is_empty() {
        return None;
    }

    Some(CanonicalIdentity::new(host, owner, id))
}

/// Normalizes every identity in a field that may hold several comma-separated URLs
///
/// Unparseable parts are skipped; duplicates are kept once, in first-seen order.
pub fn identities_in(field: &str) -> Vec<CanonicalIdentity> {
    let mut identities = Vec::new();
    for part in field.split(',') {
        if let Some(identity) = normalize_identity(part) {
            if !identities.contains(&identity) {
                identities.push(identity);
            }
        }
    }
    identities
}

fn strip_git_suffix(segment: &str) -> &str {
    segment.strip_suffix(".git").unwrap_or(segment)
}
