//! URL canonicalization.
//!
//! Every URL is stored and compared in a single canonical form:
//! `https://<host>[:port][path][?query][#fragment]` with a lowercased host,
//! a single leading `www.` stripped, and no trailing slash. Host comparison
//! is case-insensitive per RFC 3986; path and query are preserved verbatim.
//! Forcing `https` collapses the most common accidental duplicate.

use url::Url;

/// Canonicalize a raw, user-supplied URL.
///
/// Unparseable input falls back to a best-effort authority lowercasing that
/// preserves the rest of the string verbatim, so equality checks stay stable
/// even for garbage input.
pub fn canonical(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = match Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some() => url,
        _ => return fallback(trimmed),
    };

    // The url crate already lowercases registered-name hosts.
    let host = strip_www(parsed.host_str().unwrap_or_default());
    let port = parsed
        .port()
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    let path = canonical_path(parsed.path());
    let query = parsed
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let fragment = parsed
        .fragment()
        .map(|f| format!("#{f}"))
        .unwrap_or_default();

    format!("https://{host}{port}{path}{query}{fragment}")
}

/// True when the two URLs canonicalize to the same string.
pub fn equivalent(a: &str, b: &str) -> bool {
    canonical(a) == canonical(b)
}

/// The match set used by `*_by_url` repository queries: the raw input plus
/// the canonical, bare-host, and scheme-prefixed forms. New rows always
/// store the canonical form; the extra variants tolerate legacy rows written
/// before normalization was enforced.
pub fn variants(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let canonical = canonical(trimmed);
    let bare_raw = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let bare_canonical = canonical.strip_prefix("https://").unwrap_or(&canonical);

    let mut set = vec![
        trimmed.to_string(),
        canonical.clone(),
        bare_canonical.to_string(),
        format!("http://{bare_raw}"),
        format!("https://{bare_raw}"),
    ];
    set.dedup();
    // Dedup again across non-adjacent duplicates without losing order.
    let mut seen = Vec::with_capacity(set.len());
    for v in set.drain(..) {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    seen
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Drop a lone `/`; drop a single trailing slash from longer paths.
fn canonical_path(path: &str) -> &str {
    if path == "/" {
        ""
    } else if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Best-effort canonicalization for input the parser rejects: lowercase the
/// authority, strip `www.`, keep everything after it untouched.
fn fallback(trimmed: &str) -> String {
    let bare = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let split_at = bare.find(['/', '?', '#']).unwrap_or(bare.len());
    let (authority, rest) = bare.split_at(split_at);
    let authority = authority.to_ascii_lowercase();
    let authority = authority.strip_prefix("www.").unwrap_or(&authority);
    format!("https://{authority}{rest}")
}
