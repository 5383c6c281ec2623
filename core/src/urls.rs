//! Helpers for FHIR base URLs and pagination links.
//!
//! Servers hand back `next` links either as absolute URLs or as paths
//! relative to the FHIR base. A relative link is merged onto the base path
//! (not resolved against the host root), so `/Patient?page=2` under
//! `https://h/fhir` lands on `https://h/fhir/Patient?page=2`.

use url::Url;

/// True if `url` carries a scheme and a host, e.g. `https://h/fhir/Patient`.
///
/// `localhost:8080/fhir` parses as scheme `localhost` with no host, so it
/// counts as relative.
pub fn is_absolute(url: &str) -> bool {
    Url::parse(url).map(|u| u.has_host()).unwrap_or(false)
}

/// Resolve `link` against `base`.
///
/// Absolute links are returned unchanged. Relative links are appended to the
/// base path with exactly one `/` between them, regardless of a trailing
/// slash on `base` or a leading slash on `link`. A query-only link
/// (`?page=2`) replaces nothing and is glued directly onto the base.
pub fn resolve(base: &str, link: &str) -> String {
    if is_absolute(link) {
        return link.to_string();
    }
    let base = base.trim_end_matches('/');
    if link.starts_with('?') {
        return format!("{base}{link}");
    }
    let path = link.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{path}")
}
