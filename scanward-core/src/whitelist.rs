//! Target URI whitelist validation
//!
//! A web scan target is accepted only when a whitelisted URI of the project
//! covers it: same scheme, host and port, and the whitelisted path is a prefix
//! of the target path.

use url::Url;

/// Returns true when `target` is covered by one of the `whitelist` entries
///
/// An empty whitelist accepts nothing. Entries that are not valid URIs are ignored.
pub fn is_whitelisted<S: AsRef<str>>(target: &str, whitelist: &[S]) -> bool {
    let Ok(target) = Url::parse(target) else {
        return false;
    };

    whitelist
        .iter()
        .filter_map(|entry| Url::parse(entry.as_ref()).ok())
        .any(|allowed| covers(&allowed, &target))
}

fn covers(allowed: &Url, target: &Url) -> bool {
    if allowed.scheme() != target.scheme() {
        return false;
    }

    if allowed.host_str() != target.host_str() || allowed.host_str().is_none() {
        return false;
    }

    if allowed.port_or_known_default() != target.port_or_known_default() {
        return false;
    }

    // prefix must end on a segment boundary, /app covers /app/x but not /apple
    let prefix = allowed.path().trim_end_matches('/');
    match target.path().strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_below_whitelisted_host_is_valid() {
        let whitelist = ["https://www.google.de"];
        assert!(is_whitelisted("https://www.google.de/nerdytest", &whitelist));
    }

    #[test]
    fn test_exact_match_is_valid() {
        let whitelist = ["https://www.google.de"];
        assert!(is_whitelisted("https://www.google.de", &whitelist));
    }

    #[test]
    fn test_path_prefix_ends_on_segment_boundary() {
        let whitelist = ["https://example.org/app/"];
        assert!(is_whitelisted("https://example.org/app", &whitelist));
        assert!(is_whitelisted("https://example.org/app/login", &whitelist));
        assert!(!is_whitelisted("https://example.org/apple", &whitelist));
        assert!(!is_whitelisted("https://example.org/", &whitelist));
    }

    #[test]
    fn test_empty_whitelist_accepts_nothing() {
        let whitelist: [&str; 0] = [];
        assert!(!is_whitelisted("https://www.google.de", &whitelist));
    }

    #[test]
    fn test_other_host_is_invalid() {
        let whitelist = ["https://www.google.de"];
        assert!(!is_whitelisted("https://www.google.com/nerdytest", &whitelist));
    }

    #[test]
    fn test_scheme_must_match() {
        let whitelist = ["https://www.google.de"];
        assert!(!is_whitelisted("http://www.google.de", &whitelist));
    }

    #[test]
    fn test_explicit_default_port_matches() {
        let whitelist = ["https://www.google.de:443"];
        assert!(is_whitelisted("https://www.google.de/a", &whitelist));
        assert!(!is_whitelisted("https://www.google.de:8443/a", &whitelist));
    }

    #[test]
    fn test_path_prefix_must_match() {
        let whitelist = ["https://example.org/app/"];
        assert!(is_whitelisted("https://example.org/app/login", &whitelist));
        assert!(!is_whitelisted("https://example.org/admin", &whitelist));
    }

    #[test]
    fn test_invalid_target_is_invalid() {
        let whitelist = ["https://www.google.de"];
        assert!(!is_whitelisted("not a url", &whitelist));
    }

    #[test]
    fn test_any_entry_may_match() {
        let whitelist = vec![
            "https://a.example.org".to_string(),
            "garbage".to_string(),
            "https://b.example.org".to_string(),
        ];
        assert!(is_whitelisted("https://b.example.org/x", &whitelist));
    }
}
