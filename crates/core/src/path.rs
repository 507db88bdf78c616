//! Virtual path canonicalization
//!
//! Virtual paths are tenant-facing, bucket-relative strings. Every
//! path-bearing input is canonicalized here before it reaches a provider,
//! so providers only ever see keys in one consistent form.

/// Internal routing prefix. Paths carrying it are rewritten to the actual
/// provider key by stripping the prefix exactly once.
pub const ROUTING_PREFIX: &str = "app/";

/// Canonicalize a folder path.
///
/// Rules, applied in order:
/// - surrounding whitespace is trimmed
/// - `"/"` (the root) normalizes to the empty string
/// - a leading `/` is stripped; virtual paths are bucket-relative
/// - a trailing `/` is appended if absent, so every folder key is
///   directory-like
///
/// Idempotent: `normalize(normalize(p)) == normalize(p)`. Empty input maps
/// to the empty string (the bucket root) rather than failing; this is a
/// canonicalizer, not an input validator.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return String::new();
    }

    let relative = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if relative.is_empty() {
        return String::new();
    }

    if relative.ends_with('/') {
        relative.to_string()
    } else {
        format!("{relative}/")
    }
}

/// Canonicalize an object key.
///
/// Same rules as [`normalize`] except no trailing `/` is appended: object
/// keys name files, not folders. Also idempotent.
pub fn normalize_key(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return String::new();
    }

    trimmed.strip_prefix('/').unwrap_or(trimmed).to_string()
}

/// Strip the internal routing prefix from a path, exactly once.
///
/// The strip only happens on a literal prefix match; non-prefixed paths
/// pass through untouched. Callers must not apply this recursively.
pub fn strip_routing_prefix(path: &str) -> &str {
    path.strip_prefix(ROUTING_PREFIX).unwrap_or(path)
}

/// Translate a virtual path to the provider-key form: routing prefix
/// stripped, then canonicalized as an object key.
pub fn provider_key(path: &str) -> String {
    normalize_key(strip_routing_prefix(path.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_appends_trailing_slash() {
        assert_eq!(normalize("docs"), "docs/");
        assert_eq!(normalize("docs/reports"), "docs/reports/");
    }

    #[test]
    fn test_normalize_strips_leading_slash() {
        assert_eq!(normalize("/docs/"), "docs/");
        assert_eq!(normalize("/docs"), "docs/");
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(normalize("  docs  "), "docs/");
        assert_eq!(normalize("\t/docs/\n"), "docs/");
    }

    #[test]
    fn test_normalize_idempotent() {
        for input in [
            "", "/", "docs", "/docs", "docs/", "/docs/", "a/b/c", "  x  ", "//",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("/docs/report.pdf"), "docs/report.pdf");
        assert_eq!(normalize_key("docs/report.pdf"), "docs/report.pdf");
        assert_eq!(normalize_key("/"), "");
        assert_eq!(normalize_key(""), "");
    }

    #[test]
    fn test_normalize_key_idempotent() {
        for input in ["", "/", "a.txt", "/a.txt", "docs/a.txt", "  b  "] {
            let once = normalize_key(input);
            assert_eq!(normalize_key(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_strip_routing_prefix() {
        assert_eq!(strip_routing_prefix("app/docs/a.txt"), "docs/a.txt");
        assert_eq!(strip_routing_prefix("docs/a.txt"), "docs/a.txt");
        // Applied exactly once, never recursively
        assert_eq!(strip_routing_prefix("app/app/a.txt"), "app/a.txt");
        // Gate on the full literal, not a shared substring
        assert_eq!(
            strip_routing_prefix("application/a.txt"),
            "application/a.txt"
        );
    }

    #[test]
    fn test_provider_key() {
        assert_eq!(provider_key("app/docs/a.txt"), "docs/a.txt");
        assert_eq!(provider_key("/docs/a.txt"), "docs/a.txt");
        assert_eq!(provider_key(" app/x "), "x");
    }
}
