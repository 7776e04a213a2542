//! Path keys (§3 "Path key"): ordered sequences of string components plus a
//! wildcard flag, used for both reversed hostname paths and URL paths.

use std::fmt;

/// An immutable, ordered sequence of path components plus a wildcard flag.
///
/// Hostname paths are stored reversed (`a.b.c` -> `[c, b, a]`); URL paths are
/// stored in natural order (`/x/y/` -> `[x, y, ""]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    path: Vec<String>,
    wildcard: bool,
}

impl PathKey {
    pub fn new(path: Vec<String>, wildcard: bool) -> Self {
        Self { path, wildcard }
    }

    pub fn empty() -> Self {
        Self { path: Vec::new(), wildcard: false }
    }

    pub fn components(&self) -> &[String] {
        &self.path
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Parses a dotted hostname into a reversed path key. `*` and `*.foo.bar`
    /// are wildcards; the `*` component itself is dropped from the stored path.
    pub fn from_hostname(hostname: &str) -> Self {
        if hostname == "*" {
            return Self { path: Vec::new(), wildcard: true };
        }
        let wildcard = hostname.starts_with("*.");
        let rest = if wildcard { &hostname[2..] } else { hostname };
        let mut parts: Vec<String> = rest.split('.').map(|s| s.to_string()).collect();
        parts.reverse();
        Self { path: parts, wildcard }
    }

    /// Formats a reversed hostname path key back into dotted form.
    pub fn to_hostname(&self) -> String {
        if self.path.is_empty() {
            return "*".to_string();
        }
        let mut parts = self.path.clone();
        parts.reverse();
        let joined = parts.join(".");
        if self.wildcard {
            format!("*.{joined}")
        } else {
            joined
        }
    }

    /// Parses a URL path (`/x/y/`) into a path key. A trailing `/` yields a
    /// trailing empty component, distinguishing directory from file form.
    pub fn from_url_path(path: &str) -> Self {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Self { path: vec![String::new()], wildcard: false };
        }
        let parts: Vec<String> = trimmed.split('/').map(|s| s.to_string()).collect();
        Self { path: parts, wildcard: false }
    }

    /// Formats a URL path key back into a `/`-separated path string.
    pub fn to_url_path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// Whether `self`'s non-wildcard prefix equals `other`'s full path, i.e.
    /// `self` (a key being looked up) matches a wildcard key `other`.
    pub fn matches_wildcard_prefix(&self, other: &PathKey) -> bool {
        debug_assert!(other.wildcard);
        if self.path.len() < other.path.len() {
            return false;
        }
        self.path[..other.path.len()] == other.path[..]
    }

    /// True iff `prefix`'s components are an exact prefix of `self`'s
    /// components (used by longest-prefix routing independent of wildcard
    /// flags on `self`).
    pub fn has_prefix(&self, prefix: &[String]) -> bool {
        if self.path.len() < prefix.len() {
            return false;
        }
        self.path[..prefix.len()] == *prefix
    }

    /// Splits off the given prefix length, returning the remainder as a new
    /// non-wildcard key (used to compute `extra` after a router consumes a
    /// prefix of `base`/`extra`, see §3 "Dispatch info").
    pub fn remainder(&self, prefix_len: usize) -> PathKey {
        PathKey::new(self.path[prefix_len.min(self.path.len())..].to_vec(), false)
    }

    /// The first `n` components, as a key carrying this key's wildcard flag.
    pub fn take(&self, n: usize) -> PathKey {
        PathKey::new(self.path[..n.min(self.path.len())].to_vec(), self.wildcard)
    }

    pub fn join(&self, suffix: &PathKey) -> PathKey {
        let mut path = self.path.clone();
        path.extend(suffix.path.iter().cloned());
        PathKey::new(path, suffix.wildcard)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.path.join(", "), if self.wildcard { "*" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_round_trip() {
        let key = PathKey::from_hostname("a.example.com");
        assert_eq!(key.components(), &["com", "example", "a"]);
        assert!(!key.is_wildcard());
        assert_eq!(key.to_hostname(), "a.example.com");
    }

    #[test]
    fn wildcard_hostname_round_trip() {
        let key = PathKey::from_hostname("*.example.com");
        assert!(key.is_wildcard());
        assert_eq!(key.to_hostname(), "*.example.com");

        let star = PathKey::from_hostname("*");
        assert!(star.is_wildcard());
        assert!(star.is_empty());
        assert_eq!(star.to_hostname(), "*");
    }

    #[test]
    fn url_path_round_trip() {
        let key = PathKey::from_url_path("/x/y/");
        assert_eq!(key.components(), &["x", "y", ""]);
        assert_eq!(key.to_url_path(), "/x/y/");

        let key2 = PathKey::from_url_path("/foo");
        assert_eq!(key2.to_url_path(), "/foo");
    }

    #[test]
    fn wildcard_prefix_match() {
        let wc = PathKey::from_hostname("*.example.com");
        let host = PathKey::from_hostname("a.example.com");
        assert!(host.matches_wildcard_prefix(&wc));
        let other = PathKey::from_hostname("other.net");
        assert!(!other.matches_wildcard_prefix(&wc));
    }
}
