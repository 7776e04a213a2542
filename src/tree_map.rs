//! Tree map (§3 "Tree map"): a mapping from path key to value supporting
//! exact add/lookup, wildcard-subtree iteration, and find-with-fallback.

use crate::path_key::PathKey;
use std::collections::HashMap;

/// Key used internally: components plus wildcard flag, distinct entries for
/// wildcard and non-wildcard keys at the same path (§3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    components: Vec<String>,
    wildcard: bool,
}

/// A single find-with-fallback match: how many leading components of the
/// search key were consumed, the matched value, and the unconsumed remainder.
pub struct Match<'a, V> {
    pub matched_len: usize,
    pub value: &'a V,
    pub remainder: PathKey,
}

/// Mapping from [`PathKey`] to `V`. No duplicate keys; a wildcard and a
/// non-wildcard entry may coexist at the same path.
#[derive(Debug, Default)]
pub struct TreeMap<V> {
    entries: HashMap<EntryKey, V>,
}

impl<V> TreeMap<V> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Adds an exact entry. Returns `Err` with the previous value's key if
    /// a duplicate key already exists (§3 invariant: no duplicate key).
    pub fn add(&mut self, key: &PathKey, value: V) -> Result<(), String> {
        let ek = EntryKey { components: key.components().to_vec(), wildcard: key.is_wildcard() };
        if self.entries.contains_key(&ek) {
            return Err(format!("duplicate key {key}"));
        }
        self.entries.insert(ek, value);
        Ok(())
    }

    /// Exact lookup: the key must equal an existing entry's key and wildcard
    /// flag precisely.
    pub fn get_exact(&self, key: &PathKey) -> Option<&V> {
        let ek = EntryKey { components: key.components().to_vec(), wildcard: key.is_wildcard() };
        self.entries.get(&ek)
    }

    /// Iterates all entries whose path lies within the subtree rooted at a
    /// wildcard key (i.e. the entry's components start with `root`'s
    /// components).
    pub fn subtree(&self, root: &PathKey) -> impl Iterator<Item = (&Vec<String>, bool, &V)> {
        let prefix = root.components().to_vec();
        self.entries.iter().filter_map(move |(k, v)| {
            if k.components.len() >= prefix.len() && k.components[..prefix.len()] == prefix[..] {
                Some((&k.components, k.wildcard, v))
            } else {
                None
            }
        })
    }

    /// Find-with-fallback (§3, "Find-with-fallback" in GLOSSARY): yields
    /// matches from most-specific (an exact entry equal to the full search
    /// key) to least-specific (the shortest matching wildcard entry),
    /// together with the unconsumed remainder of the search key.
    pub fn find_with_fallback(&self, search: &PathKey) -> Vec<Match<'_, V>> {
        let comps = search.components();
        let n = comps.len();
        let mut out = Vec::new();

        let exact_key = EntryKey { components: comps.to_vec(), wildcard: false };
        if let Some(v) = self.entries.get(&exact_key) {
            out.push(Match { matched_len: n, value: v, remainder: PathKey::empty() });
        }

        for len in (0..=n).rev() {
            let wc_key = EntryKey { components: comps[..len].to_vec(), wildcard: true };
            if let Some(v) = self.entries.get(&wc_key) {
                out.push(Match {
                    matched_len: len,
                    value: v,
                    remainder: PathKey::new(comps[len..].to_vec(), false),
                });
            }
        }

        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut map: TreeMap<&'static str> = TreeMap::new();
        map.add(&PathKey::new(vec!["api".into()], true), "appA").unwrap();
        map.add(&PathKey::new(vec!["api".into(), "v1".into()], true), "appB").unwrap();

        let search = PathKey::from_url_path("/api/v1/users/3");
        let matches = map.find_with_fallback(&search);
        assert_eq!(matches[0].value, &"appB");
        assert_eq!(matches[0].remainder.components(), &["users", "3"]);
        assert_eq!(matches[1].value, &"appA");
    }

    #[test]
    fn no_duplicate_keys() {
        let mut map: TreeMap<i32> = TreeMap::new();
        let k = PathKey::new(vec!["x".into()], false);
        map.add(&k, 1).unwrap();
        assert!(map.add(&k, 2).is_err());
    }

    #[test]
    fn exact_and_wildcard_coexist() {
        let mut map: TreeMap<&'static str> = TreeMap::new();
        let exact = PathKey::new(vec!["x".into()], false);
        let wc = PathKey::new(vec!["x".into()], true);
        map.add(&exact, "exact").unwrap();
        map.add(&wc, "wild").unwrap();
        assert_eq!(map.len(), 2);
    }
}
