//! Blocklist of exact domain names.
//!
//! Built once at start-up from an externally supplied list and immutable
//! afterwards, so concurrent lookups need no synchronization. A reload
//! would be an atomic swap of the whole index.

use rustc_hash::FxHashSet;

use super::canonicalize;

/// An immutable set of blocked domains with O(1) average lookup.
pub struct Blocklist {
    domains: FxHashSet<String>,
}

impl Blocklist {
    /// Build a blocklist from raw entries, one domain per line.
    ///
    /// Entries are canonicalized; blank lines, `#` comment lines and
    /// duplicates are discarded rather than treated as errors.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = lines
            .into_iter()
            .filter_map(|line| {
                let line = line.as_ref();
                if line.trim_start().starts_with('#') {
                    return None;
                }
                canonicalize(line)
            })
            .collect();

        Self { domains }
    }

    /// A blocklist that blocks nothing.
    pub fn empty() -> Self {
        Self {
            domains: FxHashSet::default(),
        }
    }

    /// Exact-match lookup. `name` must already be canonical.
    pub fn contains(&self, name: &str) -> bool {
        self.domains.contains(name)
    }

    /// Number of domains in the blocklist.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
