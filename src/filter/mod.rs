//! DNS query filtering.
//!
//! Classifies queried names against a blocklist of canonicalized domain
//! names. Matching is exact full-name only: subdomains of a listed
//! domain are not blocked unless listed themselves.

mod blocklist;

pub use blocklist::Blocklist;

use std::net::Ipv4Addr;

/// Outcome of classifying a single query name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    /// Forward the query upstream.
    Allow,
    /// Answer locally with the sinkhole address.
    Block(Ipv4Addr),
}

/// Classify a query name against the blocklist.
///
/// The name is canonicalized with the same rules applied at load time,
/// so matching is case-insensitive and ignores a trailing dot.
pub fn decide(blocklist: &Blocklist, name: &str, sentinel: Ipv4Addr) -> BlockDecision {
    match canonicalize(name) {
        Some(canonical) if blocklist.contains(&canonical) => BlockDecision::Block(sentinel),
        _ => BlockDecision::Allow,
    }
}

/// Canonical form shared by blocklist entries and query names: trimmed,
/// lower-cased, trailing dot stripped. `None` for names that are empty
/// after trimming.
pub fn canonicalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

    #[test]
    fn canonicalize_lowercases_and_strips() {
        assert_eq!(
            canonicalize("Ads.Example.COM."),
            Some("ads.example.com".to_string())
        );
        assert_eq!(canonicalize("  example.com  "), Some("example.com".to_string()));
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("   "), None);
        assert_eq!(canonicalize("."), None);
    }

    #[test]
    fn decide_blocks_listed_name() {
        let blocklist = Blocklist::from_lines(["ads.example.com"]);

        assert_eq!(
            decide(&blocklist, "ads.example.com", SENTINEL),
            BlockDecision::Block(SENTINEL)
        );
    }

    #[test]
    fn decide_is_case_insensitive() {
        let blocklist = Blocklist::from_lines(["ads.example.com"]);

        assert_eq!(
            decide(&blocklist, "Ads.EXAMPLE.com", SENTINEL),
            BlockDecision::Block(SENTINEL)
        );
    }

    #[test]
    fn decide_allows_unlisted_name() {
        let blocklist = Blocklist::from_lines(["ads.example.com"]);

        assert_eq!(
            decide(&blocklist, "example.com", SENTINEL),
            BlockDecision::Allow
        );
    }

    #[test]
    fn decide_does_not_match_subdomains() {
        let blocklist = Blocklist::from_lines(["example.com"]);

        assert_eq!(
            decide(&blocklist, "ads.example.com", SENTINEL),
            BlockDecision::Allow
        );
    }
}
