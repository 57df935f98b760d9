//! Link-set diffing and deterministic fingerprints.
//!
//! Hashes are sha256 over canonical JSON (sorted keys, no whitespace), so
//! two hashes are equal iff the serialized forms are byte-equal.

use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Fingerprint of a link list in its stored order.
pub fn snapshot_hash_for_links(links: &[String]) -> String {
    // serde_json compact output matches the canonical form byte for byte.
    let json = serde_json::to_string(links).unwrap_or_default();
    sha256_hex(&json)
}

/// Deduplicate, keeping the first occurrence order.
pub fn dedupe_preserve_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.into();
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// Set difference in both directions; each result is sorted.
pub fn diff_links(old_links: &[String], new_links: &[String]) -> (Vec<String>, Vec<String>) {
    let old_set: HashSet<&str> = old_links.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new_links.iter().map(String::as_str).collect();

    let mut added: Vec<String> = new_set
        .difference(&old_set)
        .map(|s| s.to_string())
        .collect();
    let mut removed: Vec<String> = old_set
        .difference(&new_set)
        .map(|s| s.to_string())
        .collect();
    added.sort();
    removed.sort();
    (added, removed)
}

/// A diff ready for the queue: the sorted added set plus its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPayload {
    pub site: String,
    pub added_urls: Vec<String>,
    pub diff_hash: String,
}

// Field order is the canonical (alphabetical) key order of the hash input.
#[derive(Serialize)]
struct DiffHashInput<'a> {
    added_urls: &'a [String],
    site: &'a str,
}

/// Build the canonical diff payload for `site`. The hash covers
/// `{added_urls: sorted unique set, site}`.
pub fn build_diff_payload(site: &str, added_urls: &[String]) -> DiffPayload {
    let mut sorted = dedupe_preserve_order(added_urls.iter().cloned());
    sorted.sort();

    let input = DiffHashInput {
        added_urls: &sorted,
        site,
    };
    let json = serde_json::to_string(&input).unwrap_or_default();

    DiffPayload {
        site: site.to_string(),
        added_urls: sorted,
        diff_hash: sha256_hex(&json),
    }
}
