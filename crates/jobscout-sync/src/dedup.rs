use std::collections::{BTreeSet, HashSet};

use jobscout_core::RawJobRecord;
use strsim::jaro_winkler;

/// Drop exact repeats within one run; the first occurrence of a
/// `(company, role, location)` key wins.
pub fn dedup_batch(records: Vec<RawJobRecord>) -> Vec<RawJobRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.batch_key()))
        .collect()
}

const ROLE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("sr", "senior"),
    ("snr", "senior"),
    ("jr", "junior"),
    ("mgr", "manager"),
    ("assoc", "associate"),
    ("vp", "vice president"),
];

#[derive(Debug, Clone, Copy)]
pub struct RoleMatchConfig {
    pub token_overlap_threshold: f64,
    pub similarity_threshold: f64,
}

impl Default for RoleMatchConfig {
    fn default() -> Self {
        Self {
            token_overlap_threshold: 0.8,
            similarity_threshold: 0.95,
        }
    }
}

/// Lowercased title with bracketed qualifiers removed, punctuation flattened
/// and common abbreviations expanded.
pub fn normalize_role(role: &str) -> String {
    let mut depth = 0usize;
    let mut flat = String::with_capacity(role.len());
    for c in role.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            c if c.is_alphanumeric() => flat.extend(c.to_lowercase()),
            _ => flat.push(' '),
        }
    }
    flat.split_whitespace()
        .map(|token| {
            ROLE_ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == token)
                .map_or(token, |(_, long)| *long)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let ta = a.split_whitespace().collect::<BTreeSet<_>>();
    let tb = b.split_whitespace().collect::<BTreeSet<_>>();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

impl RoleMatchConfig {
    pub fn roles_match(&self, a: &str, b: &str) -> bool {
        let na = normalize_role(a);
        let nb = normalize_role(b);
        if na.is_empty() || nb.is_empty() {
            return false;
        }
        na == nb
            || token_overlap(&na, &nb) >= self.token_overlap_threshold
            || jaro_winkler(&na, &nb) >= self.similarity_threshold
    }
}

pub fn roles_match(a: &str, b: &str) -> bool {
    RoleMatchConfig::default().roles_match(a, b)
}
