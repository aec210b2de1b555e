//! News→candidate linking via alias matching.
//!
//! Builds a lowercase alias set per candidate (id, display name, name
//! stripped of corporate suffixes, a few well-known English names) and
//! links a news item to a candidate when any alias appears as a
//! case-insensitive substring of its title or body.

use std::collections::HashMap;

use crate::types::{Candidate, NewsItem};

/// English aliases for large caps that show up in foreign-wire copy.
const EN_ALIASES: &[(&str, &[&str])] = &[
    ("2330", &["tsmc", "taiwan semiconductor"]),
    ("2317", &["hon hai", "foxconn"]),
    ("2454", &["mediatek"]),
    ("2303", &["umc", "united microelectronics"]),
];

/// Corporate boilerplate stripped from display names before matching.
const NAME_SUFFIXES: &[&str] = &["股份有限公司", "有限公司", "公司"];

pub type AliasTable = HashMap<String, Vec<String>>;

fn base_name(name: &str) -> String {
    let mut base = name.trim();
    for suffix in NAME_SUFFIXES {
        base = base.strip_suffix(suffix).unwrap_or(base).trim_end();
    }
    base.to_string()
}

/// Precompute the alias table for a universe. Aliases are lowercased;
/// empty candidates get only their id.
pub fn build_aliases(candidates: &[Candidate]) -> AliasTable {
    let mut table = AliasTable::with_capacity(candidates.len());
    for c in candidates {
        let name = c.name.trim();
        let mut aliases = vec![c.id.clone(), name.to_string(), base_name(name)];
        if let Some((_, en)) = EN_ALIASES.iter().find(|(id, _)| *id == c.id) {
            aliases.extend(en.iter().map(|a| a.to_string()));
        }

        let mut seen: Vec<String> = Vec::new();
        for alias in aliases {
            let lower = alias.to_lowercase();
            if !lower.is_empty() && !seen.contains(&lower) {
                seen.push(lower);
            }
        }
        table.insert(c.id.clone(), seen);
    }
    table
}

/// Filter the shared news list down to items mentioning this candidate.
/// Order is preserved; items are cloned since the shared list is
/// read-only across concurrent evaluations.
pub fn link_news(items: &[NewsItem], candidate_id: &str, aliases: &AliasTable) -> Vec<NewsItem> {
    let Some(keys) = aliases.get(candidate_id) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| {
            let title = item.title.to_lowercase();
            let body = item.body.to_lowercase();
            keys.iter().any(|k| title.contains(k) || body.contains(k))
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
