//! Search result merging and relevance ranking.
//!
//! Search issues one prefix-range query per name field. The result sets are
//! merged here, deduplicated by record id, and ranked:
//!
//! ```text
//! tier 0: a name field equals the term (case-insensitive)
//! tier 1: anything else returned by the prefix queries
//! ```
//!
//! Within a tier, larger recency values come first, then ids ascending.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::store::record::Record;

/// Relevance tier of a search hit (lower sorts first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Exact,
    Partial,
}

/// The record fields search reads.
#[derive(Debug, Clone, Copy)]
pub struct SearchFields<'a> {
    pub primary: &'a str,
    pub secondary: &'a str,
    pub recency: &'a str,
}

/// Term used for the store's case-sensitive prefix ranges: first letter upper-cased.
pub fn range_prefix(term: &str) -> String {
    let term = term.trim();
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn match_tier(record: &Record, fields: SearchFields<'_>, term: &str) -> MatchTier {
    let term = term.trim().to_lowercase();
    let exact = [fields.primary, fields.secondary]
        .iter()
        .filter_map(|f| record.str_field(f))
        .any(|name| name.to_lowercase() == term);

    if exact {
        MatchTier::Exact
    } else {
        MatchTier::Partial
    }
}

/// Merge query result sets, drop duplicate ids, rank, and keep at most `limit`.
pub fn merge_and_rank(
    result_sets: impl IntoIterator<Item = Vec<Record>>,
    term: &str,
    fields: SearchFields<'_>,
    limit: usize,
) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<(MatchTier, f64, Record)> = result_sets
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.id.clone()))
        .map(|r| (match_tier(&r, fields, term), r.number_field(fields.recency), r))
        .collect();

    ranked.sort_by(|(tier_a, recent_a, a), (tier_b, recent_b, b)| {
        tier_a
            .cmp(tier_b)
            .then_with(|| recent_b.partial_cmp(recent_a).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    ranked.into_iter().take(limit).map(|(_, _, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: SearchFields<'static> = SearchFields {
        primary: "name",
        secondary: "alias",
        recency: "last_active",
    };

    fn rec(id: &str, name: &str, alias: &str, last_active: i64) -> Record {
        let fields = json!({ "name": name, "alias": alias, "last_active": last_active });
        Record::new(id, "u1", fields.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_range_prefix() {
        assert_eq!(range_prefix("john"), "John");
        assert_eq!(range_prefix(" éa "), "Éa");
        assert_eq!(range_prefix(""), "");
    }

    #[test]
    fn test_tiers() {
        assert_eq!(match_tier(&rec("1", "John", "", 0), FIELDS, "john"), MatchTier::Exact);
        assert_eq!(match_tier(&rec("2", "Jo", "JOHN", 0), FIELDS, "John"), MatchTier::Exact);
        assert_eq!(
            match_tier(&rec("3", "John Smith", "", 0), FIELDS, "john"),
            MatchTier::Partial
        );
        assert_eq!(
            match_tier(&rec("4", "Johnny B", "", 0), FIELDS, "john"),
            MatchTier::Partial
        );
    }

    #[test]
    fn test_merge_dedups_and_ranks() {
        let by_name = vec![
            rec("a", "Johnny B", "", 50),
            rec("b", "John Smith", "", 10),
            rec("c", "Johan", "", 99),
        ];
        let by_alias = vec![rec("b", "John Smith", "", 10), rec("d", "Zed", "John", 1)];

        let ranked = merge_and_rank(vec![by_name, by_alias], "john", FIELDS, 10);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_non_exact_matches_order_by_recency() {
        let hits = vec![
            rec("smith", "John Smith", "", 1),
            rec("johnny", "Johnny B", "", 9),
        ];
        let ranked = merge_and_rank(vec![hits], "john", FIELDS, 10);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["johnny", "smith"]);
    }

    #[test]
    fn test_recency_orders_within_tier_and_limit_applies() {
        let hits = vec![
            rec("old", "Johnson", "", 1),
            rec("new", "Johnston", "", 9),
            rec("mid", "Johns", "", 5),
        ];
        let ranked = merge_and_rank(vec![hits], "john", FIELDS, 2);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }
}
