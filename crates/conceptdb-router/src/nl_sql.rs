//! Pattern-based natural language to SQL conversion.
//!
//! Only a handful of fixed phrasings are understood. Anything else yields
//! `None` and the precise branch contributes no results.

use std::sync::LazyLock;

use regex::{Captures, Regex};

type Render = fn(&Captures<'_>) -> String;

fn literal(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', '?', '!'])
        .replace('\'', "")
}

static PATTERNS: LazyLock<Vec<(Regex, Render)>> = LazyLock::new(|| {
    let table: [(&str, Render); 5] = [
        (r"find all (\w+)", |c| format!("SELECT * FROM {}", &c[1])),
        (r"find (\w+) where (\w+) (?:is|equals?) (.+)", |c| {
            format!("SELECT * FROM {} WHERE {} = '{}'", &c[1], &c[2], literal(&c[3]))
        }),
        (r"show me (\w+)", |c| format!("SELECT * FROM {} LIMIT 10", &c[1])),
        (r"count (\w+)", |c| format!("SELECT COUNT(*) FROM {}", &c[1])),
        (r"(\w+) with (\w+) greater than (\d+)", |c| {
            format!("SELECT * FROM {} WHERE {} > {}", &c[1], &c[2], &c[3])
        }),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, render)| Regex::new(pattern).ok().map(|re| (re, render)))
        .collect()
});

/// Convert a natural-language query into SQL, if a known phrasing matches.
///
/// Matching is case-insensitive; the query is lowercased first, so literal
/// values come out lowercase.
pub fn to_sql(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    PATTERNS
        .iter()
        .find_map(|(re, render)| re.captures(&lower).map(|caps| render(&caps)))
}
