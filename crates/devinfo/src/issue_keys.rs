//! Jira issue key extraction.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Issue key preceded by start-of-text or a non-alphanumeric character.
static ISSUE_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])([a-z][a-z0-9]+-[0-9]+)").expect("valid regex")
});

/// Extract Jira issue keys (e.g. `ABC-123`) from free text.
///
/// Keys are upper-cased and de-duplicated, keeping the order in which they
/// first appear.
#[must_use]
pub fn parse_issue_keys(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    ISSUE_KEY_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
        .filter(|key| seen.insert(key.clone()))
        .collect()
}
