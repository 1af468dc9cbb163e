//! Jira entity id encoding.

/// Convert a branch (or other entity) name into a valid Jira id.
///
/// Jira only accepts `[A-Za-z0-9~.\-_]` in ids. Names outside that set are
/// hex-encoded and prefixed with `~` so the mapping stays reversible.
#[must_use]
pub fn jira_id(name: &str) -> String {
    let is_safe = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '~' | '.' | '-' | '_'));

    if is_safe {
        name.to_string()
    } else {
        format!("~{}", hex::encode(name.as_bytes()))
    }
}
