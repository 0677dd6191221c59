//! @mention extraction from post bodies
//!
//! Two forms are recognized, matching the host forum's markup:
//! - bare: `@username` where username is alphanumeric plus `_`, `-`, `.`
//! - quoted: `@"Name With Spaces"` for names the bare form can't express
//!
//! A bare `@` glued to the end of a word (`mail@example.com`) is not a
//! mention. Results are deduplicated case-insensitively in first-seen order.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Quoted form first so `@"a b"` doesn't half-match as bare `@`
    static ref MENTION_RE: Regex =
        Regex::new(r#"@"([^"\n]+)"|@([A-Za-z0-9_.-]+)"#).unwrap();
}

/// Extract mentioned usernames from a post body
///
/// `max` caps the number of distinct names returned; posts that @-mention
/// half the forum get truncated rather than rejected.
pub fn extract_mentions(body: &str, max: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut names = Vec::new();

    for caps in MENTION_RE.captures_iter(body) {
        let whole = caps.get(0).expect("match always has group 0");

        // Email guard: skip when the '@' directly follows a word character
        if let Some(prev) = body[..whole.start()].chars().next_back() {
            if prev.is_alphanumeric() || prev == '_' {
                continue;
            }
        }

        let raw = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");

        // Bare names swallow sentence punctuation; trim it off
        let name = raw.trim_end_matches(['.', '-']).trim();
        if name.is_empty() {
            continue;
        }

        if seen.insert(name.to_lowercase()) {
            names.push(name.to_string());
            if names.len() >= max {
                break;
            }
        }
    }

    names
}
