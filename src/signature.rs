use std::sync::LazyLock;

use compact_str::CompactString;
use regex::{Captures, Regex};

/// A user reference found in a line of wikitext.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub username: CompactString,
    /// Byte offset of the username inside the line.
    pub offset: usize,
}

// one capture group per idiom, exactly one of them participates in a match
static REGEX_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        // [[User:XX]] and [[User talk:XX]], optionally piped
        r"\[\[(?i:user(?:[\s_]talk)?):([^\]\|/]*)(?:\|[^\]]*)?\]\]",
        // {{fullurl:User:XX}} and {{unsigned|XX}} (trailing parameters allowed)
        r"|\{\{(?i:fullurl:user(?:[\s_]talk)?:|unsigned\|)([^\}\|]*)(?:\|[^\}]*)?\}\}",
        // {{User:XX/sig}} style templates
        r"|\{\{(?i:user(?:[\s_]talk)?):([^\}/\|]*)",
        // {{unsigned2|date|XX}}
        r"|\{\{(?i:unsigned2)\|[^\|\}]*\|([^\}\|]*)(?:\|[^\}]*)?\}\}",
        // [[User:XX/sig]] links
        r"|\[\[(?i:user):([^\]/\|]*)/(?i:sig)[\|\]]",
    ))
    .unwrap()
});

/// Find every user signature in `line`, in document order.
///
/// Recognised idioms are `[[User:X]]`, `[[User talk:X]]`, `{{fullurl:User:X}}`,
/// `{{unsigned|X}}`, `{{User:X/...}}`, `{{unsigned2|date|X}}` and `[[User:X/sig]]`.
/// The `User`/`User talk` keyword and the template names are matched case-insensitively.
///
/// Callers decide which match wins if a line carries more than one signature.
/// Malformed wikitext simply yields fewer (or no) matches.
pub fn find_signatures(line: &str) -> Vec<Signature> {
    if line.is_empty() {
        return Vec::new();
    }

    REGEX_SIGNATURE
        .captures_iter(line)
        .filter_map(|captures| signature_from_captures(&captures))
        .collect()
}

/// First signature on `line`, if any.
pub fn first_signature(line: &str) -> Option<Signature> {
    REGEX_SIGNATURE
        .captures_iter(line)
        .find_map(|captures| signature_from_captures(&captures))
}

fn signature_from_captures(captures: &Captures<'_>) -> Option<Signature> {
    let username = captures.iter().skip(1).flatten().next()?;
    let (offset, username) = clean_username(username.start(), username.as_str());
    if username.is_empty() {
        // e.g. `[[User:]]`
        return None;
    }
    Some(Signature { username, offset })
}

/// Strip separators and surrounding whitespace.
///
/// Returns the adjusted offset together with the cleaned name.
fn clean_username(start: usize, raw: &str) -> (usize, CompactString) {
    let trimmed_start = raw.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '/' | '|'));
    let offset = start + (raw.len() - trimmed_start.len());
    let trimmed = trimmed_start
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '/' | '|' | ']' | '}'));

    (offset, CompactString::from(trimmed))
}
