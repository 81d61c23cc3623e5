//! Parsing of a single RfX page.
//!
//! The parser walks the wikitext line by line. Heading lines select the current vote section,
//! an end date is picked up from the lead (before the first section), and every other line
//! inside a section contributes the first signature it contains. Threaded replies (lines
//! starting with `:` or `#:`) are not votes and are skipped.

use std::sync::LazyLock;

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use rustc_hash::FxBuildHasher;

use crate::{config::RfxConfiguration, signature::first_signature};

static REGEX_REPLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*#?:").unwrap());

/// Structured content of one RfX page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRfxPage {
    // keyed by lowercased section name, in order of first signature
    sections: IndexMap<String, Vec<CompactString>>,
    end_date: Option<String>,
    // lowercased
    duplicates: IndexSet<CompactString>,
}

impl ParsedRfxPage {
    /// Parse `wikitext` using the section names and end date pattern of `config`.
    ///
    /// Parsing never fails; lines that cannot be attributed to a voter are ignored.
    pub fn parse(wikitext: &str, config: &RfxConfiguration) -> Self {
        let mut sections: IndexMap<String, Vec<CompactString>> = IndexMap::new();
        let mut end_date = None;
        let mut current_section: Option<String> = None;

        for line in wikitext.split('\n') {
            if let Some(name) = config.section_of_heading(line) {
                current_section = Some(name.to_lowercase());
                continue;
            }

            match &current_section {
                None => {
                    // the last end date before the first section wins
                    if let Some(date) = config.end_date_regex().captures(line).and_then(|c| c.get(1)) {
                        end_date = Some(date.as_str().to_string());
                    }
                }
                Some(section) => {
                    if REGEX_REPLY.is_match(line) {
                        continue;
                    }
                    // co-signers on the same line are not counted
                    if let Some(signature) = first_signature(line) {
                        sections
                            .entry(section.clone())
                            .or_default()
                            .push(signature.username);
                    }
                }
            }
        }

        let duplicates = find_duplicates(&sections);

        Self {
            sections,
            end_date,
            duplicates,
        }
    }

    /// All sections with at least one signer, keyed by lowercased name.
    pub fn sections(&self) -> &IndexMap<String, Vec<CompactString>> {
        &self.sections
    }

    /// Signers of the section `name` (case-insensitive), in document order.
    pub fn section(&self, name: &str) -> &[CompactString] {
        self.sections
            .get(name.to_lowercase().as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn end_date(&self) -> Option<&str> {
        self.end_date.as_deref()
    }

    /// Lowercased names of users who signed more than once anywhere on the page.
    pub fn duplicates(&self) -> &IndexSet<CompactString> {
        &self.duplicates
    }

    /// See [`section_for`].
    pub fn section_for(&self, username: &str) -> Option<&str> {
        section_for(self, username)
    }
}

/// Section in which `username` signed, compared case-insensitively and with underscores and
/// spaces treated alike.
///
/// If the user signed in several sections the first one (in order of first appearance) is returned.
pub fn section_for<'a>(parsed: &'a ParsedRfxPage, username: &str) -> Option<&'a str> {
    let username = username_key(username);
    parsed
        .sections
        .iter()
        .find(|(_, signers)| signers.iter().any(|s| username_key(s) == username))
        .map(|(section, _)| section.as_str())
}

fn username_key(username: &str) -> String {
    username.replace('_', " ").to_lowercase()
}

fn find_duplicates(sections: &IndexMap<String, Vec<CompactString>>) -> IndexSet<CompactString> {
    let mut counts: IndexMap<CompactString, usize, FxBuildHasher> = IndexMap::default();
    for username in sections.values().flatten() {
        *counts.entry(username.to_lowercase().into()).or_default() += 1;
    }

    counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(username, _)| username)
        .collect()
}
