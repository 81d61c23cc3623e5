// SPDX-License-Identifier: MPL-2.0
//! # rfxvote
//!
//! Parser and vote calculator for wiki "Request for X" (RfX) discussion pages, such as requests for adminship.
//!
//! ## Overview
//!
//! RfX pages are semi-structured wikitext: a lead with the end date of the discussion, followed by vote sections
//! (e.g. *Support*, *Oppose*, *Neutral*) in which every vote is a line carrying the voter's signature. `rfxvote`
//! turns such a page into structured data and, for a given user, counts in which section they voted across all
//! requests of a project.
//!
//! **Key Features:**
//!
//! - **Signature Detection**: Recognizes the common signature idioms (user page and talk page links, `{{unsigned}}`,
//!   `{{unsigned2}}`, `{{fullurl}}`, signature templates and `/sig` subpages).
//! - **Best-effort Parsing**: Malformed wikitext never fails a parse, it only contributes fewer votes.
//! - **Duplicate Voters**: Users who signed more than once on a page are reported.
//! - **Pluggable Backends**: Page discovery and retrieval are behind two small traits, with an implementation for
//!   MediaWiki XML exports included.
//!
//! ## Getting Started
//!
//! ### Parsing a Single Page
//!
//! ```rust
//! use rfxvote::config::{ExclusionRules, RfxConfiguration};
//! use rfxvote::rfx::ParsedRfxPage;
//!
//! let config = RfxConfiguration::new(
//!     "en.wikipedia.org",
//!     ["Support", "Oppose", "Neutral"],
//!     r"scheduled to end (\d{2}:\d{2}, \d{1,2} \w+ \d{4}) \(UTC\)",
//!     4,
//!     ["Requests_for_adminship"],
//!     ExclusionRules::default(),
//! )
//! .unwrap();
//!
//! let page = ParsedRfxPage::parse("===Support===\n# [[User:Alice]]\n===Oppose===\n# [[User:Bob]]", &config);
//! assert_eq!(page.section_for("alice"), Some("support"));
//! assert_eq!(page.section("oppose").len(), 1);
//! ```
//!
//! ### Counting a User's Votes
//!
//! The [`calculator::VoteCalculator`] needs a [`calculator::TitleFinder`] to discover the pages a user took part in
//! and a [`calculator::PageSource`] to fetch their wikitext. [`dump_parser::DumpWiki`] implements both on top of an
//! XML export:
//!
//! ```rust,no_run
//! use rfxvote::calculator::VoteCalculator;
//! use rfxvote::config::RfxConfigStore;
//! use rfxvote::dump_parser::DumpWiki;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = BufReader::new(File::open("enwiki-rfa-pages.xml")?);
//!     let wiki = DumpWiki::from_reader(reader)?;
//!     let project = wiki.project("en.wikipedia.org");
//!
//!     // unsupported wikis have no configuration, that is not an error
//!     let Some(config) = RfxConfigStore::builtin().config_for(&project) else {
//!         return Ok(());
//!     };
//!
//!     let report = VoteCalculator::new(&wiki, &wiki).compute_totals(&project, "Alice", &config)?;
//!     for (prefix, totals) in report.totals.iter() {
//!         println!("{prefix}: {totals:?}");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules and API
//!
//! - [`signature`]: finds user signatures in a line of wikitext.
//! - [`rfx`]: parses a whole page into [`rfx::ParsedRfxPage`] and looks up a user's section.
//! - [`config`]: per-project configuration, loaded from YAML and keyed by domain.
//! - [`calculator`]: the collaborator traits and the vote aggregation.
//! - [`dump_parser`]: reads MediaWiki XML exports and serves them as a title finder and page source.
//! - [`project`]: projects, namespaces and page references.
//!
//! ## Error Handling
//!
//! - A project without configuration yields `None` from [`config::RfxConfigStore::config_for`].
//! - Pages that cannot be fetched are logged, skipped and listed in [`calculator::VoteReport::skipped_pages`].
//! - Prefixes whose pages cannot be discovered are listed in [`calculator::VoteReport::unavailable_prefixes`]
//!   and are absent from the totals, so they can't be confused with "no votes".
//!
//! ## Logging
//!
//! Uses the `tracing` crate for diagnostics. The library does not install a subscriber.
//!
//! ## Features
//!
//! - `strict`: abort reading an XML export on malformed XML instead of recovering.
//!
//! ## Limitations
//!
//! - Only the first signature of a line counts, co-signed votes are attributed to the first signer.
//! - If several end dates appear before the first vote section, the last one wins.

pub mod calculator;
pub mod config;
pub mod dump_parser;
#[cfg(test)]
mod integration_tests;
pub mod project;
pub mod rfx;
pub mod signature;
#[cfg(test)]
mod test_support;
