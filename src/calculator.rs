//! Aggregation of a user's votes over all RfX pages of a project.
//!
//! For every configured page prefix the [`TitleFinder`] supplies the pages the user took part
//! in, the [`PageSource`] supplies their wikitext, and each page is parsed on its own. A page
//! only counts towards the totals if the user signed in one of its vote sections.

use std::{
    error::Error,
    fmt::{self, Display},
    sync::atomic::{AtomicBool, Ordering},
};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use tracing::instrument;

use crate::{
    config::{ExclusionRules, RfxConfiguration},
    project::{PageReference, Project},
    rfx::ParsedRfxPage,
};

/// Key under which the number of counted pages of a prefix is stored.
pub const TOTAL: &str = "total";

/// Failure of a title finder or page source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("page `{title}` does not exist")]
    NotFound { title: CompactString },
    #[error("backend failure")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

#[derive(Debug, thiserror::Error)]
pub enum CalculatorError {
    #[error("vote calculation was cancelled")]
    Cancelled,
}

/// Discovers the RfX pages a user took part in.
pub trait TitleFinder {
    /// Titles (relative to `namespace`) below `prefix/` that `user` edited.
    ///
    /// Implementations leave out the user's own request and every title matched by
    /// `exclusions`. The order must be stable for the same input.
    fn find_titles(
        &self,
        project: &Project,
        user: &str,
        namespace: i32,
        prefix: &str,
        exclusions: &ExclusionRules,
    ) -> Result<Vec<CompactString>, SourceError>;
}

/// Supplies the current wikitext of a page.
pub trait PageSource {
    fn fetch(&self, project: &Project, page: &PageReference) -> Result<String, SourceError>;
}

impl<T: TitleFinder + ?Sized> TitleFinder for &T {
    fn find_titles(
        &self,
        project: &Project,
        user: &str,
        namespace: i32,
        prefix: &str,
        exclusions: &ExclusionRules,
    ) -> Result<Vec<CompactString>, SourceError> {
        (**self).find_titles(project, user, namespace, prefix, exclusions)
    }
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn fetch(&self, project: &Project, page: &PageReference) -> Result<String, SourceError> {
        (**self).fetch(project, page)
    }
}

/// Vote counts of one prefix, keyed by section name plus [`TOTAL`].
pub type PrefixTotals = IndexMap<CompactString, u32>;

/// Vote counts keyed by page prefix, in configured order.
///
/// A prefix that was processed but had no qualifying pages maps to an empty [`PrefixTotals`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VoteTotals(IndexMap<CompactString, PrefixTotals>);

impl VoteTotals {
    pub fn get(&self, prefix: &str) -> Option<&PrefixTotals> {
        self.0.get(prefix)
    }

    pub fn count(&self, prefix: &str, section: &str) -> u32 {
        self.get(prefix)
            .and_then(|totals| totals.get(section))
            .copied()
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &PrefixTotals)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn start_prefix(&mut self, prefix: &str) {
        self.0.entry(prefix.into()).or_default();
    }

    fn record(&mut self, prefix: &str, section: &str) {
        let totals = self.0.entry(prefix.into()).or_default();
        *totals.entry(section.into()).or_insert(0) += 1;
        *totals.entry(TOTAL.into()).or_insert(0) += 1;
    }
}

/// Details of one page the user voted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RfxPageSummary {
    pub prefix: CompactString,
    pub title: CompactString,
    /// Part of the title after the prefix, usually the candidate's name.
    pub candidate: CompactString,
    /// Section the user voted in.
    pub section: String,
    /// Number of signers in every configured section (lowercased), including empty ones.
    pub section_counts: IndexMap<String, usize>,
    pub end_date: Option<String>,
    pub duplicates: Vec<CompactString>,
}

impl RfxPageSummary {
    fn new(
        prefix: &str,
        page: &PageReference,
        section: &str,
        parsed: &ParsedRfxPage,
        config: &RfxConfiguration,
    ) -> Self {
        let candidate = page
            .title
            .split_once('/')
            .map_or(page.title.as_str(), |(_, candidate)| candidate);

        let section_counts = config
            .section_names()
            .iter()
            .map(|name| (name.to_lowercase(), parsed.section(name).len()))
            .collect();

        Self {
            prefix: prefix.into(),
            title: page.qualified_title().into(),
            candidate: candidate.into(),
            section: section.to_string(),
            section_counts,
            end_date: parsed.end_date().map(str::to_string),
            duplicates: parsed.duplicates().iter().cloned().collect(),
        }
    }
}

/// A page that was discovered but could not be fetched.
#[derive(Debug, Serialize)]
pub struct SkippedPage {
    pub prefix: CompactString,
    pub title: CompactString,
    #[serde(serialize_with = "serialize_error")]
    pub error: SourceError,
}

/// Result of [`VoteCalculator::compute_totals`].
#[derive(Debug, Default, Serialize)]
pub struct VoteReport {
    pub totals: VoteTotals,
    pub pages: Vec<RfxPageSummary>,
    pub skipped_pages: Vec<SkippedPage>,
    /// Prefixes whose pages could not be discovered. They are absent from `totals`.
    #[serde(serialize_with = "serialize_error_map")]
    pub unavailable_prefixes: IndexMap<CompactString, SourceError>,
}

impl VoteReport {
    /// Whether some votes may be missing from the totals.
    pub fn is_partial(&self) -> bool {
        !self.skipped_pages.is_empty() || !self.unavailable_prefixes.is_empty()
    }
}

/// Computes a user's RfX vote totals from a title finder and a page source.
pub struct VoteCalculator<'a, F, S> {
    finder: F,
    source: S,
    cancelled: Option<&'a AtomicBool>,
}

impl<'a, F: TitleFinder, S: PageSource> VoteCalculator<'a, F, S> {
    pub fn new(finder: F, source: S) -> Self {
        Self {
            finder,
            source,
            cancelled: None,
        }
    }

    /// Stop between two page fetches once `flag` is set.
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancelled = Some(flag);
        self
    }

    /// Count in which section `user` voted on every RfX page of `project`.
    ///
    /// Callers are expected to check that the project is configured first. Pages that cannot be
    /// fetched are skipped and listed in the report; prefixes whose titles cannot be discovered
    /// are listed as unavailable instead of showing up as zero votes.
    #[instrument(skip(self, project, config), fields(project = %project.domain))]
    pub fn compute_totals(
        &self,
        project: &Project,
        user: &str,
        config: &RfxConfiguration,
    ) -> Result<VoteReport, CalculatorError> {
        let mut report = VoteReport::default();

        for prefix in config.page_prefixes() {
            let titles = match self.finder.find_titles(
                project,
                user,
                config.namespace(),
                prefix,
                config.exclusions(),
            ) {
                Ok(titles) => titles,
                Err(error) => {
                    tracing::warn!(
                        message = "Could not discover RfX pages, prefix will be reported as unavailable",
                        prefix = prefix.as_str(),
                        error = %DisplayChain(&error)
                    );
                    report.unavailable_prefixes.insert(prefix.clone(), error);
                    continue;
                }
            };

            report.totals.start_prefix(prefix);
            tracing::debug!(message = "Discovered RfX pages", prefix = prefix.as_str(), count = titles.len());

            for title in titles {
                if self.is_cancelled() {
                    tracing::info!(message = "Vote calculation cancelled", prefix = prefix.as_str());
                    return Err(CalculatorError::Cancelled);
                }

                let page = project.page(config.namespace(), &title);
                let wikitext = match self.source.fetch(project, &page) {
                    Ok(wikitext) => wikitext,
                    Err(error) => {
                        tracing::warn!(
                            message = "Could not fetch RfX page, skipping it",
                            title = page.qualified_title(),
                            error = %DisplayChain(&error)
                        );
                        report.skipped_pages.push(SkippedPage {
                            prefix: prefix.clone(),
                            title: page.qualified_title().into(),
                            error,
                        });
                        continue;
                    }
                };

                let parsed = ParsedRfxPage::parse(&wikitext, config);
                let Some(section) = parsed.section_for(user) else {
                    // the user edited the page but did not vote
                    continue;
                };

                tracing::debug!(
                    message = "Counted vote",
                    title = page.qualified_title(),
                    section
                );
                report.totals.record(prefix, section);
                report
                    .pages
                    .push(RfxPageSummary::new(prefix, &page, section, &parsed, config));
            }
        }

        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

// error message including all sources, for logs and reports
struct DisplayChain<'a>(&'a (dyn Error + 'static));

impl Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, ": {}", error)?;
            source = error.source();
        }
        Ok(())
    }
}

fn serialize_error<S: Serializer>(error: &SourceError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&DisplayChain(error))
}

fn serialize_error_map<S: Serializer>(
    errors: &IndexMap<CompactString, SourceError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        errors
            .iter()
            .map(|(prefix, error)| (prefix, DisplayChain(error).to_string())),
    )
}
