//! In-memory collaborators and fixtures shared by the unit and integration tests.

use std::{error::Error, fmt};

use compact_str::CompactString;
use indexmap::IndexMap;
use proptest::prelude::*;
use rustc_hash::FxHashSet;

use crate::{
    calculator::{PageSource, SourceError, TitleFinder},
    config::{ExclusionRules, RfxConfiguration},
    project::{PageReference, Project},
};

pub mod prelude {
    pub(crate) use super::{
        config_with_prefixes, export, page_xml, rfa_config, test_project, wikitext_line, FakeWiki,
        RFA_DATE_REGEX,
    };
    pub(crate) use proptest::prelude::*;
}

pub const RFA_DATE_REGEX: &str = r"scheduled to end (\d{2}:\d{2}, \d{1,2} \w+ \d{4}) \(UTC\)";

pub fn config_with_prefixes(prefixes: &[&str]) -> RfxConfiguration {
    RfxConfiguration::new(
        "test.wikipedia.org",
        ["Support", "Oppose", "Neutral"],
        RFA_DATE_REGEX,
        4,
        prefixes.iter().copied(),
        ExclusionRules::default(),
    )
    .unwrap()
}

pub fn rfa_config() -> RfxConfiguration {
    config_with_prefixes(&["RfA"])
}

pub fn test_project() -> Project {
    Project::new("test.wikipedia.org")
        .with_namespace(2, "User")
        .with_namespace(4, "Wikipedia")
}

/// Lines as they show up on RfX pages, for property tests.
pub fn wikitext_line() -> impl Strategy<Value = String> {
    let name = "[A-Za-z][a-z]{0,6}";
    prop_oneof![
        Just("===Support===".to_string()),
        Just("== Oppose ==".to_string()),
        Just("====Neutral====".to_string()),
        Just("Scheduled to end 12:00, 1 May 2010 (UTC)".to_string()),
        name.prop_map(|n| format!("# [[User:{n}|{n}]] 12:00, 1 May 2010 (UTC)")),
        name.prop_map(|n| format!("#:Reply [[User talk:{n}]]")),
        name.prop_map(|n| format!("# {{{{unsigned|{n}}}}}")),
        "[a-z ]{0,20}",
    ]
}

#[derive(Debug)]
struct BackendDown;

impl fmt::Display for BackendDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica database unavailable")
    }
}

impl Error for BackendDown {}

#[derive(Debug)]
struct FakePage {
    // None for pages that can be discovered but not fetched
    text: Option<String>,
    editors: FxHashSet<CompactString>,
}

/// Pages in namespace 4 of [`test_project`], keyed by title.
#[derive(Debug, Default)]
pub struct FakeWiki {
    pages: IndexMap<CompactString, FakePage>,
    failing_prefixes: FxHashSet<CompactString>,
}

impl FakeWiki {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, title: &str, text: &str, editors: &[&str]) -> Self {
        self.pages.insert(
            title.into(),
            FakePage {
                text: Some(text.to_string()),
                editors: editors.iter().map(|e| CompactString::from(*e)).collect(),
            },
        );
        self
    }

    pub fn with_broken_page(mut self, title: &str, editors: &[&str]) -> Self {
        self.pages.insert(
            title.into(),
            FakePage {
                text: None,
                editors: editors.iter().map(|e| CompactString::from(*e)).collect(),
            },
        );
        self
    }

    pub fn with_failing_prefix(mut self, prefix: &str) -> Self {
        self.failing_prefixes.insert(prefix.into());
        self
    }
}

impl TitleFinder for FakeWiki {
    fn find_titles(
        &self,
        _project: &Project,
        user: &str,
        namespace: i32,
        prefix: &str,
        exclusions: &ExclusionRules,
    ) -> Result<Vec<CompactString>, SourceError> {
        if self.failing_prefixes.contains(prefix) {
            return Err(SourceError::Backend(Box::new(BackendDown)));
        }
        if namespace != 4 {
            return Ok(Vec::new());
        }

        let own_request = format!("{prefix}/{user}");
        Ok(self
            .pages
            .iter()
            .filter(|(title, page)| {
                title.starts_with(&format!("{prefix}/"))
                    && page.editors.contains(user)
                    && !title.contains(&own_request)
                    && !exclusions.titles.contains(*title)
                    && !exclusions.patterns.iter().any(|p| title.contains(p.as_str()))
            })
            .map(|(title, _)| title.clone())
            .collect())
    }
}

impl PageSource for FakeWiki {
    fn fetch(&self, _project: &Project, page: &PageReference) -> Result<String, SourceError> {
        self.pages
            .get(&page.title)
            .and_then(|p| p.text.clone())
            .ok_or_else(|| SourceError::NotFound {
                title: page.qualified_title().into(),
            })
    }
}

/// A MediaWiki XML export containing `pages`.
pub fn export(pages: &[String]) -> String {
    let mut xml = String::from(
        r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/" version="0.11" xml:lang="en">
  <siteinfo>
    <sitename>Wikipedia</sitename>
    <dbname>testwiki</dbname>
    <namespaces>
      <namespace key="0" case="first-letter" />
      <namespace key="2" case="first-letter">User</namespace>
      <namespace key="4" case="first-letter">Wikipedia</namespace>
      <namespace key="5" case="first-letter">Wikipedia talk</namespace>
    </namespaces>
  </siteinfo>
"#,
    );
    for page in pages {
        xml.push_str(page);
        xml.push('\n');
    }
    xml.push_str("</mediawiki>");
    xml
}

/// A `<page>` element with one revision per `(contributor, text)`, oldest first.
pub fn page_xml(namespace: i32, title: &str, revisions: &[(&str, &str)]) -> String {
    let mut xml = format!(
        "  <page>\n    <title>{}</title>\n    <ns>{namespace}</ns>\n",
        quick_xml::escape::escape(title)
    );
    for (i, (contributor, text)) in revisions.iter().enumerate() {
        xml.push_str(&format!(
            "    <revision>\n      <timestamp>2017-08-{:02}T12:00:00Z</timestamp>\n      <contributor><username>{}</username></contributor>\n      <text bytes=\"{}\" xml:space=\"preserve\">{}</text>\n    </revision>\n",
            i + 1,
            quick_xml::escape::escape(*contributor),
            text.len(),
            quick_xml::escape::escape(*text),
        ));
    }
    xml.push_str("  </page>");
    xml
}
