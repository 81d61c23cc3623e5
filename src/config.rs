//! Per-project RfX configuration.
//!
//! Configurations are loaded from a YAML document keyed by project domain. Regular
//! expressions are compiled while loading, so a store that loaded successfully can
//! parse any page without further error handling.

use std::{
    fs,
    path::Path,
    sync::{Arc, LazyLock},
};

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{calculator::TOTAL, project::Project};

const BUILTIN_CONFIG: &str = include_str!("../config/rfx.yaml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("invalid `{field}` pattern for project `{project}`")]
    InvalidRegex {
        project: CompactString,
        field: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("project `{0}` has no sections configured")]
    NoSections(CompactString),
    #[error("section `{section}` of project `{project}` collides with the `total` count")]
    ReservedSection {
        project: CompactString,
        section: String,
    },
}

// layout of one project entry in the YAML document
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRfxConfiguration {
    sections: Vec<String>,
    date_regexp: String,
    namespace: i32,
    pages: Vec<CompactString>,
    #[serde(default)]
    excluded_titles: Vec<CompactString>,
    #[serde(default)]
    excluded_patterns: Vec<CompactString>,
}

/// Titles the title finder has to leave out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    /// Matched against the whole title.
    pub titles: IndexSet<CompactString>,
    /// Matched as a substring of the title.
    pub patterns: IndexSet<CompactString>,
}

/// RfX configuration of a single project. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct RfxConfiguration {
    section_names: IndexSet<String>,
    end_date_regex: Regex,
    header_regex: Regex,
    namespace: i32,
    page_prefixes: Vec<CompactString>,
    exclusions: ExclusionRules,
}

impl RfxConfiguration {
    /// Build a configuration, compiling the end date pattern and the section header pattern.
    ///
    /// `project` is only used for error reporting.
    pub fn new(
        project: &str,
        section_names: impl IntoIterator<Item = impl Into<String>>,
        end_date_regex: &str,
        namespace: i32,
        page_prefixes: impl IntoIterator<Item = impl Into<CompactString>>,
        exclusions: ExclusionRules,
    ) -> Result<Self, ConfigError> {
        let section_names: IndexSet<String> = section_names.into_iter().map(Into::into).collect();
        if section_names.is_empty() {
            return Err(ConfigError::NoSections(project.into()));
        }
        if let Some(section) = section_names.iter().find(|name| name.to_lowercase() == TOTAL) {
            return Err(ConfigError::ReservedSection {
                project: project.into(),
                section: section.clone(),
            });
        }

        let end_date_regex = RegexBuilder::new(end_date_regex)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidRegex {
                project: project.into(),
                field: "date_regexp",
                source,
            })?;

        // one group per section name, in configured order
        let groups = section_names
            .iter()
            .map(|name| format!("({})", regex::escape(name)))
            .collect::<Vec<_>>()
            .join("|");
        let header_regex = RegexBuilder::new(&format!(r"={{1,6}}\s*(?:{groups})\s*={{1,6}}"))
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidRegex {
                project: project.into(),
                field: "sections",
                source,
            })?;

        Ok(Self {
            section_names,
            end_date_regex,
            header_regex,
            namespace,
            page_prefixes: page_prefixes.into_iter().map(Into::into).collect(),
            exclusions,
        })
    }

    pub fn section_names(&self) -> &IndexSet<String> {
        &self.section_names
    }

    /// Case-insensitive; group 1 holds the end date.
    pub fn end_date_regex(&self) -> &Regex {
        &self.end_date_regex
    }

    /// Configured name of the section `line` is a heading of, matched case-insensitively.
    pub(crate) fn section_of_heading(&self, line: &str) -> Option<&str> {
        let captures = self.header_regex.captures(line)?;
        let index = captures.iter().skip(1).position(|group| group.is_some())?;
        self.section_names.get_index(index).map(String::as_str)
    }

    pub fn namespace(&self) -> i32 {
        self.namespace
    }

    pub fn page_prefixes(&self) -> &[CompactString] {
        &self.page_prefixes
    }

    pub fn exclusions(&self) -> &ExclusionRules {
        &self.exclusions
    }

    fn from_raw(project: &str, raw: RawRfxConfiguration) -> Result<Self, ConfigError> {
        Self::new(
            project,
            raw.sections,
            &raw.date_regexp,
            raw.namespace,
            raw.pages,
            ExclusionRules {
                titles: raw.excluded_titles.into_iter().collect(),
                patterns: raw.excluded_patterns.into_iter().collect(),
            },
        )
    }
}

/// Resolves the RfX configuration of a project by its domain.
///
/// A project without an entry is not an error: the tool is simply unsupported there.
#[derive(Debug, Clone, Default)]
pub struct RfxConfigStore {
    projects: FxHashMap<CompactString, Arc<RfxConfiguration>>,
}

impl RfxConfigStore {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: IndexMap<CompactString, RawRfxConfiguration> = serde_yaml_ng::from_str(yaml)?;

        let mut projects = FxHashMap::default();
        for (domain, raw) in raw {
            let config = RfxConfiguration::from_raw(&domain, raw)?;
            projects.insert(domain, Arc::new(config));
        }

        tracing::info!(message = "Loaded RfX configuration", projects = projects.len());
        Ok(Self { projects })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    /// The configuration shipped with the crate, loaded once per process.
    pub fn builtin() -> &'static RfxConfigStore {
        static BUILTIN: LazyLock<RfxConfigStore> = LazyLock::new(|| {
            RfxConfigStore::from_yaml_str(BUILTIN_CONFIG).expect("built-in RfX configuration is valid")
        });
        &BUILTIN
    }

    pub fn insert(&mut self, domain: impl Into<CompactString>, config: RfxConfiguration) {
        self.projects.insert(domain.into(), Arc::new(config));
    }

    pub fn config_for(&self, project: &Project) -> Option<Arc<RfxConfiguration>> {
        self.projects.get(&project.domain).cloned()
    }

    pub fn is_configured(&self, project: &Project) -> bool {
        self.projects.contains_key(&project.domain)
    }
}
