use std::fmt::{self, Debug, Display};

use compact_str::CompactString;
use rustc_hash::FxHashMap;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Default,
    Named(CompactString),
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Default => write!(f, "Default"),
            Namespace::Named(name) => write!(f, "{:?}", name),
        }
    }
}

/// A wiki, identified by its domain (e.g. `en.wikipedia.org`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub domain: CompactString,
    pub namespaces: FxHashMap<i32, Namespace>,
}

impl Project {
    pub fn new(domain: impl Into<CompactString>) -> Self {
        Self {
            domain: domain.into(),
            namespaces: FxHashMap::default(),
        }
    }

    pub fn with_namespace(mut self, id: i32, name: impl Into<CompactString>) -> Self {
        self.namespaces.insert(id, Namespace::Named(name.into()));
        self
    }

    pub fn namespace_name(&self, id: i32) -> Option<&str> {
        match self.namespaces.get(&id) {
            Some(Namespace::Named(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Build a namespace-qualified reference to `title` in namespace `namespace`.
    pub fn page(&self, namespace: i32, title: &str) -> PageReference {
        let qualified = match self.namespace_name(namespace) {
            Some(ns_name) => CompactString::from(format!("{ns_name}:{title}")),
            None => CompactString::from(title),
        };

        PageReference {
            namespace,
            title: CompactString::from(title),
            qualified,
        }
    }
}

/// A page of a project. `title` is relative to `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageReference {
    pub namespace: i32,
    pub title: CompactString,
    qualified: CompactString,
}

impl PageReference {
    /// Title including the namespace prefix, e.g. `Wikipedia:Requests for adminship/Dave`.
    pub fn qualified_title(&self) -> &str {
        &self.qualified
    }
}

impl Display for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified)
    }
}

/// MediaWiki treats underscores and spaces in titles as the same character.
pub(crate) fn normalize_title(title: &str) -> CompactString {
    if title.contains('_') {
        CompactString::from(title.replace('_', " "))
    } else {
        CompactString::from(title)
    }
}
