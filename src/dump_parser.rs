//! Title finder and page source backed by a MediaWiki XML export.
//!
//! Only the data the vote calculator needs is kept: for every page its namespace, title,
//! the set of users who edited it and the text of its latest revision.

use std::{
    collections::BTreeMap,
    fmt::Debug,
    io::{BufRead, Read},
    sync::Arc,
};

use compact_str::CompactString;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::instrument;

use crate::{
    calculator::{PageSource, SourceError, TitleFinder},
    config::ExclusionRules,
    project::{normalize_title, Namespace, PageReference, Project},
};

// we never need the value of an unknown tag, so this is the most efficient backend
type TagStringInterner = string_interner::StringInterner<string_interner::backend::BucketBackend>;

// the tags we read a value from, and their parents
#[derive(PartialEq, Eq)]
enum Tag {
    MediaWiki,         // root
    SiteInfo,          // <siteinfo><dbname>..</dbname><namespaces>..</namespaces></siteinfo>
    DbName,            // <dbname>enwiki</dbname>
    Namespaces,        // <namespaces><namespace key="4">Wikipedia</namespace>..</namespaces>
    Namespace(String), // key attribute
    Page,              // <page><title/><ns/><revision/>..</page>
    Title,
    Ns,
    Revision, // <revision><timestamp/><contributor/><text/>..</revision>
    Timestamp,
    Contributor, // <contributor><username>..</username></contributor> or <contributor><ip>..</ip></contributor>
    Username,
    Ip,
    Text(bool), // deleted="deleted"
    Unknown(string_interner::DefaultSymbol),
}

impl Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::MediaWiki => write!(f, "<mediawiki>"),
            Tag::SiteInfo => write!(f, "<siteinfo>"),
            Tag::DbName => write!(f, "<dbname>"),
            Tag::Namespaces => write!(f, "<namespaces>"),
            Tag::Namespace(key) => write!(f, "<namespace key={}>", key),
            Tag::Page => write!(f, "<page>"),
            Tag::Title => write!(f, "<title>"),
            Tag::Ns => write!(f, "<ns>"),
            Tag::Revision => write!(f, "<revision>"),
            Tag::Timestamp => write!(f, "<timestamp>"),
            Tag::Contributor => write!(f, "<contributor>"),
            Tag::Username => write!(f, "<username>"),
            Tag::Ip => write!(f, "<ip>"),
            Tag::Text(deleted) => {
                if *deleted {
                    write!(f, "<text deleted>")
                } else {
                    write!(f, "<text>")
                }
            }
            Tag::Unknown(tag) => write!(f, "<unknown tag - interned symbol: {:?}>", tag),
        }
    }
}

impl Tag {
    fn from_start_bytes(e: &BytesStart, tag_interner: &mut TagStringInterner) -> Result<Self, quick_xml::Error> {
        Ok(match e.name().as_ref() {
            b"mediawiki" => Tag::MediaWiki,
            b"siteinfo" => Tag::SiteInfo,
            b"dbname" => Tag::DbName,
            b"namespaces" => Tag::Namespaces,
            b"namespace" => {
                let mut key = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"key" {
                        key = Some(attr.unescape_value()?.into_owned());
                    }
                }
                // a namespace without key is reported when its value is read
                Tag::Namespace(key.unwrap_or_default())
            }
            b"page" => Tag::Page,
            b"title" => Tag::Title,
            b"ns" => Tag::Ns,
            b"revision" => Tag::Revision,
            b"timestamp" => Tag::Timestamp,
            b"contributor" => Tag::Contributor,
            b"username" => Tag::Username,
            b"ip" => Tag::Ip,
            b"text" => {
                let mut deleted = false;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"deleted" {
                        deleted = true;
                    }
                }
                Tag::Text(deleted)
            }
            name => Tag::Unknown(tag_interner.get_or_intern(String::from_utf8_lossy(name))),
        })
    }

    fn matches_end_bytes(&self, e: &BytesEnd, tag_interner: &mut TagStringInterner) -> bool {
        match (self, e.name().as_ref()) {
            (Tag::MediaWiki, b"mediawiki") => true,
            (Tag::SiteInfo, b"siteinfo") => true,
            (Tag::DbName, b"dbname") => true,
            (Tag::Namespaces, b"namespaces") => true,
            (Tag::Namespace(_), b"namespace") => true,
            (Tag::Page, b"page") => true,
            (Tag::Title, b"title") => true,
            (Tag::Ns, b"ns") => true,
            (Tag::Revision, b"revision") => true,
            (Tag::Timestamp, b"timestamp") => true,
            (Tag::Contributor, b"contributor") => true,
            (Tag::Username, b"username") => true,
            (Tag::Ip, b"ip") => true,
            (Tag::Text(_), b"text") => true,
            (Tag::Unknown(expected), name) => {
                tag_interner.get_or_intern(String::from_utf8_lossy(name)) == *expected
            }
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("unexpected end of file")]
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Text {
    Normal(String),
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRevision {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    // username or IP address
    pub contributor: CompactString,
    pub text: Text,
}

#[derive(Debug, Default)]
struct RevisionBuilder {
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    contributor: Option<CompactString>,
    text: Option<Text>,
}

#[derive(Debug, thiserror::Error)]
#[error("missing mandatory field: {0}")]
struct BuildRevisionError(&'static str, Box<RevisionBuilder>);

impl RevisionBuilder {
    fn try_build(self) -> Result<DumpRevision, BuildRevisionError> {
        match self {
            RevisionBuilder {
                timestamp: Some(timestamp),
                contributor: Some(contributor),
                text: Some(text),
            } => Ok(DumpRevision {
                timestamp,
                contributor,
                text,
            }),
            builder => {
                let field = if builder.timestamp.is_none() {
                    "timestamp"
                } else if builder.contributor.is_none() {
                    "contributor"
                } else {
                    "text"
                };
                Err(BuildRevisionError(field, builder.into()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPage {
    pub namespace: i32,
    /// Title without namespace prefix, underscores replaced by spaces.
    pub title: CompactString,
    pub revisions: Vec<DumpRevision>,
}

#[derive(Debug, Default)]
pub struct SiteInfo {
    pub dbname: CompactString,
    pub namespaces: FxHashMap<i32, Namespace>,
}

impl SiteInfo {
    fn is_namespace_name(&self, prefix: &str) -> bool {
        self.namespaces
            .values()
            .any(|ns| matches!(ns, Namespace::Named(name) if name == prefix))
    }
}

/// Streams pages out of a MediaWiki XML export.
pub struct DumpParser<R: BufRead> {
    tag_interner: TagStringInterner,
    xml_parser: quick_xml::Reader<R>,
    buf: Vec<u8>,
    current_path: Vec<Tag>,
    site_info: SiteInfo,
}

impl<R: BufRead> Debug for DumpParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpParser")
            .field("buf.len", &self.buf.len())
            .field("current_path", &self.current_path)
            .field("site_info", &self.site_info)
            .finish_non_exhaustive()
    }
}

fn parse_timestamp(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";
    const TIMESTAMP_FORMAT_SHORT: &str = "%Y%m%d%H%M%S";

    chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_LONG)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_SHORT))
        .ok()
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
}

impl<R: BufRead> DumpParser<R> {
    pub fn new(reader: R) -> Result<Self, ParsingError> {
        let mut new = Self {
            tag_interner: TagStringInterner::new(),
            xml_parser: quick_xml::Reader::from_reader(reader),
            buf: Vec::with_capacity(64 * 1024),
            current_path: Vec::new(),
            site_info: SiteInfo::default(),
        };

        new.parse_site_info()?;

        Ok(new)
    }

    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    fn abort_parsing<T>(xml_parser: &mut quick_xml::Reader<R>) -> Result<T, ParsingError> {
        tracing::error!("Aborting parsing due to error");
        let mut rest = Vec::new();
        xml_parser
            .stream()
            .read_to_end(&mut rest)
            .map_err(|e| quick_xml::Error::Io(Arc::new(e)))?;
        Err(ParsingError::Eof)
    }

    fn check_end_tag(
        e: &BytesEnd,
        current_path: &mut Vec<Tag>,
        tag_interner: &mut TagStringInterner,
        xml_parser: &mut quick_xml::Reader<R>,
    ) -> Result<Option<Tag>, ParsingError> {
        let Some(tag) = current_path.pop() else {
            tracing::error!(
                message = "Unexpected end tag",
                tag = String::from_utf8_lossy(e.name().as_ref()).as_ref(),
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            }
            tracing::warn!("Ignoring unexpected end tag. This may lead to incorrect results.");
            return Ok(None);
        };

        if !tag.matches_end_bytes(e, tag_interner) {
            tracing::error!(
                message = "Mismatched tags",
                expected = ?tag,
                actual = String::from_utf8_lossy(e.name().as_ref()).as_ref(),
                current_path = ?current_path,
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            }
            // can't tell a missing opening tag from a typo or an unclosed tag, just carry on
            tracing::warn!("Ignoring mismatched tag. This may lead to incorrect results.");
        }

        Ok(Some(tag))
    }

    #[instrument(skip(self))]
    fn parse_site_info(&mut self) -> Result<(), ParsingError> {
        let mut site_info = SiteInfo::default();

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner)?;
                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    use Tag::*;

                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner)?;
                    // <namespace key="0" /> is the main namespace
                    if let [MediaWiki, SiteInfo, Namespaces] = self.current_path.as_slice() {
                        if let Namespace(key) = &tag {
                            match key.parse() {
                                Ok(id) => {
                                    site_info.namespaces.insert(id, self::Namespace::Default);
                                }
                                Err(_) => tracing::warn!(
                                    message = "Ignoring namespace with invalid id",
                                    id = key.as_str()
                                ),
                            }
                        }
                    }
                }
                Event::Text(e) => {
                    use Tag::*;

                    let text = e.unescape()?;
                    match self.current_path.as_slice() {
                        [MediaWiki, SiteInfo, DbName] => {
                            site_info.dbname = CompactString::from(text.as_ref());
                        }
                        [MediaWiki, SiteInfo, Namespaces, Namespace(key)] => match key.parse() {
                            Ok(id) => {
                                site_info
                                    .namespaces
                                    .insert(id, self::Namespace::Named(CompactString::from(text.as_ref())));
                            }
                            Err(_) => tracing::warn!(
                                message = "Ignoring namespace with invalid id",
                                id = key.as_str(),
                                name = text.as_ref()
                            ),
                        },
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::SiteInfo) {
                        break;
                    }
                }
                Event::Eof => {
                    tracing::error!(partial_site_info = ?site_info, current_path = ?self.current_path);
                    return Err(ParsingError::Eof);
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        self.site_info = site_info;
        Ok(())
    }

    /// Read the next page, or `None` at the end of the export.
    pub fn parse_page(&mut self) -> Result<Option<DumpPage>, ParsingError> {
        let span = tracing::span!(tracing::Level::DEBUG, "parse_page", title = tracing::field::Empty);
        let _enter = span.enter();

        let mut page = DumpPage {
            namespace: 0,
            title: CompactString::default(),
            revisions: Vec::new(),
        };
        let mut started_page = false;
        let mut revision_builder: Option<RevisionBuilder> = None;

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner)?;
                    match tag {
                        Tag::Page => started_page = true,
                        Tag::Revision => revision_builder = Some(RevisionBuilder::default()),
                        _ => {}
                    }
                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    use Tag::*;

                    let tag = Tag::from_start_bytes(e, &mut self.tag_interner)?;
                    if let ([MediaWiki, Page, Revision], Text(deleted)) = (self.current_path.as_slice(), &tag) {
                        if let Some(revision_builder) = &mut revision_builder {
                            revision_builder.text = Some(if *deleted {
                                self::Text::Deleted
                            } else {
                                self::Text::Normal(String::new())
                            });
                        }
                    }
                }
                Event::Text(e) => {
                    use Tag::*;

                    let text = e.unescape()?;
                    match self.current_path.as_slice() {
                        [MediaWiki, Page, Title] => {
                            // split off the namespace, it is identified by <ns>
                            let title = match text.split_once(':') {
                                Some((prefix, rest)) if self.site_info.is_namespace_name(prefix) => rest,
                                _ => text.as_ref(),
                            };
                            page.title = normalize_title(title);
                            span.record("title", page.title.as_str());
                        }
                        [MediaWiki, Page, Ns] => {
                            page.namespace = text.trim().parse().unwrap_or_else(|_| {
                                tracing::warn!(
                                    message = "Found invalid namespace id, defaulting to 0",
                                    ns = text.as_ref()
                                );
                                0
                            });
                        }
                        [MediaWiki, Page, Revision, Timestamp] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.timestamp = parse_timestamp(text.trim());
                                if revision_builder.timestamp.is_none() {
                                    tracing::warn!(
                                        message = "Found invalid revision timestamp",
                                        timestamp = text.as_ref()
                                    );
                                }
                            }
                        }
                        [MediaWiki, Page, Revision, Contributor, Username | Ip] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.contributor = Some(CompactString::from(text.as_ref()));
                            }
                        }
                        [MediaWiki, Page, Revision, Text(deleted)] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.text = Some(match (*deleted, revision_builder.text.take()) {
                                    (true, _) => self::Text::Deleted,
                                    // entity-heavy text may arrive in several events
                                    (false, Some(self::Text::Normal(mut previous))) => {
                                        previous.push_str(&text);
                                        self::Text::Normal(previous)
                                    }
                                    (false, _) => self::Text::Normal(text.into_owned()),
                                });
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::Revision) {
                        if let Some(builder) = revision_builder.take() {
                            match builder.try_build() {
                                Ok(revision) => page.revisions.push(revision),
                                Err(BuildRevisionError(field, partial_revision)) => {
                                    tracing::error!(
                                        message = "Missing mandatory field in revision",
                                        field,
                                        partial_revision = ?partial_revision,
                                        position = self.xml_parser.buffer_position()
                                    );
                                    if cfg!(feature = "strict") {
                                        return Self::abort_parsing(&mut self.xml_parser);
                                    }
                                    tracing::warn!("Ignoring revision with missing mandatory field");
                                }
                            }
                        }
                    }

                    if tag == Some(Tag::Page) {
                        break;
                    }
                }
                Event::Eof => {
                    if started_page {
                        tracing::error!(partial_page = ?page, current_path = ?self.current_path);
                        return Err(ParsingError::Eof);
                    }
                    return Ok(None);
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        Ok(Some(page))
    }
}

#[derive(Debug)]
struct StoredPage {
    // underscores replaced by spaces
    editors: FxHashSet<CompactString>,
    // latest revision by timestamp
    text: Text,
}

/// The pages of a MediaWiki XML export, held in memory.
///
/// Implements [`TitleFinder`] and [`PageSource`], so the vote calculator can run against an export
/// instead of a live wiki.
#[derive(Debug, Default)]
pub struct DumpWiki {
    site_info: SiteInfo,
    // sorted, so title lookups come back in a stable order
    pages: BTreeMap<(i32, CompactString), StoredPage>,
}

impl DumpWiki {
    /// Read a whole export.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParsingError> {
        let mut parser = DumpParser::new(reader)?;
        let mut pages = BTreeMap::new();

        while let Some(page) = parser.parse_page()? {
            let Some(latest) = page.revisions.iter().max_by_key(|r| r.timestamp) else {
                tracing::debug!(message = "Skipping page without revisions", title = page.title.as_str());
                continue;
            };

            let stored = StoredPage {
                text: latest.text.clone(),
                editors: page
                    .revisions
                    .iter()
                    .map(|r| normalize_title(&r.contributor))
                    .collect(),
            };
            pages.insert((page.namespace, page.title), stored);
        }

        tracing::info!(message = "Loaded XML export", dbname = parser.site_info().dbname.as_str(), pages = pages.len());

        Ok(Self {
            site_info: std::mem::take(&mut parser.site_info),
            pages,
        })
    }

    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    /// A project for `domain` using the namespace names of the export.
    pub fn project(&self, domain: &str) -> Project {
        Project {
            domain: domain.into(),
            namespaces: self.site_info.namespaces.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl TitleFinder for DumpWiki {
    fn find_titles(
        &self,
        _project: &Project,
        user: &str,
        namespace: i32,
        prefix: &str,
        exclusions: &ExclusionRules,
    ) -> Result<Vec<CompactString>, SourceError> {
        let prefix = normalize_title(prefix);
        let user = normalize_title(user);
        let below_prefix = format!("{prefix}/");
        let own_request = format!("{prefix}/{user}");

        let excluded_titles: Vec<CompactString> =
            exclusions.titles.iter().map(|t| normalize_title(t)).collect();
        let excluded_patterns: Vec<CompactString> =
            exclusions.patterns.iter().map(|p| normalize_title(p)).collect();

        Ok(self
            .pages
            .range((namespace, CompactString::default())..)
            .take_while(|((ns, _), _)| *ns == namespace)
            .filter(|((_, title), page)| {
                title.starts_with(below_prefix.as_str())
                    && page.editors.contains(user.as_str())
                    && !title.contains(own_request.as_str())
                    && !excluded_titles.contains(title)
                    && !excluded_patterns.iter().any(|p| title.contains(p.as_str()))
            })
            .map(|((_, title), _)| title.clone())
            .collect())
    }
}

impl PageSource for DumpWiki {
    fn fetch(&self, _project: &Project, page: &PageReference) -> Result<String, SourceError> {
        let key = (page.namespace, normalize_title(&page.title));
        match self.pages.get(&key) {
            Some(StoredPage {
                text: Text::Normal(text),
                ..
            }) => Ok(text.clone()),
            _ => Err(SourceError::NotFound {
                title: page.qualified_title().into(),
            }),
        }
    }
}
