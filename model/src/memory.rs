//! An in-process [`Repository`].
//!
//! All resources share one triple store. A profile is every triple whose
//! subject is the resource URI or nested beneath it, which is what lets an
//! object's profile seed its datastreams. Updates are applied by parsing the
//! `DELETE { .. } INSERT { .. } WHERE { }` bodies produced by
//! [`sparql_update`](crate::serializer::sparql::sparql_update); literal
//! objects are matched by lexical form.
//!
//! Every call is recorded, and [`MemoryRepository::fail_next`] makes the next
//! call of an operation fail, so save paths can be tested for retry safety.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{Error, RepositoryError, Result};
use crate::graph::{parse_ntriples, Object, Triple};
use crate::model::iris::{CONTENT_SUFFIX, DS_LOCATION, HAS_CHILD, HAS_PARENT, SIZE};
use crate::model::{Attribute, ObjectAttribute};
use crate::repository::{object_uri, ContentUpdate, Repository, RepositoryResult};
use crate::serializer::ntriples::to_ntriples;

/// Base URI used by [`MemoryRepository::new`].
pub const DEFAULT_BASE_URI: &str = "info:fedora";

/// A repository operation, used to select injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    /// [`Repository::fetch_object_profile`]
    FetchObjectProfile,
    /// [`Repository::fetch_datastream_profile`]
    FetchDatastreamProfile,
    /// [`Repository::fetch_datastream_content`]
    FetchDatastreamContent,
    /// [`Repository::ingest`]
    Ingest,
    /// [`Repository::apply_object_update`]
    ApplyObjectUpdate,
    /// [`Repository::apply_datastream_update`]
    ApplyDatastreamUpdate,
    /// [`Repository::push_datastream_content`]
    PushDatastreamContent,
    /// [`Repository::purge_object`]
    PurgeObject,
    /// [`Repository::purge_datastream`]
    PurgeDatastream,
    /// [`Repository::fetch_object_versions`]
    FetchObjectVersions,
    /// [`Repository::fetch_datastream_versions`]
    FetchDatastreamVersions,
}

/// Owned copy of a [`ContentUpdate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushedContent {
    /// Stored bytes.
    Bytes(Vec<u8>),
    /// External location.
    Location(String),
}

impl From<ContentUpdate<'_>> for PushedContent {
    fn from(content: ContentUpdate<'_>) -> Self {
        match content {
            ContentUpdate::Bytes(b) => PushedContent::Bytes(b.to_vec()),
            ContentUpdate::Location(l) => PushedContent::Location(l.to_string()),
        }
    }
}

/// One recorded call.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryCall {
    FetchObjectProfile { pid: String },
    FetchDatastreamProfile { pid: String, dsid: String },
    FetchDatastreamContent { pid: String, dsid: String, as_of: Option<String> },
    Ingest { pid: Option<String>, attributes: BTreeMap<String, String> },
    ApplyObjectUpdate { pid: String, query: String },
    ApplyDatastreamUpdate { pid: String, dsid: String, query: String },
    PushDatastreamContent { pid: String, dsid: String, content: PushedContent },
    PurgeObject { pid: String },
    PurgeDatastream { pid: String, dsid: String },
    FetchObjectVersions { pid: String },
    FetchDatastreamVersions { pid: String, dsid: String },
}

impl RepositoryCall {
    /// The operation this call invoked.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::FetchObjectProfile { .. } => Operation::FetchObjectProfile,
            Self::FetchDatastreamProfile { .. } => Operation::FetchDatastreamProfile,
            Self::FetchDatastreamContent { .. } => Operation::FetchDatastreamContent,
            Self::Ingest { .. } => Operation::Ingest,
            Self::ApplyObjectUpdate { .. } => Operation::ApplyObjectUpdate,
            Self::ApplyDatastreamUpdate { .. } => Operation::ApplyDatastreamUpdate,
            Self::PushDatastreamContent { .. } => Operation::PushDatastreamContent,
            Self::PurgeObject { .. } => Operation::PurgeObject,
            Self::PurgeDatastream { .. } => Operation::PurgeDatastream,
            Self::FetchObjectVersions { .. } => Operation::FetchObjectVersions,
            Self::FetchDatastreamVersions { .. } => Operation::FetchDatastreamVersions,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    triples: Vec<Triple>,
    resources: BTreeSet<String>,
    content: BTreeMap<String, Vec<u8>>,
    versions: BTreeMap<String, String>,
    calls: Vec<RepositoryCall>,
    failures: Vec<Operation>,
    minted: u64,
}

impl State {
    fn record(&mut self, call: RepositoryCall) -> RepositoryResult<()> {
        let op = call.operation();
        self.calls.push(call);
        match self.failures.iter().position(|f| *f == op) {
            Some(i) => {
                self.failures.remove(i);
                Err(RepositoryError::transport(format!("injected failure: {op:?}")))
            }
            None => Ok(()),
        }
    }

    fn require(&self, uri: &str) -> RepositoryResult<()> {
        if self.resources.contains(uri) {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(uri.to_string()))
        }
    }

    fn profile(&self, uri: &str) -> String {
        to_ntriples(self.triples.iter().filter(|t| nested(&t.subject, uri)))
    }

    fn insert(&mut self, triple: Triple) {
        if !self.triples.contains(&triple) {
            self.triples.push(triple);
        }
    }

    fn delete(&mut self, pattern: &Triple) {
        self.triples.retain(|t| {
            !(t.subject == pattern.subject
                && t.predicate == pattern.predicate
                && t.object.as_str() == pattern.object.as_str())
        });
    }

    fn replace(&mut self, subject: &str, predicate: &str, object: Object) {
        self.triples
            .retain(|t| !(t.subject == subject && t.predicate == predicate));
        self.triples.push(Triple::new(subject, predicate, object));
    }

    fn apply(&mut self, query: &str) -> RepositoryResult<()> {
        let (deletes, inserts) = parse_update(query)
            .map_err(|e| RepositoryError::transport(Error::Update(e)))?;
        for t in &deletes {
            self.delete(t);
        }
        for t in inserts {
            self.insert(t);
        }
        Ok(())
    }

    fn create_datastream(&mut self, object: &str, datastream: &str) {
        if self.resources.insert(datastream.to_string()) {
            self.insert(Triple::new(object, HAS_CHILD, Object::Iri(datastream.to_string())));
            self.insert(Triple::new(datastream, HAS_PARENT, Object::Iri(object.to_string())));
        }
    }

    fn store_content(&mut self, datastream: &str, bytes: Vec<u8>) {
        let content_subject = format!("{datastream}{CONTENT_SUFFIX}");
        self.replace(&content_subject, SIZE, Object::literal(bytes.len().to_string()));
        self.content.insert(datastream.to_string(), bytes);
    }

    fn purge(&mut self, uri: &str) {
        self.triples
            .retain(|t| !nested(&t.subject, uri) && !matches!(&t.object, Object::Iri(o) if o == uri));
        self.resources.retain(|r| !nested(r, uri));
        self.content.retain(|r, _| !nested(r, uri));
    }
}

/// Whether `subject` is `uri` or a resource beneath it.
fn nested(subject: &str, uri: &str) -> bool {
    subject
        .strip_prefix(uri)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Splits an update body into its delete and insert triples.
fn parse_update(query: &str) -> std::result::Result<(Vec<Triple>, Vec<Triple>), String> {
    let mut rest = query.trim_start();
    let deletes = clause("DELETE", &mut rest)?;
    let inserts = clause("INSERT", &mut rest)?;
    if rest.trim_end() != "WHERE { }" {
        return Err(format!("expected 'WHERE {{ }}', found {rest:?}"));
    }
    Ok((deletes, inserts))
}

/// Consumes `KEYWORD { .. }` from the front of `rest`, if present.
fn clause(keyword: &str, rest: &mut &str) -> std::result::Result<Vec<Triple>, String> {
    let Some(body) = rest.strip_prefix(keyword).map(str::trim_start) else {
        return Ok(Vec::new());
    };
    let Some(body) = body.strip_prefix('{') else {
        return Err(format!("expected '{{' after {keyword}"));
    };
    let Some(end) = body.find(" }\n") else {
        return Err(format!("unterminated {keyword} clause"));
    };
    *rest = body[end + 3..].trim_start();
    parse_ntriples(&body[..end])
}

/// A [`Repository`] kept entirely in memory.
#[derive(Debug)]
pub struct MemoryRepository {
    base_uri: String,
    state: Mutex<State>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// An empty repository under [`DEFAULT_BASE_URI`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_uri(DEFAULT_BASE_URI)
    }

    /// An empty repository under `base_uri`.
    #[must_use]
    pub fn with_base_uri(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn uri(&self, pid: &str) -> String {
        object_uri(&self.base_uri, pid)
    }

    fn ds_uri(&self, pid: &str, dsid: &str) -> String {
        format!("{}/{}", self.uri(pid), dsid)
    }

    /// Adds the triples of an N-Triples document. Every subject becomes an
    /// existing resource.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] if the document is malformed.
    pub fn load_ntriples(&self, content: &str) -> Result<()> {
        let triples = parse_ntriples(content).map_err(|message| Error::Parse {
            subject: self.base_uri.clone(),
            message,
        })?;
        let mut state = self.state();
        for t in triples {
            if !t.subject.ends_with(CONTENT_SUFFIX) {
                state.resources.insert(t.subject.clone());
            }
            state.insert(t);
        }
        Ok(())
    }

    /// Creates object `pid` with no triples.
    pub fn add_object(&self, pid: &str) {
        let uri = self.uri(pid);
        self.state().resources.insert(uri);
    }

    /// Stores content for a datastream, creating object and datastream as
    /// needed. Not recorded as a call.
    pub fn add_content(&self, pid: &str, dsid: &str, bytes: impl Into<Vec<u8>>) {
        let (uri, ds) = (self.uri(pid), self.ds_uri(pid, dsid));
        let mut state = self.state();
        state.resources.insert(uri.clone());
        state.create_datastream(&uri, &ds);
        state.store_content(&ds, bytes.into());
    }

    /// Sets the raw history returned for an object (`dsid = None`) or one of
    /// its datastreams.
    pub fn set_versions(&self, pid: &str, dsid: Option<&str>, xml: impl Into<String>) {
        let uri = match dsid {
            Some(dsid) => self.ds_uri(pid, dsid),
            None => self.uri(pid),
        };
        self.state().versions.insert(uri, xml.into());
    }

    /// Makes the next call of `op` fail with a transport error.
    pub fn fail_next(&self, op: Operation) {
        self.state().failures.push(op);
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.state().calls.clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Whether a resource exists.
    #[must_use]
    pub fn contains(&self, pid: &str, dsid: Option<&str>) -> bool {
        let uri = match dsid {
            Some(dsid) => self.ds_uri(pid, dsid),
            None => self.uri(pid),
        };
        self.state().resources.contains(&uri)
    }

    /// Current profile of a resource, whether or not it exists.
    #[must_use]
    pub fn dump(&self, uri: &str) -> String {
        self.state().profile(uri)
    }

    /// Stored content of a datastream.
    #[must_use]
    pub fn content(&self, pid: &str, dsid: &str) -> Option<Vec<u8>> {
        let ds = self.ds_uri(pid, dsid);
        self.state().content.get(&ds).cloned()
    }
}

impl Repository for MemoryRepository {
    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn fetch_object_profile(&self, pid: &str) -> RepositoryResult<String> {
        let uri = self.uri(pid);
        let mut state = self.state();
        state.record(RepositoryCall::FetchObjectProfile { pid: pid.to_string() })?;
        state.require(&uri)?;
        Ok(state.profile(&uri))
    }

    fn fetch_datastream_profile(&self, pid: &str, dsid: &str) -> RepositoryResult<String> {
        let ds = self.ds_uri(pid, dsid);
        let mut state = self.state();
        state.record(RepositoryCall::FetchDatastreamProfile {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
        })?;
        state.require(&ds)?;
        Ok(state.profile(&ds))
    }

    fn fetch_datastream_content(
        &self,
        pid: &str,
        dsid: &str,
        as_of: Option<&str>,
    ) -> RepositoryResult<Box<dyn Read + Send>> {
        let ds = self.ds_uri(pid, dsid);
        let mut state = self.state();
        state.record(RepositoryCall::FetchDatastreamContent {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
            as_of: as_of.map(str::to_string),
        })?;
        match state.content.get(&ds) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(RepositoryError::NotFound(ds)),
        }
    }

    fn ingest(&self, pid: Option<&str>, attributes: &BTreeMap<String, String>) -> RepositoryResult<String> {
        let mut state = self.state();
        state.record(RepositoryCall::Ingest {
            pid: pid.map(str::to_string),
            attributes: attributes.clone(),
        })?;
        let pid = match pid {
            Some(pid) => pid.to_string(),
            None => {
                state.minted += 1;
                format!("changeme:{}", state.minted)
            }
        };
        let uri = self.uri(&pid);
        if !state.resources.insert(uri.clone()) {
            return Err(RepositoryError::transport(format!("{uri} already exists")));
        }
        for (name, value) in attributes {
            match ObjectAttribute::from_name(name).and_then(ObjectAttribute::predicate) {
                Some(predicate) => state.insert(Triple::new(&uri, predicate, Object::literal(value))),
                None => debug!(attribute = %name, "ignoring unknown ingest attribute"),
            }
        }
        debug!(%pid, "ingested");
        Ok(pid)
    }

    fn apply_object_update(&self, pid: &str, query: &str) -> RepositoryResult<()> {
        let uri = self.uri(pid);
        let mut state = self.state();
        state.record(RepositoryCall::ApplyObjectUpdate {
            pid: pid.to_string(),
            query: query.to_string(),
        })?;
        state.require(&uri)?;
        state.apply(query)
    }

    fn apply_datastream_update(&self, pid: &str, dsid: &str, query: &str) -> RepositoryResult<()> {
        let ds = self.ds_uri(pid, dsid);
        let mut state = self.state();
        state.record(RepositoryCall::ApplyDatastreamUpdate {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
            query: query.to_string(),
        })?;
        state.require(&ds)?;
        state.apply(query)
    }

    fn push_datastream_content(&self, pid: &str, dsid: &str, content: ContentUpdate<'_>) -> RepositoryResult<()> {
        let (uri, ds) = (self.uri(pid), self.ds_uri(pid, dsid));
        let mut state = self.state();
        state.record(RepositoryCall::PushDatastreamContent {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
            content: content.into(),
        })?;
        state.require(&uri)?;
        state.create_datastream(&uri, &ds);
        match content {
            ContentUpdate::Bytes(bytes) => state.store_content(&ds, bytes.to_vec()),
            ContentUpdate::Location(location) => state.replace(&ds, DS_LOCATION, Object::literal(location)),
        }
        Ok(())
    }

    fn purge_object(&self, pid: &str) -> RepositoryResult<()> {
        let uri = self.uri(pid);
        let mut state = self.state();
        state.record(RepositoryCall::PurgeObject { pid: pid.to_string() })?;
        state.require(&uri)?;
        state.purge(&uri);
        Ok(())
    }

    fn purge_datastream(&self, pid: &str, dsid: &str) -> RepositoryResult<()> {
        let ds = self.ds_uri(pid, dsid);
        let mut state = self.state();
        state.record(RepositoryCall::PurgeDatastream {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
        })?;
        state.require(&ds)?;
        state.purge(&ds);
        Ok(())
    }

    fn fetch_object_versions(&self, pid: &str) -> RepositoryResult<String> {
        let uri = self.uri(pid);
        let mut state = self.state();
        state.record(RepositoryCall::FetchObjectVersions { pid: pid.to_string() })?;
        state.require(&uri)?;
        Ok(state.versions.get(&uri).cloned().unwrap_or_default())
    }

    fn fetch_datastream_versions(&self, pid: &str, dsid: &str) -> RepositoryResult<String> {
        let ds = self.ds_uri(pid, dsid);
        let mut state = self.state();
        state.record(RepositoryCall::FetchDatastreamVersions {
            pid: pid.to_string(),
            dsid: dsid.to_string(),
        })?;
        state.require(&ds)?;
        Ok(state.versions.get(&ds).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
<info:fedora/demo:1> <http://purl.org/dc/terms/title> "old" .
<info:fedora/demo:1> <info:fedora/fedora-system:def/internal#hasChild> <info:fedora/demo:1/DC> .
<info:fedora/demo:1/DC> <http://purl.org/dc/terms/type> "text/xml" .
<info:fedora/demo:2> <http://purl.org/dc/terms/title> "other" .
"#;

    fn repo() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.load_ntriples(PROFILE).unwrap();
        repo
    }

    #[test]
    fn profiles_include_nested_resources_only() {
        let profile = repo().fetch_object_profile("demo:1").unwrap();
        assert!(profile.contains("\"old\""));
        assert!(profile.contains("<info:fedora/demo:1/DC> <http://purl.org/dc/terms/type>"));
        assert!(!profile.contains("demo:2"));
    }

    #[test]
    fn missing_resources_are_not_found() {
        let err = repo().fetch_object_profile("demo:9");
        assert!(matches!(err, Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn updates_delete_then_insert() {
        let repo = repo();
        let query = "DELETE { <info:fedora/demo:1> <http://purl.org/dc/terms/title> \"old\" . }\n\
                     INSERT { <info:fedora/demo:1> <http://purl.org/dc/terms/title> \"new \\\"one\\\"\" . }\n\
                     WHERE { }";
        assert!(repo.apply_object_update("demo:1", query).is_ok());
        let profile = repo.dump("info:fedora/demo:1");
        assert!(!profile.contains("\"old\""));
        assert!(profile.contains(r#""new \"one\"""#));
    }

    #[test]
    fn malformed_updates_are_rejected() {
        let repo = repo();
        assert!(repo.apply_object_update("demo:1", "INSERT { oops").is_err());
        assert!(repo.apply_object_update("demo:1", "DROP ALL").is_err());
    }

    #[test]
    fn ingest_mints_pids() {
        let repo = MemoryRepository::new();
        let pid = repo.ingest(None, &BTreeMap::new()).unwrap();
        assert_eq!(pid, "changeme:1");
        assert!(repo.contains("changeme:1", None));
        assert!(repo.ingest(Some("changeme:1"), &BTreeMap::new()).is_err());
    }

    #[test]
    fn ingest_attributes_become_triples() {
        let repo = MemoryRepository::new();
        let attrs = BTreeMap::from([("label".to_string(), "Hello".to_string())]);
        assert!(repo.ingest(Some("demo:5"), &attrs).is_ok());
        assert!(repo.dump("info:fedora/demo:5").contains("<http://purl.org/dc/terms/title> \"Hello\" ."));
    }

    #[test]
    fn pushing_content_creates_the_datastream() {
        let repo = repo();
        assert!(repo
            .push_datastream_content("demo:2", "IMG", ContentUpdate::Bytes(b"12345"))
            .is_ok());
        assert!(repo.contains("demo:2", Some("IMG")));
        let profile = repo.dump("info:fedora/demo:2");
        assert!(profile.contains("<info:fedora/demo:2/IMG/fcr:content> <info:fedora/size> \"5\" ."));
        assert!(profile.contains("#hasChild> <info:fedora/demo:2/IMG> ."));
        assert_eq!(repo.content("demo:2", "IMG").as_deref(), Some(&b"12345"[..]));
    }

    #[test]
    fn injected_failures_fire_once() {
        let repo = repo();
        repo.fail_next(Operation::PurgeObject);
        assert!(repo.purge_object("demo:1").is_err());
        assert!(repo.contains("demo:1", None));
        assert!(repo.purge_object("demo:1").is_ok());
        assert!(!repo.contains("demo:1", None));
        assert!(!repo.contains("demo:1", Some("DC")));
        assert_eq!(repo.calls().len(), 2);
    }

    #[test]
    fn purging_a_datastream_unlinks_it() {
        let repo = repo();
        assert!(repo.purge_datastream("demo:1", "DC").is_ok());
        assert!(!repo.dump("info:fedora/demo:1").contains("hasChild"));
    }
}
