//! Datastreams: named content units of a digital object.
//!
//! A [`Datastream`] tracks its profile attributes through an
//! [`AttributeStore`] and its content separately. How content dirtiness is
//! judged depends on the control group:
//!
//! - `E` and `R` datastreams point elsewhere; only their location is
//!   tracked, as an ordinary attribute.
//! - `X` datastreams hold inline XML and are compared semantically.
//! - `M` datastreams are compared byte for byte.

use std::io::Read;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::client::Client;
use crate::error::{Error, RepositoryError, Result};
use crate::graph::{mapping, Graph, Mapping};
use crate::model::iris::{CREATED, SIZE};
use crate::model::{validate_enumerated, Attribute, ControlGroup, DatastreamAttribute};
use crate::repository::ContentUpdate;
use crate::serializer::sparql::sparql_update;
use crate::store::AttributeStore;
use crate::stream::ByteRange;
use crate::value::{Scalar, Value};
use crate::xml;

fn datastream_mapping() -> Mapping {
    static MAPPING: OnceLock<Mapping> = OnceLock::new();
    MAPPING
        .get_or_init(|| mapping(DatastreamAttribute::mapping()))
        .clone()
}

/// Rejects values outside an enumerated attribute's codes.
fn validate(attr: DatastreamAttribute, value: &Value) -> Result<()> {
    if attr == DatastreamAttribute::ControlGroup {
        validate_enumerated(value, |s| s.parse::<ControlGroup>(), "controlGroup", ControlGroup::ALLOWED)?;
    }
    Ok(())
}

/// Remote content as far as this handle knows it.
#[derive(Debug, Clone, Default)]
enum RemoteContent {
    #[default]
    Unfetched,
    Missing,
    Loaded(Vec<u8>),
}

impl RemoteContent {
    fn bytes(&self) -> Option<&[u8]> {
        match self {
            RemoteContent::Loaded(b) => Some(b),
            RemoteContent::Unfetched | RemoteContent::Missing => None,
        }
    }
}

/// A datastream of a digital object.
#[derive(Debug, Clone)]
pub struct Datastream {
    client: Client,
    pid: Option<String>,
    dsid: String,
    store: AttributeStore<DatastreamAttribute>,
    content: Option<Vec<u8>>,
    remote: RemoteContent,
    deleted: bool,
}

impl Datastream {
    pub(crate) fn new(client: Client, pid: Option<String>, dsid: impl Into<String>, as_of: Option<String>) -> Self {
        Self {
            client,
            pid,
            dsid: dsid.into(),
            store: AttributeStore::new(as_of),
            content: None,
            remote: RemoteContent::Unfetched,
            deleted: false,
        }
    }

    /// A handle whose profile is a view of its object's profile graph.
    pub(crate) fn seeded(
        client: Client,
        pid: Option<String>,
        dsid: impl Into<String>,
        as_of: Option<String>,
        graph: Graph,
    ) -> Self {
        let mut ds = Self::new(client, pid, dsid, as_of);
        ds.store.install(graph);
        ds
    }

    pub(crate) fn set_pid(&mut self, pid: &str) {
        self.pid = Some(pid.to_string());
    }

    /// Datastream id.
    #[must_use]
    pub fn dsid(&self) -> &str {
        &self.dsid
    }

    /// Pid of the owning object, once it has one.
    #[must_use]
    pub fn pid(&self) -> Option<&str> {
        self.pid.as_deref()
    }

    /// `<object uri>/<dsid>`, once the owning object has a pid.
    #[must_use]
    pub fn uri(&self) -> Option<String> {
        self.pid
            .as_deref()
            .map(|pid| format!("{}/{}", self.client.object_uri(pid), self.dsid))
    }

    fn display_uri(&self) -> String {
        self.uri().unwrap_or_else(|| self.dsid.clone())
    }

    /// Timestamp of a historical handle.
    #[must_use]
    pub fn as_of_date_time(&self) -> Option<&str> {
        self.store.as_of()
    }

    /// A read-only handle on this datastream as of `timestamp`.
    #[must_use]
    pub fn as_of(&self, timestamp: impl Into<String>) -> Datastream {
        Datastream::new(self.client.clone(), self.pid.clone(), self.dsid.clone(), Some(timestamp.into()))
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.store.as_of() {
            Some(as_of) => Err(Error::ReadOnly {
                uri: self.display_uri(),
                as_of: as_of.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_profile(&mut self) -> Result<()> {
        if !self.store.needs_profile() {
            return Ok(());
        }
        let (Some(pid), Some(uri)) = (self.pid.clone(), self.uri()) else {
            self.store
                .install_absent(Graph::empty(self.dsid.clone(), datastream_mapping()));
            return Ok(());
        };
        debug!(%pid, dsid = %self.dsid, "fetching datastream profile");
        match self.client.repository().fetch_datastream_profile(&pid, &self.dsid) {
            Ok(data) => {
                let graph = Graph::parse(uri, &data, datastream_mapping())?;
                self.store.install(graph);
            }
            Err(RepositoryError::NotFound(_)) => {
                self.store.install_absent(Graph::empty(uri, datastream_mapping()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn graph(&mut self) -> Result<Option<&Graph>> {
        self.ensure_profile()?;
        Ok(self.store.graph())
    }

    /// Whether the datastream does not exist in the repository.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn is_new(&mut self) -> Result<bool> {
        self.ensure_profile()?;
        Ok(self.store.exists() == Some(false))
    }

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn get(&mut self, attr: DatastreamAttribute) -> Result<Value> {
        self.ensure_profile()?;
        Ok(self.store.read(attr))
    }

    /// Writes an attribute. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, [`Error::Validation`] for
    /// an invalid control group, or the error of the profile fetch.
    pub fn set(&mut self, attr: DatastreamAttribute, value: impl Into<Value>) -> Result<bool> {
        self.ensure_writable()?;
        let value = value.into();
        validate(attr, &value)?;
        self.ensure_profile()?;
        Ok(self.store.write(attr, value))
    }

    /// Appends a value to a multi-valued attribute.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, [`Error::Validation`] if
    /// the result is not a valid control group, or the error of the profile
    /// fetch.
    pub fn add(&mut self, attr: DatastreamAttribute, value: impl Into<Scalar>) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_profile()?;
        let value = value.into();
        validate(attr, &self.store.with_added(attr, &value))?;
        self.store.add(attr, value);
        Ok(())
    }

    /// Removes a value from a multi-valued attribute. Returns `false` if it
    /// was not present.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, [`Error::Validation`] if
    /// the result is not a valid control group, or the error of the profile
    /// fetch.
    pub fn remove(&mut self, attr: DatastreamAttribute, value: impl Into<Scalar>) -> Result<bool> {
        self.ensure_writable()?;
        self.ensure_profile()?;
        let value = value.into();
        validate(attr, &self.store.with_removed(attr, &value))?;
        Ok(self.store.remove(attr, &value))
    }

    /// Overrides the default of `attr` for this handle, e.g. to create an
    /// inline datastream without writing `controlGroup`.
    pub fn set_default(&mut self, attr: DatastreamAttribute, value: impl Into<Value>) {
        self.store.set_default(attr, value);
    }

    fn first_text(&mut self, attr: DatastreamAttribute) -> Result<Option<String>> {
        Ok(self.get(attr)?.first_text().map(str::to_string))
    }

    /// Storage mode.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the profile holds an unknown control group,
    /// or the error of the profile fetch.
    pub fn control_group(&mut self) -> Result<ControlGroup> {
        let value = self.get(DatastreamAttribute::ControlGroup)?;
        validate_enumerated(&value, |s| s.parse::<ControlGroup>(), "controlGroup", ControlGroup::ALLOWED)
    }

    /// Whether content lives outside the repository (`E`).
    ///
    /// # Errors
    ///
    /// See [`Datastream::control_group`].
    pub fn is_external(&mut self) -> Result<bool> {
        Ok(self.control_group()? == ControlGroup::External)
    }

    /// Whether requests are redirected to the content (`R`).
    ///
    /// # Errors
    ///
    /// See [`Datastream::control_group`].
    pub fn is_redirect(&mut self) -> Result<bool> {
        Ok(self.control_group()? == ControlGroup::Redirect)
    }

    /// Whether the repository stores the content (`M`).
    ///
    /// # Errors
    ///
    /// See [`Datastream::control_group`].
    pub fn is_managed(&mut self) -> Result<bool> {
        Ok(self.control_group()? == ControlGroup::Managed)
    }

    /// Whether the content is inline XML (`X`).
    ///
    /// # Errors
    ///
    /// See [`Datastream::control_group`].
    pub fn is_inline(&mut self) -> Result<bool> {
        Ok(self.control_group()? == ControlGroup::Inline)
    }

    /// Label (`dsLabel`).
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn label(&mut self) -> Result<Option<String>> {
        self.first_text(DatastreamAttribute::Label)
    }

    /// Sets the label.
    ///
    /// # Errors
    ///
    /// See [`Datastream::set`].
    pub fn set_label(&mut self, label: impl Into<String>) -> Result<bool> {
        self.set(DatastreamAttribute::Label, label.into())
    }

    /// MIME type, the first value if the profile holds several.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn mime_type(&mut self) -> Result<Option<String>> {
        self.first_text(DatastreamAttribute::MimeType)
    }

    /// Sets the MIME type.
    ///
    /// # Errors
    ///
    /// See [`Datastream::set`].
    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) -> Result<bool> {
        self.set(DatastreamAttribute::MimeType, mime_type.into())
    }

    /// Whether the repository keeps versions of this datastream.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn versionable(&mut self) -> Result<bool> {
        Ok(self.first_text(DatastreamAttribute::Versionable)?.as_deref() == Some("true"))
    }

    /// Sets versioning.
    ///
    /// # Errors
    ///
    /// See [`Datastream::set`].
    pub fn set_versionable(&mut self, versionable: bool) -> Result<bool> {
        self.set(DatastreamAttribute::Versionable, versionable)
    }

    /// Location of external or redirect content.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn location(&mut self) -> Result<Option<String>> {
        self.first_text(DatastreamAttribute::Location)
    }

    /// Sets the location of external or redirect content.
    ///
    /// # Errors
    ///
    /// See [`Datastream::set`].
    pub fn set_location(&mut self, location: impl Into<String>) -> Result<bool> {
        self.set(DatastreamAttribute::Location, location.into())
    }

    /// Checksum value.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn checksum(&mut self) -> Result<Option<String>> {
        self.first_text(DatastreamAttribute::Checksum)
    }

    /// Creation timestamp, as published by the repository.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn created(&mut self) -> Result<Option<String>> {
        Ok(self
            .graph()?
            .and_then(|g| g.read(CREATED).into_iter().next()))
    }

    /// Content size in bytes, read from the content subject.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn size(&mut self) -> Result<Option<u64>> {
        Ok(self.graph()?.and_then(|g| {
            g.with_content_subject()
                .read(SIZE)
                .first()
                .and_then(|s| s.parse().ok())
        }))
    }

    /// Replaces the local content.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_writable()?;
        self.content = Some(content.into());
        Ok(())
    }

    /// Replaces the local content with everything `reader` yields.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, [`Error::Io`] if reading
    /// fails.
    pub fn set_content_from_reader(&mut self, mut reader: impl Read) -> Result<()> {
        self.ensure_writable()?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        self.content = Some(buf);
        Ok(())
    }

    /// Remote content, fetched once and cached. `None` if the repository has
    /// none.
    fn fetch_remote(&mut self) -> Result<Option<&[u8]>> {
        if let RemoteContent::Unfetched = self.remote {
            self.remote = match (self.pid.clone(), self.is_new()?) {
                (Some(pid), false) => {
                    debug!(%pid, dsid = %self.dsid, "fetching datastream content");
                    match self
                        .client
                        .repository()
                        .fetch_datastream_content(&pid, &self.dsid, self.store.as_of())
                    {
                        Ok(mut reader) => {
                            let mut buf = Vec::new();
                            reader.read_to_end(&mut buf)?;
                            RemoteContent::Loaded(buf)
                        }
                        Err(RepositoryError::NotFound(_)) => RemoteContent::Missing,
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => RemoteContent::Missing,
            };
        }
        Ok(self.remote.bytes())
    }

    /// Local content if set, else the remote content.
    ///
    /// # Errors
    ///
    /// The error of the content fetch.
    pub fn content(&mut self) -> Result<Option<&[u8]>> {
        if self.content.is_some() {
            return Ok(self.content.as_deref());
        }
        self.fetch_remote()
    }

    /// Whether local content differs from the repository's.
    ///
    /// # Errors
    ///
    /// The error of the profile or (in eager mode) content fetch.
    pub fn content_changed(&mut self) -> Result<bool> {
        if self.control_group()?.is_by_reference() || self.content.is_none() {
            return Ok(false);
        }
        if self.is_new()? {
            return Ok(self.content.as_ref().is_some_and(|c| !c.is_empty()));
        }
        if self.client.settings().eager_load_datastream_content {
            self.fetch_remote()?;
        }
        let inline = self.control_group()? == ControlGroup::Inline;
        let (Some(local), remote) = (self.content.as_deref(), self.remote.bytes()) else {
            return Ok(false);
        };
        Ok(match remote {
            Some(remote) if inline => !xml::equivalent(local, remote),
            Some(remote) => local != remote,
            None => true,
        })
    }

    /// Whether attributes or content have pending changes.
    ///
    /// # Errors
    ///
    /// See [`Datastream::content_changed`].
    pub fn is_changed(&mut self) -> Result<bool> {
        Ok(self.store.is_changed() || self.content_changed()?)
    }

    /// Whether [`DigitalObject::save`](crate::DigitalObject::save) has to
    /// save this datastream.
    ///
    /// # Errors
    ///
    /// See [`Datastream::content_changed`].
    pub fn needs_to_be_saved(&mut self) -> Result<bool> {
        self.is_changed()
    }

    /// Whether there is content to save: local content, an existing
    /// datastream, or a location for a new `E`/`R` datastream.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn has_content(&mut self) -> Result<bool> {
        if self.content.is_some() || !self.is_new()? {
            return Ok(true);
        }
        if self.control_group()?.is_by_reference() {
            return Ok(self.location()?.is_some_and(|l| !l.is_empty()));
        }
        Ok(false)
    }

    /// Attributes with pending changes.
    #[must_use]
    pub fn changed_attributes(&self) -> Vec<DatastreamAttribute> {
        self.store.changed()
    }

    /// The SPARQL update a save would send, if any.
    #[must_use]
    pub fn sparql_update(&self) -> Option<String> {
        self.uri().and_then(|uri| sparql_update(&uri, &self.store))
    }

    /// Streams the byte range `[from, from + length)` of the remote content.
    /// `length` defaults to the rest of the content.
    ///
    /// # Errors
    ///
    /// [`Error::SizeUnavailable`] if the profile publishes no size,
    /// [`Error::Precondition`] without an owning pid, or the error of the
    /// content fetch.
    pub fn stream(&mut self, from: u64, length: Option<u64>) -> Result<ByteRange> {
        let size = self
            .size()?
            .ok_or_else(|| Error::SizeUnavailable(self.display_uri()))?;
        let pid = self.require_pid("stream")?;
        let length = length.unwrap_or_else(|| size.saturating_sub(from));
        let reader = self
            .client
            .repository()
            .fetch_datastream_content(&pid, &self.dsid, self.store.as_of())?;
        Ok(ByteRange::new(reader, from, length, self.client.settings().stream_chunk_size))
    }

    fn require_pid(&self, action: &'static str) -> Result<String> {
        self.pid.clone().ok_or_else(|| Error::Precondition {
            action,
            uri: self.dsid.clone(),
            reason: "the owning object has no pid",
        })
    }

    /// Pushes content (or the location of `E`/`R` datastreams) and the
    /// attribute diff, then drops local state. Nothing is reset on failure.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, [`Error::Precondition`]
    /// without content or owning pid, or the error of a repository call.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let pid = self.require_pid("save")?;
        if !self.has_content()? {
            return Err(Error::Precondition {
                action: "save",
                uri: self.display_uri(),
                reason: "it has no content",
            });
        }
        let query = self.sparql_update();
        let created = self.is_new()?;
        let content_changed = self.content_changed()?;
        let location = if self.control_group()?.is_by_reference() {
            Some(self.location()?.unwrap_or_default())
        } else {
            None
        };

        let client = self.client.clone();
        let repository = client.repository();
        if content_changed || (created && location.is_none()) {
            let bytes = self.content.as_deref().unwrap_or_default();
            debug!(%pid, dsid = %self.dsid, len = bytes.len(), "pushing datastream content");
            repository.push_datastream_content(&pid, &self.dsid, ContentUpdate::Bytes(bytes))?;
        } else if let Some(location) = &location {
            repository.push_datastream_content(&pid, &self.dsid, ContentUpdate::Location(location))?;
        }
        if let Some(query) = query {
            repository.apply_datastream_update(&pid, &self.dsid, &query)?;
        }
        info!(%pid, dsid = %self.dsid, "saved datastream");
        self.reset();
        self.deleted = false;
        Ok(())
    }

    /// Purges the datastream unless it was never saved, then drops local
    /// state. The owning object stops listing the handle.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical handles, or the error of the purge.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if !self.is_new()? {
            let pid = self.require_pid("delete")?;
            self.client.repository().purge_datastream(&pid, &self.dsid)?;
            info!(%pid, dsid = %self.dsid, "purged datastream");
        }
        self.reset();
        self.deleted = true;
        Ok(())
    }

    /// Whether [`Datastream::delete`] succeeded on this handle.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Raw version history XML, unparsed.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] without an owning pid, or the error of the
    /// repository call.
    pub fn version_history(&self) -> Result<String> {
        let pid = self.require_pid("read versions of")?;
        Ok(self.client.repository().fetch_datastream_versions(&pid, &self.dsid)?)
    }

    fn reset(&mut self) {
        self.store.reset();
        self.content = None;
        self.remote = RemoteContent::Unfetched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Settings;
    use crate::memory::{MemoryRepository, Operation, PushedContent, RepositoryCall};

    const PROFILE: &str = r#"
<info:fedora/demo:1> <info:fedora/fedora-system:def/internal#hasChild> <info:fedora/demo:1/IMG> .
<info:fedora/demo:1/IMG> <info:fedora3/controlGroup> "M" .
<info:fedora/demo:1/IMG> <http://purl.org/dc/terms/title> "Image" .
<info:fedora/demo:1/IMG> <info:fedora/fedora-system:def/internal#created> "2013-01-01T00:00:00Z" .
"#;

    fn setup(settings: Settings) -> (Arc<MemoryRepository>, Client) {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_object("demo:1");
        repo.load_ntriples(PROFILE).unwrap();
        repo.add_content("demo:1", "IMG", b"0123456789".to_vec());
        let client = Client::with_settings(repo.clone(), settings);
        (repo, client)
    }

    fn ds(client: &Client, dsid: &str) -> Datastream {
        Datastream::new(client.clone(), Some("demo:1".into()), dsid, None)
    }

    #[test]
    fn profile_reads_and_defaults() {
        let (_, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        assert!(!img.is_new().unwrap());
        assert_eq!(img.label().unwrap().as_deref(), Some("Image"));
        assert_eq!(img.mime_type().unwrap().as_deref(), Some("application/octet-stream"));
        assert!(img.versionable().unwrap());
        assert!(img.is_managed().unwrap());
        assert_eq!(img.created().unwrap().as_deref(), Some("2013-01-01T00:00:00Z"));
        assert_eq!(img.size().unwrap(), Some(10));
    }

    #[test]
    fn invalid_control_group_is_rejected_before_tracking() {
        let (_, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        let err = img.set(DatastreamAttribute::ControlGroup, "Z");
        assert!(matches!(err, Err(Error::Validation { attribute: "controlGroup", .. })));
        assert!(!img.is_changed().unwrap());
    }

    #[test]
    fn control_group_element_edits_are_validated() {
        let (_, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        let err = img.add(DatastreamAttribute::ControlGroup, "X");
        assert!(matches!(err, Err(Error::Validation { attribute: "controlGroup", .. })));
        assert!(img.remove(DatastreamAttribute::ControlGroup, "M").is_err());
        assert!(!img.is_changed().unwrap());
        assert_eq!(img.sparql_update(), None);
    }

    #[test]
    fn unchanged_content_is_not_dirty() {
        let (_, client) = setup(Settings {
            eager_load_datastream_content: true,
            ..Settings::default()
        });
        let mut img = ds(&client, "IMG");
        assert!(img.set_content(b"0123456789".to_vec()).is_ok());
        assert!(!img.content_changed().unwrap());
        assert!(img.set_content(b"other".to_vec()).is_ok());
        assert!(img.content_changed().unwrap());
    }

    #[test]
    fn lazy_mode_compares_against_cache_only() {
        let (repo, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        assert!(img.set_content(b"0123456789".to_vec()).is_ok());
        assert!(img.content_changed().unwrap());
        assert!(!repo
            .calls()
            .iter()
            .any(|c| matches!(c, RepositoryCall::FetchDatastreamContent { .. })));
    }

    #[test]
    fn content_prefers_local_then_remote() {
        let (_, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        assert_eq!(img.content().unwrap(), Some(&b"0123456789"[..]));
        assert!(img.set_content("local").is_ok());
        assert_eq!(img.content().unwrap(), Some(&b"local"[..]));
    }

    #[test]
    fn new_datastream_without_content_cannot_be_saved() {
        let (_, client) = setup(Settings::default());
        let mut new = ds(&client, "NEW");
        assert!(new.is_new().unwrap());
        assert!(!new.has_content().unwrap());
        assert!(matches!(new.save(), Err(Error::Precondition { action: "save", .. })));
    }

    #[test]
    fn new_external_datastream_needs_a_location() {
        let (repo, client) = setup(Settings::default());
        let mut ext = ds(&client, "EXT");
        assert!(ext.set(DatastreamAttribute::ControlGroup, "E").is_ok());
        assert!(!ext.has_content().unwrap());
        assert!(ext.set_location("http://example.org/file").is_ok());
        assert!(ext.has_content().unwrap());
        assert!(!ext.content_changed().unwrap());
        assert!(ext.save().is_ok());
        assert!(repo.calls().contains(&RepositoryCall::PushDatastreamContent {
            pid: "demo:1".into(),
            dsid: "EXT".into(),
            content: PushedContent::Location("http://example.org/file".into()),
        }));
        let mut ext = ds(&client, "EXT");
        assert!(ext.is_external().unwrap());
        assert_eq!(ext.location().unwrap().as_deref(), Some("http://example.org/file"));
    }

    #[test]
    fn saving_new_content_creates_the_datastream() {
        let (repo, client) = setup(Settings::default());
        let mut new = ds(&client, "TXT");
        assert!(new.set_content("hello").is_ok());
        assert!(new.set_mime_type("text/plain").is_ok());
        assert!(new.save().is_ok());
        assert_eq!(repo.content("demo:1", "TXT").as_deref(), Some(&b"hello"[..]));
        assert!(!new.is_changed().unwrap());
        assert_eq!(new.mime_type().unwrap().as_deref(), Some("text/plain"));
        assert_eq!(new.size().unwrap(), Some(5));
    }

    #[test]
    fn failed_save_keeps_dirty_state() {
        let (repo, client) = setup(Settings::default());
        let mut img = ds(&client, "IMG");
        assert!(img.set_label("Renamed").is_ok());
        repo.fail_next(Operation::ApplyDatastreamUpdate);
        assert!(img.save().is_err());
        assert!(img.is_changed().unwrap());
        assert!(img.save().is_ok());
        assert_eq!(img.label().unwrap().as_deref(), Some("Renamed"));
    }

    #[test]
    fn stream_windows_remote_content() {
        let (_, client) = setup(Settings {
            stream_chunk_size: 3,
            ..Settings::default()
        });
        let mut img = ds(&client, "IMG");
        let bytes = img
            .stream(2, Some(5))
            .and_then(|r| Ok(r.collect_bytes()?))
            .unwrap();
        assert_eq!(bytes, b"23456");
        let rest = img
            .stream(7, None)
            .and_then(|r| Ok(r.collect_bytes()?))
            .unwrap();
        assert_eq!(rest, b"789");
    }

    #[test]
    fn stream_requires_a_size() {
        let (_, client) = setup(Settings::default());
        let mut new = ds(&client, "NOPE");
        assert!(matches!(new.stream(0, None), Err(Error::SizeUnavailable(_))));
    }

    #[test]
    fn historical_handles_are_read_only() {
        let (repo, client) = setup(Settings::default());
        let mut old = ds(&client, "IMG").as_of("2013-01-01T00:00:00Z");
        assert!(matches!(old.set_label("x"), Err(Error::ReadOnly { .. })));
        assert!(matches!(old.set_content("x"), Err(Error::ReadOnly { .. })));
        assert!(old.content().is_ok());
        assert!(repo.calls().contains(&RepositoryCall::FetchDatastreamContent {
            pid: "demo:1".into(),
            dsid: "IMG".into(),
            as_of: Some("2013-01-01T00:00:00Z".into()),
        }));
    }

    #[test]
    fn delete_purges_existing_datastreams_only() {
        let (repo, client) = setup(Settings::default());
        let mut new = ds(&client, "NEW");
        assert!(new.delete().is_ok());
        assert!(!repo.calls().iter().any(|c| c.operation() == Operation::PurgeDatastream));
        let mut img = ds(&client, "IMG");
        assert!(img.delete().is_ok());
        assert!(!repo.contains("demo:1", Some("IMG")));
    }
}
