//! Digital objects.
//!
//! A [`DigitalObject`] is created through a [`Client`] and fetches its
//! profile on first read. Its datastreams are seeded from the `hasChild`
//! values of that profile, each with a view of the same graph, so listing
//! datastreams costs no extra round trip.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::client::Client;
use crate::datastream::Datastream;
use crate::error::{Error, RepositoryError, Result};
use crate::graph::{mapping, Graph, Mapping};
use crate::model::{validate_enumerated, Attribute, ObjectAttribute, ObjectState};
use crate::serializer::sparql::sparql_update;
use crate::store::AttributeStore;
use crate::value::{Scalar, Value};

fn object_mapping() -> Mapping {
    static MAPPING: OnceLock<Mapping> = OnceLock::new();
    MAPPING.get_or_init(|| mapping(ObjectAttribute::mapping())).clone()
}

/// Rejects values outside an enumerated attribute's codes.
fn validate(attr: ObjectAttribute, value: &Value) -> Result<()> {
    if attr == ObjectAttribute::State {
        validate_enumerated(value, |s| s.parse::<ObjectState>(), "state", ObjectState::ALLOWED)?;
    }
    Ok(())
}

/// A repository object and its datastreams.
#[derive(Debug, Clone)]
pub struct DigitalObject {
    client: Client,
    pid: Option<String>,
    store: AttributeStore<ObjectAttribute>,
    datastreams: Option<BTreeMap<String, Datastream>>,
}

impl DigitalObject {
    pub(crate) fn new(client: Client, pid: Option<String>, as_of: Option<String>) -> Self {
        Self {
            client,
            pid: pid.map(|p| strip_info_fedora(&p).to_string()),
            store: AttributeStore::new(as_of),
            datastreams: None,
        }
    }

    /// The pid, once assigned.
    #[must_use]
    pub fn pid(&self) -> Option<&str> {
        self.pid.as_deref()
    }

    /// URI of the object, once it has a pid.
    #[must_use]
    pub fn uri(&self) -> Option<String> {
        self.pid.as_deref().map(|pid| self.client.object_uri(pid))
    }

    /// Timestamp of a historical view.
    #[must_use]
    pub fn as_of_date_time(&self) -> Option<&str> {
        self.store.as_of()
    }

    /// A read-only view of this object as of `timestamp`. Its datastreams
    /// are historical too.
    #[must_use]
    pub fn as_of(&self, timestamp: impl Into<String>) -> DigitalObject {
        DigitalObject::new(self.client.clone(), self.pid.clone(), Some(timestamp.into()))
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.store.as_of() {
            Some(as_of) => Err(Error::ReadOnly {
                uri: self.uri().unwrap_or_default(),
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
            self.store.install_absent(Graph::empty("", object_mapping()));
            return Ok(());
        };
        debug!(%pid, "fetching object profile");
        match self.client.repository().fetch_object_profile(&pid) {
            Ok(data) => {
                let graph = Graph::parse(uri, &data, object_mapping())?;
                self.store.install(graph);
            }
            Err(RepositoryError::NotFound(_)) => {
                debug!(%pid, "object not found, treating as new");
                self.store.install_absent(Graph::empty(uri, object_mapping()));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Whether the object does not exist in the repository (or has no pid).
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
    pub fn get(&mut self, attr: ObjectAttribute) -> Result<Value> {
        self.ensure_profile()?;
        Ok(self.store.read(attr))
    }

    /// Writes an attribute. Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical views, [`Error::Validation`] for an
    /// invalid `state`, or the error of the profile fetch.
    pub fn set(&mut self, attr: ObjectAttribute, value: impl Into<Value>) -> Result<bool> {
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
    /// [`Error::ReadOnly`] on historical views, [`Error::Validation`] if the
    /// result is not a valid `state`, or the error of the profile fetch.
    pub fn add(&mut self, attr: ObjectAttribute, value: impl Into<Scalar>) -> Result<()> {
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
    /// [`Error::ReadOnly`] on historical views, [`Error::Validation`] if the
    /// result is not a valid `state`, or the error of the profile fetch.
    pub fn remove(&mut self, attr: ObjectAttribute, value: impl Into<Scalar>) -> Result<bool> {
        self.ensure_writable()?;
        self.ensure_profile()?;
        let value = value.into();
        validate(attr, &self.store.with_removed(attr, &value))?;
        Ok(self.store.remove(attr, &value))
    }

    /// Adds a relationship to `other`, written as its URI.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] if `other` has no pid yet, otherwise as
    /// [`DigitalObject::add`].
    pub fn add_reference(&mut self, attr: ObjectAttribute, other: &DigitalObject) -> Result<()> {
        let uri = other.uri().ok_or_else(|| Error::Precondition {
            action: "reference",
            uri: self.uri().unwrap_or_default(),
            reason: "the target has no pid",
        })?;
        self.add(attr, Scalar::Reference(uri))
    }

    fn first_text(&mut self, attr: ObjectAttribute) -> Result<Option<String>> {
        Ok(self.get(attr)?.first_text().map(str::to_string))
    }

    /// Label (`dcterms:title`).
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn label(&mut self) -> Result<Option<String>> {
        self.first_text(ObjectAttribute::Label)
    }

    /// Sets the label.
    ///
    /// # Errors
    ///
    /// See [`DigitalObject::set`].
    pub fn set_label(&mut self, label: impl Into<String>) -> Result<bool> {
        self.set(ObjectAttribute::Label, label.into())
    }

    /// Owner id.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn owner_id(&mut self) -> Result<Option<String>> {
        self.first_text(ObjectAttribute::OwnerId)
    }

    /// Sets the owner id.
    ///
    /// # Errors
    ///
    /// See [`DigitalObject::set`].
    pub fn set_owner_id(&mut self, owner: impl Into<String>) -> Result<bool> {
        self.set(ObjectAttribute::OwnerId, owner.into())
    }

    /// Lifecycle state, if the profile has one.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the profile holds an unknown state, or the
    /// error of the profile fetch.
    pub fn state(&mut self) -> Result<Option<ObjectState>> {
        self.first_text(ObjectAttribute::State)?
            .map(|s| s.parse())
            .transpose()
    }

    /// Sets the lifecycle state.
    ///
    /// # Errors
    ///
    /// See [`DigitalObject::set`].
    pub fn set_state(&mut self, state: ObjectState) -> Result<bool> {
        self.set(ObjectAttribute::State, state)
    }

    /// Content models (mixin types).
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn models(&mut self) -> Result<Vec<String>> {
        Ok(self
            .get(ObjectAttribute::Models)?
            .scalars()
            .iter()
            .map(|s| s.lexical().to_string())
            .collect())
    }

    /// Last modification timestamp.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn last_modified_date(&mut self) -> Result<Option<String>> {
        self.first_text(ObjectAttribute::LastModifiedDate)
    }

    /// Whether the object's own attributes have pending changes.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.store.is_changed()
    }

    /// Attributes with pending changes.
    #[must_use]
    pub fn changed_attributes(&self) -> Vec<ObjectAttribute> {
        self.store.changed()
    }

    /// The SPARQL update a save would send for the object's own attributes.
    /// `None` until the object has a pid.
    #[must_use]
    pub fn sparql_update(&self) -> Option<String> {
        self.uri().and_then(|uri| sparql_update(&uri, &self.store))
    }

    fn seed_datastreams(&mut self) -> Result<&mut BTreeMap<String, Datastream>> {
        if self.datastreams.is_none() {
            self.ensure_profile()?;
            let mut map = BTreeMap::new();
            if let Some(graph) = self.store.graph() {
                for child in self.store.read(ObjectAttribute::Datastreams).scalars() {
                    let child = child.lexical();
                    let dsid = child.rsplit('/').next().unwrap_or(child).to_string();
                    let ds = Datastream::seeded(
                        self.client.clone(),
                        self.pid.clone(),
                        dsid.clone(),
                        self.store.as_of().map(str::to_string),
                        graph.with_subject(child),
                    );
                    map.insert(dsid, ds);
                }
            }
            self.datastreams = Some(map);
        }
        let map = self.datastreams.get_or_insert_with(BTreeMap::new);
        map.retain(|_, ds| !ds.is_deleted());
        Ok(map)
    }

    /// All known datastreams, keyed by dsid.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn datastreams(&mut self) -> Result<&mut BTreeMap<String, Datastream>> {
        self.seed_datastreams()
    }

    /// Ids of the known datastreams.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn datastream_ids(&mut self) -> Result<Vec<String>> {
        Ok(self.seed_datastreams()?.keys().cloned().collect())
    }

    /// Datastream `dsid`; an unsaved handle if the object has no such
    /// datastream yet.
    ///
    /// # Errors
    ///
    /// The error of the profile fetch.
    pub fn datastream(&mut self, dsid: &str) -> Result<&mut Datastream> {
        let (client, pid, as_of) = (
            self.client.clone(),
            self.pid.clone(),
            self.store.as_of().map(str::to_string),
        );
        Ok(self
            .seed_datastreams()?
            .entry(dsid.to_string())
            .or_insert_with(|| Datastream::new(client, pid, dsid, as_of)))
    }

    /// Datastreams loaded so far, without fetching anything.
    pub fn loaded_datastreams(&self) -> impl Iterator<Item = &Datastream> {
        self.datastreams
            .iter()
            .flat_map(BTreeMap::values)
            .filter(|ds| !ds.is_deleted())
    }

    /// Deletes datastream `dsid` and forgets its handle.
    ///
    /// # Errors
    ///
    /// The error of [`Datastream::delete`].
    pub fn delete_datastream(&mut self, dsid: &str) -> Result<()> {
        self.ensure_writable()?;
        let map = self.seed_datastreams()?;
        if let Some(ds) = map.get_mut(dsid) {
            ds.delete()?;
            map.remove(dsid);
        }
        Ok(())
    }

    /// Persists the object: ingests it if new, applies the attribute diff,
    /// then saves every loaded datastream that needs it.
    ///
    /// Dirty state is only dropped once the corresponding call succeeded,
    /// so a failed save can be retried.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical views, or the first failing
    /// repository or datastream call.
    pub fn save(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.is_new()? {
            let mut attributes = BTreeMap::new();
            if let Some(message) = self.first_text(ObjectAttribute::LogMessage)? {
                attributes.insert(ObjectAttribute::LogMessage.name().to_string(), message);
            }
            let pid = self.client.repository().ingest(self.pid.as_deref(), &attributes)?;
            info!(%pid, "ingested object");
            for ds in self.datastreams.iter_mut().flat_map(BTreeMap::values_mut) {
                ds.set_pid(&pid);
            }
            self.pid = Some(pid);
            self.store.mark_stale();
        }
        let pid = self.pid.clone().unwrap_or_default();
        if let Some(query) = self.sparql_update() {
            self.client.repository().apply_object_update(&pid, &query)?;
        }
        if self.store.is_changed() {
            info!(%pid, "saved object");
        }
        self.store.reset();

        if let Some(map) = self.datastreams.as_mut() {
            map.retain(|_, ds| !ds.is_deleted());
        }
        for ds in self.datastreams.iter_mut().flat_map(BTreeMap::values_mut) {
            if ds.needs_to_be_saved()? {
                ds.save()?;
            }
        }
        Ok(())
    }

    /// Purges the object, then forgets its pid and all local state.
    ///
    /// # Errors
    ///
    /// [`Error::ReadOnly`] on historical views, or the error of the purge.
    pub fn delete(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if let Some(pid) = self.pid.clone() {
            self.client.repository().purge_object(&pid)?;
            info!(%pid, "purged object");
        }
        self.datastreams = None;
        self.store.reset();
        self.pid = None;
        Ok(())
    }

    /// Raw version history XML, unparsed.
    ///
    /// # Errors
    ///
    /// [`Error::Precondition`] without a pid, or the error of the
    /// repository call.
    pub fn version_history(&self) -> Result<String> {
        let pid = self.pid.as_deref().ok_or_else(|| Error::Precondition {
            action: "read versions of",
            uri: String::new(),
            reason: "the object has no pid",
        })?;
        Ok(self.client.repository().fetch_object_versions(pid)?)
    }
}

fn strip_info_fedora(pid: &str) -> &str {
    pid.strip_prefix("info:fedora/").unwrap_or(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::memory::{MemoryRepository, Operation, RepositoryCall};

    const PROFILE: &str = r#"
<info:fedora/demo:1> <http://purl.org/dc/terms/title> "label" .
<info:fedora/demo:1> <info:fedora3/state> "A" .
<info:fedora/demo:1> <info:fedora/fedora-system:def/internal#mixinTypes> "fedora:object" .
<info:fedora/demo:1> <info:fedora/fedora-system:def/internal#hasChild> <info:fedora/demo:1/DC> .
<info:fedora/demo:1> <info:fedora/fedora-system:def/internal#hasChild> <info:fedora/demo:1/RELS-EXT> .
<info:fedora/demo:1/DC> <http://purl.org/dc/terms/title> "Dublin Core" .
"#;

    fn setup() -> (Arc<MemoryRepository>, Client) {
        let repo = Arc::new(MemoryRepository::new());
        repo.load_ntriples(PROFILE).unwrap();
        (repo.clone(), Client::new(repo))
    }

    #[test]
    fn pids_lose_the_info_fedora_prefix() {
        let (_, client) = setup();
        let object = client.object("info:fedora/demo:1");
        assert_eq!(object.pid(), Some("demo:1"));
        assert_eq!(object.uri().as_deref(), Some("info:fedora/demo:1"));
    }

    #[test]
    fn typed_readers() {
        let (_, client) = setup();
        let mut object = client.object("demo:1");
        assert_eq!(object.label().unwrap().as_deref(), Some("label"));
        assert_eq!(object.state().unwrap(), Some(ObjectState::Active));
        assert_eq!(object.models().unwrap(), vec!["fedora:object".to_string()]);
        assert_eq!(object.owner_id().unwrap(), None);
    }

    #[test]
    fn invalid_state_fails_before_tracking() {
        let (_, client) = setup();
        let mut object = client.object("demo:1");
        let err = object.set(ObjectAttribute::State, "X");
        assert!(matches!(err, Err(Error::Validation { attribute: "state", .. })));
        assert!(!object.is_changed());
        assert!(object.set_state(ObjectState::Deleted).unwrap());
        assert!(!object.set_state(ObjectState::Deleted).unwrap());
    }

    #[test]
    fn datastreams_are_seeded_without_fetching() {
        let (repo, client) = setup();
        let mut object = client.object("demo:1");
        assert_eq!(
            object.datastream_ids().unwrap(),
            vec!["DC".to_string(), "RELS-EXT".to_string()]
        );
        repo.clear_calls();
        let dc = object.datastream("DC").unwrap();
        assert_eq!(dc.label().unwrap().as_deref(), Some("Dublin Core"));
        assert!(!dc.is_new().unwrap());
        assert!(repo.calls().is_empty());
    }

    #[test]
    fn unknown_datastreams_auto_vivify() {
        let (_, client) = setup();
        let mut object = client.object("demo:1");
        let ds = object.datastream("NEW").unwrap();
        assert!(ds.is_new().unwrap());
        assert!(object.datastream_ids().unwrap().contains(&"NEW".to_string()));
    }

    #[test]
    fn untouched_datastreams_are_not_saved() {
        let (repo, client) = setup();
        let mut object = client.object("demo:1");
        let _ = object.datastream("NEW");
        assert!(object.set_label("renamed").is_ok());
        assert!(object.save().is_ok());
        assert!(!repo
            .calls()
            .iter()
            .any(|c| matches!(c, RepositoryCall::PushDatastreamContent { .. })));
        assert!(!repo.contains("demo:1", Some("NEW")));
    }

    #[test]
    fn saving_a_new_object_ingests_then_updates() {
        let (repo, client) = setup();
        let mut object = client.new_object();
        assert!(object.is_new().unwrap());
        assert!(object.set_label("fresh").is_ok());
        assert!(object.sparql_update().is_none());
        assert!(object.save().is_ok());
        assert_eq!(object.pid(), Some("changeme:1"));
        let ops: Vec<Operation> = repo.calls().iter().map(RepositoryCall::operation).collect();
        assert_eq!(ops, vec![Operation::Ingest, Operation::ApplyObjectUpdate]);
        assert!(!object.is_changed());
        assert_eq!(object.label().unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn datastreams_of_new_objects_are_saved_after_ingest() {
        let (repo, client) = setup();
        let mut object = client.object("demo:9");
        let ds = object.datastream("TXT").unwrap();
        assert!(ds.set_content("hello").is_ok());
        assert!(object.save().is_ok());
        assert_eq!(repo.content("demo:9", "TXT").as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn failed_update_after_ingest_can_be_retried() {
        let (repo, client) = setup();
        let mut object = client.object("demo:7");
        assert!(object.set_label("x").is_ok());
        repo.fail_next(Operation::ApplyObjectUpdate);
        assert!(object.save().is_err());
        assert!(object.is_changed());
        assert!(object.save().is_ok());
        let ingests = repo
            .calls()
            .iter()
            .filter(|c| c.operation() == Operation::Ingest)
            .count();
        assert_eq!(ingests, 1);
        assert_eq!(object.label().unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn references_are_written_as_uris() {
        let (_, client) = setup();
        let mut object = client.object("demo:1");
        let collection = client.object("demo:collection");
        assert!(object.add_reference(ObjectAttribute::MemberOfCollection, &collection).is_ok());
        let query = object.sparql_update().unwrap();
        assert!(query.contains("#isMemberOfCollection> \"info:fedora/demo:collection\" ."));
        let unsaved = client.new_object();
        assert!(matches!(
            object.add_reference(ObjectAttribute::MemberOf, &unsaved),
            Err(Error::Precondition { .. })
        ));
    }

    #[test]
    fn historical_views_are_read_only_and_inherit_the_timestamp() {
        let (_, client) = setup();
        let mut old = client.object("demo:1").as_of("2012-01-01T00:00:00Z");
        assert!(matches!(old.set_label("x"), Err(Error::ReadOnly { .. })));
        assert!(matches!(old.save(), Err(Error::ReadOnly { .. })));
        let dc = old.datastream("DC").unwrap();
        assert_eq!(dc.as_of_date_time(), Some("2012-01-01T00:00:00Z"));
        assert!(matches!(dc.set_label("x"), Err(Error::ReadOnly { .. })));
    }

    #[test]
    fn delete_purges_and_forgets() {
        let (repo, client) = setup();
        let mut object = client.object("demo:1");
        assert!(object.delete().is_ok());
        assert_eq!(object.pid(), None);
        assert!(object.is_new().unwrap());
        assert!(!repo.contains("demo:1", None));
    }

    #[test]
    fn delete_datastream_removes_the_handle() {
        let (repo, client) = setup();
        let mut object = client.object("demo:1");
        assert!(object.delete_datastream("DC").is_ok());
        assert!(!object.datastream_ids().unwrap().contains(&"DC".to_string()));
        assert!(!repo.contains("demo:1", Some("DC")));
    }

    #[test]
    fn deleting_through_the_handle_forgets_it() {
        let (repo, client) = setup();
        let mut object = client.object("demo:1");
        object.datastream("DC").unwrap().delete().unwrap();
        assert_eq!(object.datastream_ids().unwrap(), vec!["RELS-EXT".to_string()]);
        assert!(object.loaded_datastreams().all(|ds| ds.dsid() != "DC"));
        assert!(!repo.contains("demo:1", Some("DC")));

        let dc = object.datastream("DC").unwrap();
        assert!(!dc.is_deleted());
        assert!(dc.is_new().unwrap());
    }

    #[test]
    fn element_edits_on_state_are_validated() {
        let (_, client) = setup();
        let mut object = client.object("demo:1");
        let err = object.add(ObjectAttribute::State, "Q").unwrap_err();
        assert!(matches!(err, Error::Validation { attribute: "state", .. }));
        assert!(object.add(ObjectAttribute::State, "I").is_err());
        assert!(object.remove(ObjectAttribute::State, "A").is_err());
        assert!(!object.is_changed());
        assert_eq!(object.sparql_update(), None);

        assert!(object.remove(ObjectAttribute::State, "I").is_ok_and(|removed| !removed));
    }

    #[test]
    fn version_history_is_passed_through() {
        let (repo, client) = setup();
        repo.set_versions("demo:1", None, "<fedoraObjectHistory/>");
        let object = client.object("demo:1");
        assert_eq!(object.version_history().unwrap(), "<fedoraObjectHistory/>");
    }
}
