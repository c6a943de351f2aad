//! Entry point: a cheap, cloneable handle over a repository and settings.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::object::DigitalObject;
use crate::repository::{object_uri, Repository};

/// Shared access to a [`Repository`] and the [`Settings`] entities follow.
///
/// Every entity holds a clone; nothing is locked.
#[derive(Clone)]
pub struct Client {
    repository: Arc<dyn Repository>,
    settings: Arc<Settings>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_uri", &self.repository.base_uri())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Client {
    /// A client with default settings.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self::with_settings(repository, Settings::default())
    }

    /// A client with explicit settings.
    pub fn with_settings(repository: Arc<dyn Repository>, settings: Settings) -> Self {
        Self {
            repository,
            settings: Arc::new(settings),
        }
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &dyn Repository {
        self.repository.as_ref()
    }

    /// The settings entities follow.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// URI of object `pid`.
    #[must_use]
    pub fn object_uri(&self, pid: &str) -> String {
        object_uri(self.repository.base_uri(), pid)
    }

    /// A handle on object `pid`, whether or not it exists yet.
    ///
    /// Nothing is fetched until the handle is read.
    pub fn object(&self, pid: impl Into<String>) -> DigitalObject {
        DigitalObject::new(self.clone(), Some(pid.into()), None)
    }

    /// A handle on an object the repository will mint a pid for on save.
    #[must_use]
    pub fn new_object(&self) -> DigitalObject {
        DigitalObject::new(self.clone(), None, None)
    }

    /// Loads an existing object.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the repository has no such object, or the
    /// error of the profile fetch.
    pub fn find(&self, pid: impl Into<String>) -> Result<DigitalObject> {
        let mut object = self.object(pid);
        if object.is_new()? {
            let uri = object.uri().unwrap_or_default();
            return Err(Error::NotFound(uri));
        }
        Ok(object)
    }

    /// Ingests a new object and returns a handle on it.
    ///
    /// # Errors
    ///
    /// The error of the ingest call.
    pub fn create(&self, pid: Option<&str>, attributes: &BTreeMap<String, String>) -> Result<DigitalObject> {
        let pid = self.repository.ingest(pid, attributes)?;
        info!(%pid, "created object");
        Ok(self.object(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;

    fn client() -> (Arc<MemoryRepository>, Client) {
        let repo = Arc::new(MemoryRepository::new());
        (repo.clone(), Client::new(repo))
    }

    #[test]
    fn find_fails_for_missing_objects() {
        let (_, client) = client();
        let err = client.find("demo:404");
        assert!(matches!(err, Err(Error::NotFound(uri)) if uri == "info:fedora/demo:404"));
    }

    #[test]
    fn find_returns_existing_objects() {
        let (repo, client) = client();
        repo.add_object("demo:1");
        assert!(client.find("demo:1").is_ok());
    }

    #[test]
    fn create_ingests_with_attributes() {
        let (repo, client) = client();
        let attrs = BTreeMap::from([("label".to_string(), "Created".to_string())]);
        let mut object = client.create(None, &attrs).unwrap();
        assert_eq!(object.pid(), Some("changeme:1"));
        assert!(repo.contains("changeme:1", None));
        assert_eq!(object.label().unwrap().as_deref(), Some("Created"));
    }

    #[test]
    fn object_handles_are_lazy() {
        let (repo, client) = client();
        let _object = client.object("demo:1");
        assert!(repo.calls().is_empty());
    }
}
