//! The narrow interface to a Fedora repository.
//!
//! Entities never speak HTTP themselves. Every fetch, ingest, update and
//! purge goes through a [`Repository`], which a transport layer implements
//! and which [`MemoryRepository`](crate::MemoryRepository) implements in
//! process.

use std::collections::BTreeMap;
use std::io::Read;

use crate::error::RepositoryError;

/// Result of a repository call.
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// New content for a datastream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentUpdate<'a> {
    /// Bytes stored by the repository (managed and inline datastreams).
    Bytes(&'a [u8]),
    /// Location of external or redirect content.
    Location(&'a str),
}

/// Operations the object model needs from a repository.
///
/// Profiles are N-Triples documents. Fetch operations report a missing
/// resource with [`RepositoryError::NotFound`]; every other error is
/// propagated to the caller unchanged.
pub trait Repository: Send + Sync {
    /// Base URI objects are addressed under, e.g. `info:fedora`.
    fn base_uri(&self) -> &str;

    /// Fetches the profile of object `pid`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the object does not exist.
    fn fetch_object_profile(&self, pid: &str) -> RepositoryResult<String>;

    /// Fetches the profile of datastream `dsid` of object `pid`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if the datastream does not exist.
    fn fetch_datastream_profile(&self, pid: &str, dsid: &str) -> RepositoryResult<String>;

    /// Opens the content of a datastream, optionally as of a timestamp.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if there is no such content.
    fn fetch_datastream_content(
        &self,
        pid: &str,
        dsid: &str,
        as_of: Option<&str>,
    ) -> RepositoryResult<Box<dyn Read + Send>>;

    /// Creates an object and returns its pid. The repository mints one when
    /// `pid` is `None`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn ingest(&self, pid: Option<&str>, attributes: &BTreeMap<String, String>) -> RepositoryResult<String>;

    /// Applies a SPARQL update to an object.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn apply_object_update(&self, pid: &str, query: &str) -> RepositoryResult<()>;

    /// Applies a SPARQL update to a datastream.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn apply_datastream_update(&self, pid: &str, dsid: &str, query: &str) -> RepositoryResult<()>;

    /// Replaces a datastream's content, creating the datastream if needed.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn push_datastream_content(&self, pid: &str, dsid: &str, content: ContentUpdate<'_>) -> RepositoryResult<()>;

    /// Removes an object and its datastreams.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn purge_object(&self, pid: &str) -> RepositoryResult<()>;

    /// Removes one datastream.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn purge_datastream(&self, pid: &str, dsid: &str) -> RepositoryResult<()>;

    /// Raw version history of an object.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn fetch_object_versions(&self, pid: &str) -> RepositoryResult<String>;

    /// Raw version history of a datastream.
    ///
    /// # Errors
    ///
    /// Transport failures.
    fn fetch_datastream_versions(&self, pid: &str, dsid: &str) -> RepositoryResult<String>;
}

/// URI of object `pid` under `base`.
///
/// Pids that already are URIs (anything with a `/` in it) are returned
/// unchanged.
#[must_use]
pub fn object_uri(base: &str, pid: &str) -> String {
    if pid.contains('/') {
        return pid.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), pid)
}

/// Pid of an object URI under `base`; the inverse of [`object_uri`].
#[must_use]
pub fn pid_from_uri<'a>(base: &str, uri: &'a str) -> &'a str {
    let base = base.trim_end_matches('/');
    uri.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .or_else(|| uri.strip_prefix("info:fedora/"))
        .unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_join_base_and_pid() {
        assert_eq!(object_uri("info:fedora", "demo:1"), "info:fedora/demo:1");
        assert_eq!(object_uri("http://localhost:8983/fedora/rest/", "demo:1"), "http://localhost:8983/fedora/rest/demo:1");
    }

    #[test]
    fn uri_pids_are_kept() {
        assert_eq!(object_uri("info:fedora", "info:fedora/demo:1"), "info:fedora/demo:1");
        assert_eq!(object_uri("info:fedora", "http://example.org/x"), "http://example.org/x");
    }

    #[test]
    fn pids_are_recovered_from_uris() {
        assert_eq!(pid_from_uri("info:fedora", "info:fedora/demo:1"), "demo:1");
        assert_eq!(pid_from_uri("http://h/rest", "http://h/rest/demo:1"), "demo:1");
        assert_eq!(pid_from_uri("http://h/rest", "demo:1"), "demo:1");
    }
}
