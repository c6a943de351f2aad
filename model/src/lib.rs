//! Fedora Commons client object model.
//!
//! The `fcrepo-model` crate maps repository objects and their datastreams
//! onto in-process entities. Profiles are fetched lazily as N-Triples, local
//! writes are tracked per attribute, and a save sends the minimal
//! `DELETE/INSERT` SPARQL update back.
//!
//! # Entry Point
//!
//! ```
//! use std::sync::Arc;
//! use fcrepo_model::{Client, MemoryRepository};
//!
//! let repo = Arc::new(MemoryRepository::new());
//! let client = Client::new(repo);
//!
//! let mut object = client.object("demo:1");
//! assert!(object.is_new()?);
//! object.set_label("A new object")?;
//! object.save()?;
//! assert!(!object.is_changed());
//! # Ok::<(), fcrepo_model::Error>(())
//! ```
//!
//! # Layers
//!
//! - [`graph`]: subject-scoped views over parsed profiles.
//! - [`model`]: the static attribute tables.
//! - [`store`]: dirty tracking, embedded by both entity kinds.
//! - [`serializer`]: N-Triples output and SPARQL updates.
//! - [`DigitalObject`] and [`Datastream`]: the entities.
//! - [`Repository`]: what the entities need from a repository, with
//!   [`MemoryRepository`] as an in-process implementation.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod client;
pub mod config;
pub mod datastream;
pub mod error;
pub mod graph;
pub mod memory;
pub mod model;
pub mod object;
pub mod repository;
pub mod serializer;
pub mod store;
pub mod stream;
pub mod value;
pub mod xml;

pub use client::Client;
pub use config::Settings;
pub use datastream::Datastream;
pub use error::{Error, RepositoryError, Result};
pub use graph::{Graph, Object, Triple};
pub use memory::{MemoryRepository, Operation, PushedContent, RepositoryCall};
pub use model::{Attribute, ControlGroup, DatastreamAttribute, ObjectAttribute, ObjectState};
pub use object::DigitalObject;
pub use repository::{ContentUpdate, Repository};
pub use store::{AttributeStore, NetDiff};
pub use stream::ByteRange;
pub use value::{Scalar, Value};
