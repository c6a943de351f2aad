//! `fcrepo-diff`: dry-runs attribute edits against a profile.
//!
//! Loads an N-Triples profile into an in-memory repository, applies the
//! requested edits to an object (or one of its datastreams) and prints the
//! SPARQL update a save would send. Nothing leaves the process.
//!
//! **Usage:**
//! ```text
//! fcrepo-diff --profile <file> --pid <pid> [--dsid <dsid>]
//!             [--set attr=value]... [--add attr=value]... [--remove attr=value]...
//!             [--show] [--config <file>] [--base-uri <uri>]
//! ```
//!
//! Set `RUST_LOG=debug` to trace repository calls.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use fcrepo_model::{
    Attribute, Client, Datastream, DatastreamAttribute, DigitalObject, MemoryRepository,
    ObjectAttribute, Settings, Value,
};
use tracing_subscriber::EnvFilter;

/// Print the SPARQL update produced by a set of edits.
#[derive(Parser)]
#[command(name = "fcrepo-diff", about = "Dry-run attribute edits against an N-Triples profile")]
struct Args {
    /// N-Triples profile of the object (and its datastreams).
    #[arg(long)]
    profile: PathBuf,

    /// Pid of the object to edit.
    #[arg(long)]
    pid: String,

    /// Edit this datastream instead of the object.
    #[arg(long)]
    dsid: Option<String>,

    /// Replace an attribute: `label=New title`.
    #[arg(long = "set", value_name = "ATTR=VALUE")]
    sets: Vec<String>,

    /// Append to a multi-valued attribute.
    #[arg(long = "add", value_name = "ATTR=VALUE")]
    adds: Vec<String>,

    /// Remove from a multi-valued attribute.
    #[arg(long = "remove", value_name = "ATTR=VALUE")]
    removes: Vec<String>,

    /// Also print every attribute value as JSON, after the edits.
    #[arg(long)]
    show: bool,

    /// Settings file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URI of the repository (overrides the settings file).
    #[arg(long)]
    base_uri: Option<String>,
}

/// The edits to apply, in command-line order per kind.
struct Edits<'a> {
    sets: &'a [String],
    adds: &'a [String],
    removes: &'a [String],
}

fn parse_edit<A: Attribute>(edit: &str) -> Result<(A, String)> {
    let (name, value) = edit
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected ATTR=VALUE, got '{edit}'"))?;
    let attr = A::from_name(name).ok_or_else(|| {
        let known: Vec<&str> = A::ALL.iter().map(|a| a.name()).collect();
        anyhow!("Unknown attribute '{name}' (known: {})", known.join(", "))
    })?;
    Ok((attr, value.to_string()))
}

/// What the tool needs from an object or a datastream.
trait Entity {
    type Attr: Attribute;
    fn get(&mut self, attr: Self::Attr) -> fcrepo_model::Result<Value>;
    fn set(&mut self, attr: Self::Attr, value: String) -> fcrepo_model::Result<bool>;
    fn add(&mut self, attr: Self::Attr, value: String) -> fcrepo_model::Result<()>;
    fn remove(&mut self, attr: Self::Attr, value: String) -> fcrepo_model::Result<bool>;
    fn sparql_update(&self) -> Option<String>;
}

macro_rules! entity {
    ($ty:ty, $attr:ty) => {
        impl Entity for $ty {
            type Attr = $attr;
            fn get(&mut self, attr: $attr) -> fcrepo_model::Result<Value> {
                <$ty>::get(self, attr)
            }
            fn set(&mut self, attr: $attr, value: String) -> fcrepo_model::Result<bool> {
                <$ty>::set(self, attr, value)
            }
            fn add(&mut self, attr: $attr, value: String) -> fcrepo_model::Result<()> {
                <$ty>::add(self, attr, value)
            }
            fn remove(&mut self, attr: $attr, value: String) -> fcrepo_model::Result<bool> {
                <$ty>::remove(self, attr, value)
            }
            fn sparql_update(&self) -> Option<String> {
                <$ty>::sparql_update(self)
            }
        }
    };
}

entity!(DigitalObject, ObjectAttribute);
entity!(Datastream, DatastreamAttribute);

fn apply<E: Entity>(entity: &mut E, edits: &Edits<'_>) -> Result<()> {
    for edit in edits.sets {
        let (attr, value) = parse_edit::<E::Attr>(edit)?;
        entity
            .set(attr, value)
            .with_context(|| format!("Failed to set {}", attr.name()))?;
    }
    for edit in edits.adds {
        let (attr, value) = parse_edit::<E::Attr>(edit)?;
        entity
            .add(attr, value)
            .with_context(|| format!("Failed to add to {}", attr.name()))?;
    }
    for edit in edits.removes {
        let (attr, value) = parse_edit::<E::Attr>(edit)?;
        let removed = entity
            .remove(attr, value.clone())
            .with_context(|| format!("Failed to remove from {}", attr.name()))?;
        if !removed {
            tracing::warn!(attribute = attr.name(), %value, "value not present, nothing removed");
        }
    }
    Ok(())
}

fn show<E: Entity>(entity: &mut E) -> Result<String> {
    let mut map = serde_json::Map::new();
    for attr in <E::Attr as Attribute>::ALL {
        let value = entity
            .get(*attr)
            .with_context(|| format!("Failed to read {}", attr.name()))?;
        map.insert(attr.name().to_string(), serde_json::to_value(&value)?);
    }
    serde_json::to_string_pretty(&map).context("Failed to render attributes as JSON")
}

/// Applies the edits and returns the optional JSON view and the update.
fn run<E: Entity>(entity: &mut E, edits: &Edits<'_>, with_show: bool) -> Result<(Option<String>, Option<String>)> {
    apply(entity, edits)?;
    let shown = if with_show { Some(show(entity)?) } else { None };
    Ok((shown, entity.sparql_update()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    settings.apply_env_overrides();
    if let Some(base) = &args.base_uri {
        settings.base_uri = base.clone();
    }

    let profile = fs::read_to_string(&args.profile)
        .with_context(|| format!("Failed to read {}", args.profile.display()))?;
    let repo = Arc::new(MemoryRepository::with_base_uri(settings.base_uri.clone()));
    repo.load_ntriples(&profile)
        .with_context(|| format!("Failed to parse {}", args.profile.display()))?;
    let client = Client::with_settings(repo, settings);

    let edits = Edits {
        sets: &args.sets,
        adds: &args.adds,
        removes: &args.removes,
    };

    let mut object = client.object(args.pid.as_str());
    let (shown, update) = match &args.dsid {
        Some(dsid) => run(object.datastream(dsid)?, &edits, args.show)?,
        None => {
            if object.is_new()? {
                bail!("{} is not in {}", args.pid, args.profile.display());
            }
            run(&mut object, &edits, args.show)?
        }
    };

    if let Some(shown) = shown {
        println!("{shown}");
    }
    match update {
        Some(update) => println!("{update}"),
        None => println!("No changes."),
    }
    Ok(())
}
