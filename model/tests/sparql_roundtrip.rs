//! Property-based tests for the change serializer.
//!
//! Uses proptest to check that whatever edits are made locally, whole-value
//! writes and element edits mixed freely, saving them through the in-memory
//! repository leaves the repository holding exactly the local state, and
//! that a clean handle never produces an update.

use std::collections::BTreeSet;
use std::sync::Arc;

use fcrepo_model::{Client, DigitalObject, MemoryRepository, ObjectAttribute};
use proptest::prelude::*;

const PID: &str = "demo:1";
const HAS_PART: &str = "info:fedora/fedora-system:def/relations-external#hasPart";
const VALUES: [&str; 5] = ["a", "b", "c", "d", "e"];

/// One local edit of a multi-valued attribute.
#[derive(Debug, Clone)]
enum Edit {
    Add(usize),
    Remove(usize),
    Set(Vec<&'static str>),
}

/// A repository whose object holds `parts` and `label`.
fn repository(parts: &[&str], label: Option<&str>) -> Client {
    let repo = Arc::new(MemoryRepository::new());
    repo.add_object(PID);
    let mut profile = String::new();
    for part in parts {
        profile.push_str(&format!("<info:fedora/{PID}> <{HAS_PART}> \"{part}\" .\n"));
    }
    if let Some(label) = label {
        profile.push_str(&format!(
            "<info:fedora/{PID}> <http://purl.org/dc/terms/title> \"{}\" .\n",
            fcrepo_model::serializer::ntriples::escape(label)
        ));
    }
    repo.load_ntriples(&profile).unwrap();
    Client::new(repo)
}

fn parts(object: &mut DigitalObject) -> BTreeSet<String> {
    object
        .get(ObjectAttribute::Parts)
        .unwrap()
        .scalars()
        .iter()
        .map(|s| s.lexical().to_string())
        .collect()
}

fn apply(object: &mut DigitalObject, edits: &[Edit]) {
    for edit in edits {
        match edit {
            Edit::Add(i) => object.add(ObjectAttribute::Parts, VALUES[*i]).unwrap(),
            Edit::Remove(i) => {
                object.remove(ObjectAttribute::Parts, VALUES[*i]).unwrap();
            }
            Edit::Set(values) => {
                object.set(ObjectAttribute::Parts, values.clone()).unwrap();
            }
        }
    }
}

fn server_parts() -> impl Strategy<Value = Vec<&'static str>> {
    proptest::sample::subsequence(VALUES.to_vec(), 0..=VALUES.len())
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (0..VALUES.len()).prop_map(Edit::Add),
        3 => (0..VALUES.len()).prop_map(Edit::Remove),
        1 => server_parts().prop_map(Edit::Set),
    ]
}

fn edits() -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit(), 0..16)
}

// =============================================================================
// Multi-valued net diffs
// =============================================================================

proptest! {
    /// Saving any edit sequence leaves the repository holding the local set.
    #[test]
    fn prop_saved_parts_match_local_parts(server in server_parts(), edits in edits()) {
        let client = repository(&server, None);
        let mut object = client.find(PID).unwrap();
        apply(&mut object, &edits);
        let local = parts(&mut object);
        object.save().unwrap();

        let mut fresh = client.find(PID).unwrap();
        prop_assert_eq!(parts(&mut fresh), local);
        prop_assert_eq!(fresh.sparql_update(), None);
    }

    /// Edits that end where they started produce no update at all.
    #[test]
    fn prop_round_trip_edits_are_clean(server in server_parts(), edits in edits()) {
        let client = repository(&server, None);
        let mut object = client.find(PID).unwrap();
        apply(&mut object, &edits);
        let original: BTreeSet<String> = server.iter().map(|s| s.to_string()).collect();
        if parts(&mut object) == original {
            prop_assert_eq!(object.sparql_update(), None);
        } else {
            prop_assert!(object.sparql_update().is_some());
        }
    }

    /// No triple is both deleted and inserted by one update.
    #[test]
    fn prop_clauses_are_disjoint(server in server_parts(), edits in edits()) {
        let client = repository(&server, None);
        let mut object = client.find(PID).unwrap();
        apply(&mut object, &edits);
        if let Some(query) = object.sparql_update() {
            let (deletes, inserts) = match query.split_once("INSERT { ") {
                Some((d, i)) => (d.to_string(), i.to_string()),
                None => (query.clone(), String::new()),
            };
            for value in VALUES {
                let triple = format!("<{HAS_PART}> \"{value}\" .");
                prop_assert!(!(deletes.contains(&triple) && inserts.contains(&triple)));
            }
        }
    }
}

// =============================================================================
// Literal escaping
// =============================================================================

proptest! {
    /// Any label survives serialization, the update and the profile parse.
    #[test]
    fn prop_labels_round_trip(
        old in proptest::option::of("[a-z ]{1,8}"),
        label in "[a-zA-Z0-9 \"\\\\\n\r\t{}<>.#é]{0,24}",
    ) {
        let client = repository(&[], old.as_deref());
        let mut object = client.find(PID).unwrap();
        object.set_label(label.clone()).unwrap();
        object.save().unwrap();

        let mut fresh = client.find(PID).unwrap();
        prop_assert_eq!(fresh.label().unwrap(), Some(label));
        prop_assert!(!fresh.is_changed());
    }
}
