//! SPARQL Update serializer.
//!
//! Turns the dirty state of an [`AttributeStore`] into the
//! `DELETE { .. } INSERT { .. } WHERE { }` body the repository applies on
//! save. Every triple uses the entity URI as subject and a plain literal as
//! object; references are written as their URI.

use crate::model::Attribute;
use crate::serializer::ntriples::{lit, triple};
use crate::store::AttributeStore;
use crate::value::Scalar;

/// Collects the triples of one clause, in first-seen order, once each.
#[derive(Default)]
struct Clause {
    triples: Vec<String>,
}

impl Clause {
    fn push(&mut self, subject: &str, predicate: &str, value: &Scalar) {
        let mut t = String::new();
        triple(&mut t, subject, predicate, &lit(value.lexical()));
        if !self.triples.contains(&t) {
            self.triples.push(t);
        }
    }

    fn render(&self, keyword: &str, out: &mut String) {
        if self.triples.is_empty() {
            return;
        }
        out.push_str(keyword);
        out.push_str(" { ");
        out.push_str(&self.triples.join("\n"));
        out.push_str(" }\n");
    }
}

/// Serializes the pending changes of `store` against subject `uri`.
///
/// Returns `None` when no triple would be deleted or inserted.
#[must_use]
pub fn sparql_update<A: Attribute>(uri: &str, store: &AttributeStore<A>) -> Option<String> {
    let mut deletes = Clause::default();
    let mut inserts = Clause::default();

    for change in store.changes() {
        let Some(predicate) = change.attribute.predicate() else {
            continue;
        };
        let (old, new) = (change.old.scalars(), change.new.scalars());
        for v in old.iter().filter(|v| !new.iter().any(|n| n.same(v))) {
            deletes.push(uri, predicate, v);
        }
        for v in new.iter().filter(|v| !old.iter().any(|o| o.same(v))) {
            inserts.push(uri, predicate, v);
        }
    }

    for (attr, diff) in store.multivalued_changes() {
        let Some(predicate) = attr.predicate() else {
            continue;
        };
        for v in diff.removed() {
            deletes.push(uri, predicate, v);
        }
        for v in diff.added() {
            inserts.push(uri, predicate, v);
        }
    }

    if deletes.triples.is_empty() && inserts.triples.is_empty() {
        return None;
    }

    let mut query = String::new();
    deletes.render("DELETE", &mut query);
    inserts.render("INSERT", &mut query);
    query.push_str("WHERE { }");
    Some(query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{mapping, Graph};
    use crate::model::{DatastreamAttribute, ObjectAttribute};
    use crate::value::Value;

    const URI: &str = "info:fedora/pid";

    fn store(profile: &str) -> AttributeStore<ObjectAttribute> {
        let mut store = AttributeStore::new(None);
        store.install(Graph::parse(URI, profile, mapping(ObjectAttribute::mapping())).unwrap());
        store
    }

    #[test]
    fn clean_store_serializes_to_nothing() {
        assert_eq!(sparql_update(URI, &store("")), None);
    }

    #[test]
    fn new_label_is_an_insert_only() {
        let mut s = store("");
        s.write(ObjectAttribute::Label, "x".into());
        assert_eq!(
            sparql_update(URI, &s).as_deref(),
            Some("INSERT { <info:fedora/pid> <http://purl.org/dc/terms/title> \"x\" . }\nWHERE { }")
        );
    }

    #[test]
    fn replaced_label_deletes_then_inserts() {
        let mut s = store("<info:fedora/pid> <http://purl.org/dc/terms/title> \"old\" .");
        s.write(ObjectAttribute::Label, "new".into());
        let q = sparql_update(URI, &s).unwrap();
        assert_eq!(
            q,
            "DELETE { <info:fedora/pid> <http://purl.org/dc/terms/title> \"old\" . }\n\
             INSERT { <info:fedora/pid> <http://purl.org/dc/terms/title> \"new\" . }\n\
             WHERE { }"
        );
    }

    #[test]
    fn multivalued_add_has_no_delete_clause() {
        let mut s = store("");
        s.add(ObjectAttribute::Parts, "asdf".into());
        let q = sparql_update(URI, &s).unwrap();
        assert!(q.contains(
            "INSERT { <info:fedora/pid> <info:fedora/fedora-system:def/relations-external#hasPart> \"asdf\" . }"
        ));
        assert!(!q.contains("DELETE"));
    }

    #[test]
    fn local_only_attributes_are_skipped() {
        let mut s = store("");
        s.write(ObjectAttribute::LogMessage, "why".into());
        assert!(s.is_changed());
        assert_eq!(sparql_update(URI, &s), None);
    }

    #[test]
    fn triples_are_emitted_once_per_clause() {
        let mut s = store("");
        s.write(ObjectAttribute::Parts, vec!["a"].into());
        s.add(ObjectAttribute::Parts, "b".into());
        let q = sparql_update(URI, &s).unwrap();
        assert_eq!(q.matches("\"b\"").count(), 1);
        assert_eq!(q.matches("\"a\"").count(), 1);
    }

    #[test]
    fn whole_value_writes_only_send_the_difference() {
        let mut s = store(
            "<info:fedora/pid> <info:fedora/fedora-system:def/relations-external#hasPart> \"a\" .\n\
             <info:fedora/pid> <info:fedora/fedora-system:def/relations-external#hasPart> \"b\" .",
        );
        s.write(ObjectAttribute::Parts, vec!["b", "c"].into());
        assert_eq!(
            sparql_update(URI, &s).as_deref(),
            Some(
                "DELETE { <info:fedora/pid> <info:fedora/fedora-system:def/relations-external#hasPart> \"a\" . }\n\
                 INSERT { <info:fedora/pid> <info:fedora/fedora-system:def/relations-external#hasPart> \"c\" . }\n\
                 WHERE { }"
            )
        );
    }

    #[test]
    fn set_after_add_never_reinserts_the_added_value() {
        let mut s = store("");
        s.add(ObjectAttribute::Parts, "x".into());
        s.write(ObjectAttribute::Parts, Value::Many(Vec::new()));
        assert!(!s.is_changed());
        assert_eq!(sparql_update(URI, &s), None);
    }

    #[test]
    fn literals_are_escaped_and_booleans_are_bare_words() {
        let mut s = store("");
        s.write(ObjectAttribute::Label, "say \"hi\"\nnow".into());
        let q = sparql_update(URI, &s).unwrap();
        assert!(q.contains(r#""say \"hi\"\nnow""#));

        let mut ds = AttributeStore::<DatastreamAttribute>::new(None);
        ds.install(Graph::empty("info:fedora/pid/DS", mapping(DatastreamAttribute::mapping())));
        ds.write(DatastreamAttribute::Versionable, Value::from(false));
        let q = sparql_update("info:fedora/pid/DS", &ds).unwrap();
        assert!(q.contains("<info:fedora3/versionable> \"false\" ."));
        assert!(q.contains("DELETE { <info:fedora/pid/DS> <info:fedora3/versionable> \"true\" . }"));
    }

    #[test]
    fn references_are_written_as_uris() {
        let mut s = store("");
        s.add(ObjectAttribute::MemberOf, Scalar::Reference("info:fedora/collection:1".into()));
        let q = sparql_update(URI, &s).unwrap();
        assert!(q.contains("#isMemberOf> \"info:fedora/collection:1\" ."));
    }
}
