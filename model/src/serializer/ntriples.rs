//! N-Triples writer.
//!
//! Renders triple stores back to N-Triples (one triple per line, absolute
//! IRIs) and provides the literal escaping shared with the SPARQL update
//! serializer.

use crate::graph::{Object, Triple};

/// Serializes triples to an N-Triples document.
#[must_use]
pub fn to_ntriples<'a>(triples: impl IntoIterator<Item = &'a Triple>) -> String {
    let mut out = String::new();
    for t in triples {
        triple(&mut out, &t.subject, &t.predicate, &object(&t.object));
        out.push('\n');
    }
    out
}

/// Appends `<subj> <pred> obj .` (without a line break) to `out`.
pub(crate) fn triple(out: &mut String, subj: &str, pred: &str, obj: &str) {
    if subj.starts_with("_:") {
        out.push_str(subj);
    } else {
        out.push('<');
        out.push_str(subj);
        out.push('>');
    }
    out.push_str(" <");
    out.push_str(pred);
    out.push_str("> ");
    out.push_str(obj);
    out.push_str(" .");
}

pub(crate) fn iri(s: &str) -> String {
    format!("<{}>", s)
}

/// A plain literal: `"escaped"`.
pub(crate) fn lit(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

fn object(o: &Object) -> String {
    match o {
        Object::Iri(s) => iri(s),
        Object::Blank(id) => format!("_:{id}"),
        Object::Literal {
            value,
            datatype: Some(dt),
            ..
        } => format!("{}^^<{}>", lit(value), dt),
        Object::Literal {
            value,
            language: Some(lang),
            ..
        } => format!("{}@{}", lit(value), lang),
        Object::Literal { value, .. } => lit(value),
    }
}

/// Escapes a string for use inside an N-Triples literal.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
