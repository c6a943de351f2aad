//! Semantic XML comparison for inline (`X`) datastreams.
//!
//! Two documents are equivalent when they have the same elements, each with
//! the same set of attributes in any order, and the same text once runs of
//! whitespace are collapsed. Element and attribute names compare by
//! namespace URI and local name, so prefixes and namespace declarations do
//! not matter. Comments, processing instructions, the XML declaration and
//! the doctype are ignored, as are whitespace-only text nodes and the
//! difference between `<a/>` and `<a></a>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{LocalName, Namespace, ResolveResult};
use quick_xml::NsReader;

/// A resolved name: namespace URI (if bound) and local part.
type Name = (Option<Vec<u8>>, Vec<u8>);

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Start {
        name: Name,
        attributes: Vec<(Name, String)>,
    },
    Text(String),
    End,
}

/// Whether `a` and `b` are the same XML document, ignoring formatting.
///
/// Malformed documents are only equivalent if they are byte-identical.
#[must_use]
pub fn equivalent(a: &[u8], b: &[u8]) -> bool {
    match (canonical(a), canonical(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn canonical(doc: &[u8]) -> Option<Vec<Node>> {
    let mut reader = NsReader::from_reader(doc);
    let mut nodes = Vec::new();
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                flush(&mut text, &mut nodes);
                nodes.push(start(&reader, e)?);
                depth += 1;
            }
            Ok(Event::Empty(ref e)) => {
                flush(&mut text, &mut nodes);
                nodes.push(start(&reader, e)?);
                nodes.push(Node::End);
            }
            Ok(Event::End(_)) => {
                flush(&mut text, &mut nodes);
                nodes.push(Node::End);
                depth = depth.checked_sub(1)?;
            }
            Ok(Event::Text(ref e)) => text.push_str(&e.unescape().ok()?),
            Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    flush(&mut text, &mut nodes);
    (depth == 0).then_some(nodes)
}

fn start(reader: &NsReader<&[u8]>, e: &BytesStart<'_>) -> Option<Node> {
    let (ns, local) = reader.resolve_element(e.name());
    let name = resolved(ns, local)?;
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.ok()?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (ns, local) = reader.resolve_attribute(attr.key);
        let value = attr.unescape_value().ok()?.into_owned();
        attributes.push((resolved(ns, local)?, value));
    }
    attributes.sort();
    Some(Node::Start { name, attributes })
}

/// An undeclared prefix makes the document malformed.
fn resolved(ns: ResolveResult<'_>, local: LocalName<'_>) -> Option<Name> {
    let namespace = match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(uri.to_vec()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(_) => return None,
    };
    Some((namespace, local.as_ref().to_vec()))
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !collapsed.is_empty() {
        nodes.push(Node::Text(collapsed));
    }
    text.clear();
}
