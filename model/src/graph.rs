//! Subject-scoped, read-only views over a parsed profile.
//!
//! A [`Graph`] is built once per fetched profile response. The triple store
//! is reference-counted and never mutated after parsing, so
//! [`Graph::with_subject`] is a cheap view rather than a copy.

use std::collections::BTreeMap;
use std::sync::Arc;

use sophia_api::source::TripleSource;
use sophia_api::term::{Term, TermKind};
use sophia_api::triple::Triple as _;
use sophia_turtle::parser::nt;

use crate::error::{Error, Result};
use crate::model::iris::CONTENT_SUFFIX;
use crate::serializer::ntriples;

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// An IRI.
    Iri(String),
    /// A blank node label (without the `_:` prefix).
    Blank(String),
    /// A literal. Plain `xsd:string` literals carry no datatype.
    Literal {
        /// Lexical form.
        value: String,
        /// Datatype IRI, for typed literals.
        datatype: Option<String>,
        /// Language tag, for tagged literals.
        language: Option<String>,
    },
}

impl Object {
    /// A plain string literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Object::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    /// The string form returned by graph reads.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Object::Iri(s) | Object::Blank(s) => s,
            Object::Literal { value, .. } => value,
        }
    }
}

/// One statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// Subject IRI (or `_:label` for blank subjects).
    pub subject: String,
    /// Predicate IRI.
    pub predicate: String,
    /// Object term.
    pub object: Object,
}

impl Triple {
    /// Builds a triple.
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Object) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

/// Keyword → predicate IRI mapping shared by all views of a graph.
pub type Mapping = Arc<BTreeMap<String, String>>;

/// Builds a [`Mapping`] from keyword/predicate pairs.
pub fn mapping<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Mapping
where
    K: Into<String>,
    V: Into<String>,
{
    Arc::new(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// A triple store viewed from one subject.
#[derive(Debug, Clone)]
pub struct Graph {
    subject: String,
    mapping: Mapping,
    triples: Arc<Vec<Triple>>,
}

impl Graph {
    /// Parses an N-Triples document into a graph scoped to `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `content` is not valid N-Triples.
    pub fn parse(subject: impl Into<String>, content: &str, mapping: Mapping) -> Result<Self> {
        let subject = subject.into();
        let triples = parse_ntriples(content).map_err(|message| Error::Parse {
            subject: subject.clone(),
            message,
        })?;
        Ok(Self::from_triples(subject, triples, mapping))
    }

    /// Wraps an already-built triple store.
    pub fn from_triples(
        subject: impl Into<String>,
        triples: impl Into<Arc<Vec<Triple>>>,
        mapping: Mapping,
    ) -> Self {
        Self {
            subject: subject.into(),
            mapping,
            triples: triples.into(),
        }
    }

    /// A graph with no triples.
    pub fn empty(subject: impl Into<String>, mapping: Mapping) -> Self {
        Self::from_triples(subject, Vec::new(), mapping)
    }

    /// The scoping subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The keyword mapping.
    #[must_use]
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Resolves a keyword through the mapping; unknown keywords are taken to
    /// be predicate IRIs already.
    #[must_use]
    pub fn term<'a>(&'a self, keyword_or_term: &'a str) -> &'a str {
        self.mapping
            .get(keyword_or_term)
            .map_or(keyword_or_term, String::as_str)
    }

    /// All object values of `subject <term> ?o`, in store order.
    #[must_use]
    pub fn read(&self, keyword_or_term: &str) -> Vec<String> {
        let predicate = self.term(keyword_or_term);
        self.triples
            .iter()
            .filter(|t| t.subject == self.subject && t.predicate == predicate)
            .map(|t| t.object.as_str().to_string())
            .collect()
    }

    /// Whether [`Graph::read`] would return anything.
    #[must_use]
    pub fn has(&self, keyword_or_term: &str) -> bool {
        let predicate = self.term(keyword_or_term);
        self.triples
            .iter()
            .any(|t| t.subject == self.subject && t.predicate == predicate)
    }

    /// A view of the same store scoped to another subject.
    #[must_use]
    pub fn with_subject(&self, subject: impl Into<String>) -> Graph {
        Graph {
            subject: subject.into(),
            mapping: Arc::clone(&self.mapping),
            triples: Arc::clone(&self.triples),
        }
    }

    /// A view at `subject + "/fcr:content"`, where content metadata lives.
    #[must_use]
    pub fn with_content_subject(&self) -> Graph {
        self.with_subject(format!("{}{}", self.subject, CONTENT_SUFFIX))
    }

    /// Every triple in the underlying store, regardless of subject.
    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Number of triples in the underlying store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the underlying store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Renders the underlying store as N-Triples.
    #[must_use]
    pub fn to_ntriples(&self) -> String {
        ntriples::to_ntriples(self.triples.iter())
    }
}

/// Parses N-Triples text into owned triples.
///
/// Blank lines and comments are dropped, and a statement missing its
/// terminating ` .` is accepted. A repeated statement is kept once.
pub(crate) fn parse_ntriples(content: &str) -> std::result::Result<Vec<Triple>, String> {
    let normalized = normalize(content);
    let mut triples = Vec::new();
    nt::parse_str(&normalized)
        .for_each_triple(|t| {
            if let (Some(subject), Some(predicate), Some(object)) =
                (node(t.s()), iri(t.p()), object(t.o()))
            {
                let triple = Triple {
                    subject,
                    predicate,
                    object,
                };
                if !triples.contains(&triple) {
                    triples.push(triple);
                }
            }
        })
        .map_err(|e| e.to_string())?;
    Ok(triples)
}

fn normalize(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 16);
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push_str(line);
        if !line.ends_with('.') {
            out.push_str(" .");
        }
        out.push('\n');
    }
    out
}

fn iri<T: Term>(term: T) -> Option<String> {
    term.iri().map(|i| i.as_str().to_string())
}

fn node<T: Term>(term: T) -> Option<String> {
    match term.kind() {
        TermKind::Iri => iri(term),
        TermKind::BlankNode => term.bnode_id().map(|b| format!("_:{}", b.as_str())),
        _ => None,
    }
}

fn object<T: Term>(term: T) -> Option<Object> {
    match term.kind() {
        TermKind::Iri => iri(term).map(Object::Iri),
        TermKind::BlankNode => term.bnode_id().map(|b| Object::Blank(b.as_str().to_string())),
        TermKind::Literal => {
            let lexical = term.lexical_form()?;
            let value = String::from(&*lexical);
            let language = term.language_tag().map(|l| l.as_str().to_string());
            let datatype = term
                .datatype()
                .map(|d| d.as_str().to_string())
                .filter(|d| d != XSD_STRING && d != RDF_LANG_STRING);
            Some(Object::Literal {
                value,
                datatype,
                language,
            })
        }
        _ => None,
    }
}
