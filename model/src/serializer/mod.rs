//! Serializers.
//!
//! - **N-Triples** ([`ntriples`]): profile rendering and literal escaping.
//! - **SPARQL Update** ([`sparql`]): the `DELETE/INSERT` body sent on save.

pub mod ntriples;
pub mod sparql;
