//! Attribute tables for digital objects and datastreams.
//!
//! Every trackable attribute is a variant of a closed enum with a static
//! entry `{name, predicate, default}`. The predicate is the profile term the
//! attribute is read through and written back to; attributes without one
//! are local-only (`logMessage`) and never reach a SPARQL update.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::value::{Scalar, Value};

/// Static description of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Keyword used in profiles and on the command line (e.g. `"label"`).
    pub name: &'static str,
    /// Predicate IRI, or `None` for attributes that are never persisted.
    pub predicate: Option<&'static str>,
    /// Value substituted when the profile holds no triple for the predicate.
    pub default: Option<DefaultValue>,
}

impl AttributeSpec {
    const fn new(name: &'static str, predicate: &'static str) -> Self {
        Self {
            name,
            predicate: Some(predicate),
            default: None,
        }
    }

    const fn local(name: &'static str) -> Self {
        Self {
            name,
            predicate: None,
            default: None,
        }
    }

    const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// A compile-time default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// A plain string literal.
    Text(&'static str),
    /// A boolean literal.
    Bool(bool),
}

impl From<DefaultValue> for Value {
    fn from(default: DefaultValue) -> Self {
        match default {
            DefaultValue::Text(s) => Value::One(Scalar::Text(s.to_string())),
            DefaultValue::Bool(b) => Value::One(Scalar::Bool(b)),
        }
    }
}

/// An enumerated attribute table.
pub trait Attribute: Copy + Ord + fmt::Debug + Send + Sync + 'static {
    /// All variants, in table order.
    const ALL: &'static [Self];

    /// The static table entry for this attribute.
    fn spec(self) -> AttributeSpec;

    /// Keyword of the attribute.
    fn name(self) -> &'static str {
        self.spec().name
    }

    /// Predicate IRI, if the attribute is persisted.
    fn predicate(self) -> Option<&'static str> {
        self.spec().predicate
    }

    /// Looks an attribute up by keyword.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.name() == name)
    }

    /// Keyword → predicate pairs for every persisted attribute.
    fn mapping() -> Vec<(&'static str, &'static str)> {
        Self::ALL
            .iter()
            .filter_map(|a| a.predicate().map(|p| (a.name(), p)))
            .collect()
    }
}

/// Predicate IRIs used by the attribute tables.
pub mod iris {
    /// Dublin Core terms namespace.
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    /// Fedora 3 compatibility namespace.
    pub const FEDORA3: &str = "info:fedora3/";
    /// Fedora repository-internal namespace.
    pub const FEDORA_INTERNAL: &str = "info:fedora/fedora-system:def/internal#";
    /// RELS-EXT relationship namespace.
    pub const RELS_EXT: &str = "info:fedora/fedora-system:def/relations-external#";

    /// `dcterms:title`.
    pub const TITLE: &str = "http://purl.org/dc/terms/title";
    /// `dcterms:creator`.
    pub const CREATOR: &str = "http://purl.org/dc/terms/creator";
    /// `dcterms:identifier`.
    pub const IDENTIFIER: &str = "http://purl.org/dc/terms/identifier";
    /// `dcterms:format`.
    pub const FORMAT: &str = "http://purl.org/dc/terms/format";
    /// `dcterms:type`, used for datastream MIME types.
    pub const TYPE: &str = "http://purl.org/dc/terms/type";

    /// Object or datastream state (`A`, `I`, `D`).
    pub const STATE: &str = "info:fedora3/state";
    /// Datastream control group.
    pub const CONTROL_GROUP: &str = "info:fedora3/controlGroup";
    /// Location of external and redirect datastreams.
    pub const DS_LOCATION: &str = "info:fedora3/dsLocation";
    /// Whether the datastream is versioned.
    pub const VERSIONABLE: &str = "info:fedora3/versionable";
    /// Checksum algorithm.
    pub const CHECKSUM_TYPE: &str = "info:fedora3/checksumType";
    /// Checksum value.
    pub const CHECKSUM: &str = "info:fedora3/checksum";

    /// Last modification timestamp.
    pub const LAST_MODIFIED: &str = "info:fedora/fedora-system:def/internal#lastModified";
    /// Creation timestamp.
    pub const CREATED: &str = "info:fedora/fedora-system:def/internal#created";
    /// Child resources (datastreams) of an object.
    pub const HAS_CHILD: &str = "info:fedora/fedora-system:def/internal#hasChild";
    /// Parent resource.
    pub const HAS_PARENT: &str = "info:fedora/fedora-system:def/internal#hasParent";
    /// Mixin types, surfaced as the object's models.
    pub const MIXIN_TYPES: &str = "info:fedora/fedora-system:def/internal#mixinTypes";
    /// Byte size, published under the content subject.
    pub const SIZE: &str = "info:fedora/size";

    /// Suffix of the derived subject that carries content metadata.
    pub const CONTENT_SUFFIX: &str = "/fcr:content";
}

macro_rules! rels_ext {
    ($local:literal) => {
        concat!("info:fedora/fedora-system:def/relations-external#", $local)
    };
}

/// Attributes of a digital object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectAttribute {
    /// Object state, one of `I`, `A`, `D`.
    State,
    /// Owner id.
    OwnerId,
    /// Object label.
    Label,
    /// Audit log message for the next save; never persisted as a triple.
    LogMessage,
    /// Last modification timestamp.
    LastModifiedDate,
    /// Child datastream URIs.
    Datastreams,
    /// Content models (mixin types).
    Models,
    /// `hasAnnotation`.
    Annotations,
    /// `hasMetadata`.
    HasMetadata,
    /// `isDescriptionOf`.
    DescriptionOf,
    /// `isPartOf`.
    PartOf,
    /// `hasDescription`.
    Descriptions,
    /// `isDependentOf`.
    DependentOf,
    /// `hasConstituent`.
    Constituents,
    /// `hasPart`.
    Parts,
    /// `isMemberOfCollection`.
    MemberOfCollection,
    /// `isMemberOf`.
    MemberOf,
    /// `hasEquivalent`.
    Equivalents,
    /// `hasDerivation`.
    Derivations,
    /// `isDerivationOf`.
    DerivationOf,
    /// `hasSubset`.
    Subsets,
    /// `isAnnotationOf`.
    AnnotationOf,
    /// `isMetadataFor`.
    MetadataFor,
    /// `hasDependent`.
    Dependents,
    /// `isSubsetOf`.
    SubsetOf,
    /// `isConstituentOf`.
    ConstituentOf,
    /// `hasCollectionMember`.
    CollectionMembers,
    /// `hasMember`.
    Members,
}

impl Attribute for ObjectAttribute {
    const ALL: &'static [Self] = &[
        Self::State,
        Self::OwnerId,
        Self::Label,
        Self::LogMessage,
        Self::LastModifiedDate,
        Self::Datastreams,
        Self::Models,
        Self::Annotations,
        Self::HasMetadata,
        Self::DescriptionOf,
        Self::PartOf,
        Self::Descriptions,
        Self::DependentOf,
        Self::Constituents,
        Self::Parts,
        Self::MemberOfCollection,
        Self::MemberOf,
        Self::Equivalents,
        Self::Derivations,
        Self::DerivationOf,
        Self::Subsets,
        Self::AnnotationOf,
        Self::MetadataFor,
        Self::Dependents,
        Self::SubsetOf,
        Self::ConstituentOf,
        Self::CollectionMembers,
        Self::Members,
    ];

    fn spec(self) -> AttributeSpec {
        use iris::*;
        match self {
            Self::State => AttributeSpec::new("state", STATE),
            Self::OwnerId => AttributeSpec::new("ownerId", CREATOR),
            Self::Label => AttributeSpec::new("label", TITLE),
            Self::LogMessage => AttributeSpec::local("logMessage"),
            Self::LastModifiedDate => AttributeSpec::new("lastModifiedDate", LAST_MODIFIED),
            Self::Datastreams => AttributeSpec::new("datastreams", HAS_CHILD),
            Self::Models => AttributeSpec::new("models", MIXIN_TYPES),
            Self::Annotations => AttributeSpec::new("annotations", rels_ext!("hasAnnotation")),
            Self::HasMetadata => AttributeSpec::new("has_metadata", rels_ext!("hasMetadata")),
            Self::DescriptionOf => AttributeSpec::new("description_of", rels_ext!("isDescriptionOf")),
            Self::PartOf => AttributeSpec::new("part_of", rels_ext!("isPartOf")),
            Self::Descriptions => AttributeSpec::new("descriptions", rels_ext!("hasDescription")),
            Self::DependentOf => AttributeSpec::new("dependent_of", rels_ext!("isDependentOf")),
            Self::Constituents => AttributeSpec::new("constituents", rels_ext!("hasConstituent")),
            Self::Parts => AttributeSpec::new("parts", rels_ext!("hasPart")),
            Self::MemberOfCollection => AttributeSpec::new("member_of_collection", rels_ext!("isMemberOfCollection")),
            Self::MemberOf => AttributeSpec::new("member_of", rels_ext!("isMemberOf")),
            Self::Equivalents => AttributeSpec::new("equivalents", rels_ext!("hasEquivalent")),
            Self::Derivations => AttributeSpec::new("derivations", rels_ext!("hasDerivation")),
            Self::DerivationOf => AttributeSpec::new("derivation_of", rels_ext!("isDerivationOf")),
            Self::Subsets => AttributeSpec::new("subsets", rels_ext!("hasSubset")),
            Self::AnnotationOf => AttributeSpec::new("annotation_of", rels_ext!("isAnnotationOf")),
            Self::MetadataFor => AttributeSpec::new("metadata_for", rels_ext!("isMetadataFor")),
            Self::Dependents => AttributeSpec::new("dependents", rels_ext!("hasDependent")),
            Self::SubsetOf => AttributeSpec::new("subset_of", rels_ext!("isSubsetOf")),
            Self::ConstituentOf => AttributeSpec::new("constituent_of", rels_ext!("isConstituentOf")),
            Self::CollectionMembers => AttributeSpec::new("collection_members", rels_ext!("hasCollectionMember")),
            Self::Members => AttributeSpec::new("members", rels_ext!("hasMember")),
        }
    }
}

/// Attributes of a datastream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatastreamAttribute {
    /// Storage mode (`M`, `X`, `E`, `R`).
    ControlGroup,
    /// Location of external/redirect content.
    Location,
    /// Alternate identifiers.
    AltIds,
    /// Datastream label.
    Label,
    /// Whether the datastream is versioned.
    Versionable,
    /// Datastream state (`A`, `I`, `D`).
    State,
    /// Format URI.
    FormatUri,
    /// Checksum algorithm.
    ChecksumType,
    /// Checksum value.
    Checksum,
    /// MIME type.
    MimeType,
    /// Audit log message for the next save; never persisted as a triple.
    LogMessage,
    /// Local flag telling the transport to skip content; never persisted.
    IgnoreContent,
    /// Last modification timestamp.
    LastModifiedDate,
}

impl Attribute for DatastreamAttribute {
    const ALL: &'static [Self] = &[
        Self::ControlGroup,
        Self::Location,
        Self::AltIds,
        Self::Label,
        Self::Versionable,
        Self::State,
        Self::FormatUri,
        Self::ChecksumType,
        Self::Checksum,
        Self::MimeType,
        Self::LogMessage,
        Self::IgnoreContent,
        Self::LastModifiedDate,
    ];

    fn spec(self) -> AttributeSpec {
        use iris::*;
        match self {
            Self::ControlGroup => AttributeSpec::new("controlGroup", CONTROL_GROUP)
                .with_default(DefaultValue::Text("M")),
            Self::Location => AttributeSpec::new("dsLocation", DS_LOCATION),
            Self::AltIds => AttributeSpec::new("altIDs", IDENTIFIER),
            Self::Label => AttributeSpec::new("dsLabel", TITLE),
            Self::Versionable => AttributeSpec::new("versionable", VERSIONABLE)
                .with_default(DefaultValue::Bool(true)),
            Self::State => AttributeSpec::new("dsState", STATE).with_default(DefaultValue::Text("A")),
            Self::FormatUri => AttributeSpec::new("formatURI", FORMAT),
            Self::ChecksumType => AttributeSpec::new("checksumType", CHECKSUM_TYPE),
            Self::Checksum => AttributeSpec::new("checksum", CHECKSUM),
            Self::MimeType => AttributeSpec::new("mimeType", TYPE)
                .with_default(DefaultValue::Text("application/octet-stream")),
            Self::LogMessage => AttributeSpec::local("logMessage"),
            Self::IgnoreContent => AttributeSpec::local("ignoreContent"),
            Self::LastModifiedDate => AttributeSpec::new("lastModifiedDate", LAST_MODIFIED),
        }
    }
}

/// Lifecycle state of a digital object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    /// `I`
    Inactive,
    /// `A`
    Active,
    /// `D`
    Deleted,
}

impl ObjectState {
    /// Allowed codes, as quoted in validation errors.
    pub const ALLOWED: &'static str = "'I', 'A' and 'D'";

    /// Returns the single-letter code stored in profiles.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectState::Inactive => "I",
            ObjectState::Active => "A",
            ObjectState::Deleted => "D",
        }
    }
}

impl FromStr for ObjectState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ObjectState::Inactive),
            "A" => Ok(ObjectState::Active),
            "D" => Ok(ObjectState::Deleted),
            other => Err(Error::Validation {
                attribute: "state",
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

impl From<ObjectState> for Value {
    fn from(state: ObjectState) -> Self {
        Value::One(Scalar::Text(state.as_str().to_string()))
    }
}

/// Storage mode of a datastream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlGroup {
    /// `M`: content managed by the repository.
    Managed,
    /// `X`: inline XML.
    Inline,
    /// `E`: external content referenced by location.
    External,
    /// `R`: redirect to a location.
    Redirect,
}

impl ControlGroup {
    /// Allowed codes, as quoted in validation errors.
    pub const ALLOWED: &'static str = "'M', 'X', 'E' and 'R'";

    /// Returns the single-letter code stored in profiles.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ControlGroup::Managed => "M",
            ControlGroup::Inline => "X",
            ControlGroup::External => "E",
            ControlGroup::Redirect => "R",
        }
    }

    /// External and redirect datastreams track a location instead of content.
    #[must_use]
    pub fn is_by_reference(self) -> bool {
        matches!(self, ControlGroup::External | ControlGroup::Redirect)
    }
}

impl FromStr for ControlGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(ControlGroup::Managed),
            "X" => Ok(ControlGroup::Inline),
            "E" => Ok(ControlGroup::External),
            "R" => Ok(ControlGroup::Redirect),
            other => Err(Error::Validation {
                attribute: "controlGroup",
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

impl From<ControlGroup> for Value {
    fn from(group: ControlGroup) -> Self {
        Value::One(Scalar::Text(group.as_str().to_string()))
    }
}

/// Validates a value written to an enumerated attribute.
///
/// A value must hold exactly one text scalar, which `parse` accepts.
pub(crate) fn validate_enumerated<T>(
    value: &Value,
    parse: impl Fn(&str) -> Result<T, Error>,
    attribute: &'static str,
    allowed: &'static str,
) -> Result<T, Error> {
    match value.single() {
        Some(Scalar::Text(s)) => parse(s),
        other => Err(Error::Validation {
            attribute,
            value: other.map_or_else(|| value.to_string(), |s| s.to_string()),
            allowed,
        }),
    }
}
