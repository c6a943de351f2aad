//! Attribute values.
//!
//! Profiles always yield sequences, while callers usually write scalars, so
//! equality between the two is defined loosely: `One(x)` is equivalent to
//! `Many([x])` and `Null` to `Many([])`.

use std::fmt;

use serde::Serialize;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// A string literal.
    Text(String),
    /// A boolean literal, serialized as bare `true`/`false`.
    Bool(bool),
    /// A reference to another entity, by URI.
    Reference(String),
}

impl Scalar {
    /// Returns the lexical form written into triples.
    ///
    /// References are dereferenced to their URI.
    #[must_use]
    pub fn lexical(&self) -> &str {
        match self {
            Scalar::Text(s) | Scalar::Reference(s) => s,
            Scalar::Bool(true) => "true",
            Scalar::Bool(false) => "false",
        }
    }

    /// Whether two scalars have the same lexical form.
    #[must_use]
    pub fn same(&self, other: &Scalar) -> bool {
        self.lexical() == other.lexical()
    }

    /// Returns the text of a [`Scalar::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lexical())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// The value of an attribute: absent, a scalar, or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A single scalar.
    One(Scalar),
    /// An ordered sequence of scalars.
    Many(Vec<Scalar>),
}

impl Value {
    /// Builds a sequence value from strings read out of a graph.
    pub fn from_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Many(values.into_iter().map(|s| Scalar::Text(s.into())).collect())
    }

    /// Whether the value carries no scalars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::One(_) => false,
            Value::Many(v) => v.is_empty(),
        }
    }

    /// The scalars of the value, in order.
    #[must_use]
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            Value::Null => &[],
            Value::One(s) => std::slice::from_ref(s),
            Value::Many(v) => v,
        }
    }

    /// Consumes the value into its scalars.
    #[must_use]
    pub fn into_scalars(self) -> Vec<Scalar> {
        match self {
            Value::Null => Vec::new(),
            Value::One(s) => vec![s],
            Value::Many(v) => v,
        }
    }

    /// The only scalar, if the value holds exactly one.
    #[must_use]
    pub fn single(&self) -> Option<&Scalar> {
        match self.scalars() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// The first scalar, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Scalar> {
        self.scalars().first()
    }

    /// The first scalar's lexical form, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.first().map(Scalar::lexical)
    }

    /// Scalar/sequence-tolerant equality over lexical forms.
    ///
    /// Profiles only carry text, so `Bool(true)` and `Text("true")` (or a
    /// reference and its URI) are the same value once written.
    #[must_use]
    pub fn equivalent(&self, other: &Value) -> bool {
        let (a, b) = (self.scalars(), other.scalars());
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::One(s) => write!(f, "{s}"),
            Value::Many(v) => {
                f.write_str("[")?;
                for (i, s) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{s}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::One(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::One(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::One(s.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::One(b.into())
    }
}

impl<S: Into<Scalar>> From<Vec<S>> for Value {
    fn from(v: Vec<S>) -> Self {
        Value::Many(v.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<Scalar>> From<Option<S>> for Value {
    fn from(v: Option<S>) -> Self {
        v.map_or(Value::Null, |s| Value::One(s.into()))
    }
}
