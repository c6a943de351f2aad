//! Error types.

use thiserror::Error;

/// Errors reported by a [`Repository`](crate::Repository) implementation.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RepositoryError {
    /// The requested resource does not exist.
    ///
    /// On profile fetches this is not fatal: the entity is treated as new.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Any other transport failure, propagated unmodified.
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl RepositoryError {
    /// Wraps an arbitrary transport error.
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        RepositoryError::Transport(err.into())
    }

    /// Whether this error means the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

/// Crate-level error.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A repository call failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The object does not exist in the repository.
    #[error("{0} does not exist")]
    NotFound(String),

    /// A mutation was attempted on a historical view.
    #[error("can't change values on older versions ({uri} as of {as_of})")]
    ReadOnly {
        /// URI of the entity.
        uri: String,
        /// Timestamp the view is bound to.
        as_of: String,
    },

    /// A value outside an enumerated attribute's allowed set.
    #[error("Allowed values for {attribute} are {allowed}. You provided '{value}'")]
    Validation {
        /// Keyword of the attribute.
        attribute: &'static str,
        /// The rejected value.
        value: String,
        /// Human-readable list of allowed values.
        allowed: &'static str,
    },

    /// An operation's precondition does not hold.
    #[error("unable to {action} {uri}: {reason}")]
    Precondition {
        /// The operation that was refused (e.g. `"save"`).
        action: &'static str,
        /// URI of the entity.
        uri: String,
        /// Why the operation was refused.
        reason: &'static str,
    },

    /// A profile could not be parsed as N-Triples.
    #[error("failed to parse profile of {subject}: {message}")]
    Parse {
        /// Subject the profile was fetched for.
        subject: String,
        /// Parser message.
        message: String,
    },

    /// A SPARQL update could not be interpreted.
    #[error("malformed update: {0}")]
    Update(String),

    /// `stream` was called on a datastream whose size is unknown.
    #[error("can't determine bitstream size of {0}")]
    SizeUnavailable(String),

    /// Reading content failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Settings could not be parsed.
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

/// Convenience alias for results carrying [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected() {
        assert!(RepositoryError::NotFound("x".into()).is_not_found());
        assert!(!RepositoryError::transport("boom").is_not_found());
    }

    #[test]
    fn transport_errors_display_unmodified() {
        let err = Error::from(RepositoryError::transport("connection reset"));
        assert_eq!(err.to_string(), "connection reset");
    }
}
