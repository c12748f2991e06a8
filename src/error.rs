//! Error types for parsing, assembling and searching reaction networks.
//!
//! Every fallible operation in the library returns [`Result`]. Errors are
//! never recovered locally: a malformed coordinate, a connection that points
//! outside its EQ list or a view requested before its analysis was attached
//! all propagate to the caller with the offending line or index attached.

use crate::structure::Kind;
use thiserror::Error;

/// Errors produced by the reaction-network core.
#[derive(Debug, Error)]
pub enum Error {
    /// File system error while reading or writing
    #[error("I/O operation failed: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// The header line does not identify the expected list kind
    #[error("not a {expected} list log{}", likely_hint(.likely))]
    Format {
        /// The list kind the caller asked for
        expected: Kind,
        /// The kind the header actually announces, when recognisable
        likely: Option<Kind>,
    },

    /// A token could not be decoded (coordinates, energies, block layout)
    #[error("malformed input at line {line}: {details}")]
    Parse {
        /// 1-based line number, 0 when the problem is not bound to a line
        line: usize,
        /// Description of the problem
        details: String,
    },

    /// An entity or collection of the wrong kind was supplied
    #[error("expected {expected} but got {found}")]
    TypeKind {
        /// Kind required by the receiver
        expected: Kind,
        /// Kind that was supplied
        found: Kind,
    },

    /// A boolean mask or replacement sequence has the wrong length
    #[error("length mismatch: expected {expected}, got {found}")]
    LengthMismatch {
        /// Required length
        expected: usize,
        /// Supplied length
        found: usize,
    },

    /// Integer or fancy index outside the collection
    #[error("index {index} out of range for collection of length {len}")]
    Index {
        /// Offending index
        index: usize,
        /// Collection length
        len: usize,
    },

    /// A TS/PT connection points outside the owning EQ list
    #[error("{kind}{entity} connects to EQ{endpoint}, but the EQ list holds {len} structures")]
    ReferentialIntegrity {
        /// Kind of the offending entity (TS or PT)
        kind: Kind,
        /// Position of the entity in its list
        entity: usize,
        /// Endpoint index found in the connection
        endpoint: usize,
        /// Length of the EQ list
        len: usize,
    },

    /// An unresolved connection endpoint was dereferenced
    #[error("{kind}{entity} has an unresolved endpoint '{token}'")]
    Unresolved {
        /// Kind of the entity (TS or PT)
        kind: Kind,
        /// Position of the entity in its list
        entity: usize,
        /// Sentinel token as written in the log
        token: String,
    },

    /// A derived view or computation was requested before its inputs exist
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// JSON (de)serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn likely_hint(likely: &Option<Kind>) -> String {
    match likely {
        Some(kind) => format!(" (the header looks like a {} list log)", kind),
        None => String::new(),
    }
}

impl Error {
    /// Creates a [`Parse`](Error::Parse) error.
    pub fn parse(line: usize, details: impl Into<String>) -> Self {
        Self::Parse {
            line,
            details: details.into(),
        }
    }

    /// Creates a [`Precondition`](Error::Precondition) error.
    pub fn precondition(details: impl Into<String>) -> Self {
        Self::Precondition(details.into())
    }
}

/// Type alias for results in this crate
pub type Result<T> = std::result::Result<T, Error>;
