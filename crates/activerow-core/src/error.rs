//! Error types for activerow operations.

use std::fmt;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type for all activerow operations.
#[derive(Debug)]
pub enum Error {
    /// Driver-level failure during prepare/execute, carrying the SQL.
    Query(QueryError),
    /// Malformed caller input (inconsistent insert rows, unknown column).
    InvalidArgument(String),
    /// A relation name was used that the entity does not declare.
    UnresolvedRelationship(UnresolvedRelationship),
    /// A cycle was detected while assembling a self-referential tree.
    CircularReference(CircularReference),
    /// Connection-level errors (connect, disconnect, timeout).
    Connection(ConnectionError),
    /// Type conversion errors.
    Type(TypeError),
    /// Serialization/deserialization errors.
    Serde(String),
    /// Custom error with message.
    Custom(String),
}

/// A failed statement, wrapped with the SQL that produced it.
#[derive(Debug)]
pub struct QueryError {
    /// The SQL text that was being prepared or executed.
    pub sql: String,
    /// The driver's error message, carried verbatim.
    pub message: String,
    /// What stage of execution failed.
    pub kind: QueryErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Statement preparation failed
    Prepare,
    /// Statement execution failed
    Execute,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Other database error
    Database,
}

/// A relation method was invoked with a name the entity does not declare.
#[derive(Debug)]
pub struct UnresolvedRelationship {
    /// Table of the entity the lookup ran against.
    pub entity: &'static str,
    /// The relation name that failed to resolve.
    pub relation: String,
}

/// A cycle encountered while building a self-referential tree.
#[derive(Debug)]
pub struct CircularReference {
    /// Table the tree was built over.
    pub table: String,
    /// Stringified key of the record where the cycle closed.
    pub key: String,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub message: String,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Wrap a driver failure with the offending SQL.
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: sql.into(),
            message: message.into(),
            kind: QueryErrorKind::Execute,
        })
    }

    /// Invalid caller-supplied argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// A relation name failed to resolve on an entity.
    pub fn unresolved(entity: &'static str, relation: impl Into<String>) -> Self {
        Error::UnresolvedRelationship(UnresolvedRelationship {
            entity,
            relation: relation.into(),
        })
    }

    /// A self-referential tree closed a cycle.
    pub fn circular(table: impl Into<String>, key: impl Into<String>) -> Self {
        Error::CircularReference(CircularReference {
            table: table.into(),
            key: key.into(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => write!(f, "query failed: {} (sql: {})", e.message, e.sql),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::UnresolvedRelationship(e) => {
                write!(f, "entity '{}' has no relation '{}'", e.entity, e.relation)
            }
            Error::CircularReference(e) => write!(
                f,
                "circular reference in '{}' tree at key {}",
                e.table, e.key
            ),
            Error::Connection(e) => write!(f, "connection error: {}", e.message),
            Error::Type(e) => {
                write!(f, "expected {}, got {}", e.expected, e.actual)?;
                if let Some(column) = &e.column {
                    write!(f, " (column '{column}')")?;
                }
                Ok(())
            }
            Error::Serde(msg) => write!(f, "serialization error: {msg}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e.to_string())
    }
}
