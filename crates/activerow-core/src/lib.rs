//! Core types and traits for activerow.
//!
//! This crate provides the foundational abstractions shared by the query
//! builder and the active-record layer:
//!
//! - `Value` and `Row` for dynamically-typed SQL data
//! - `Connection` trait for database handles (drivers live elsewhere)
//! - `EntityMeta` static schema descriptors and the `Entity` trait
//! - `RelationDef` descriptors for the four relationship shapes
//! - `Record` attribute map with original-snapshot dirty tracking
//! - `Outcome` re-export from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod cipher;
pub mod connection;
pub mod entity;
pub mod error;
pub mod record;
pub mod relation;
pub mod row;
pub mod value;

pub use cipher::AttributeCipher;
pub use connection::{Connection, RowCursor};
pub use entity::{Entity, EntityMeta, Hook, LifecycleHooks};
pub use error::{
    CircularReference, ConnectionError, Error, QueryError, QueryErrorKind, Result, TypeError,
    UnresolvedRelationship,
};
pub use record::{Record, RelationValue};
pub use relation::{RelationDef, RelationKind, find_relation};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
