//! Fluent query builder and relationship engine for activerow.
//!
//! This crate turns entity metadata into executable SQL:
//!
//! - `Dialect` grammar for the three supported backends
//! - `ConditionClause` predicate lists with lockstep binding collection
//! - `Query`, the chainable builder (select, conditions, joins, grouping,
//!   ordering, writes, upsert, pagination)
//! - batched eager loading, relation counts and existence subqueries
//! - large-result traversal (chunk, cursor, stream, buffered)

pub mod builder;
pub mod clause;
pub mod collection;
pub mod eager;
pub mod grammar;
pub mod join;
pub mod paginate;
pub mod traverse;

pub use activerow_core::Entity;
pub use builder::{Constraint, EmbedSpec, OrderTerm, PivotBinding, Query};
pub use clause::{
    ConditionClause, ConditionKind, Connector, collect_bindings, render_conditions,
};
pub use collection::Collection;
pub use eager::{exists_condition, relation_query};
pub use grammar::{DatePart, Dialect};
pub use join::{JoinClause, JoinKind};
pub use paginate::Page;
pub use traverse::{RecordCursor, RecordStream};

/// Propagate the non-`Ok` arms of an [`asupersync::Outcome`] to the caller.
///
/// The cancel and panic arms are forwarded untouched so cancellation stays
/// cancel-correct through every layer.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(v) => v,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}

/// Build a [`Query`] over an entity type.
///
/// # Example
///
/// ```ignore
/// let adults = query!(User).filter("age", ">=", 18_i64).get(&cx, &conn).await;
/// ```
#[macro_export]
macro_rules! query {
    ($entity:ty) => {
        $crate::Query::new(<$entity as $crate::Entity>::meta())
    };
}
