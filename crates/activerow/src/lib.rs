//! activerow: fluent relational query builder and record mapper.
//!
//! The facade crate ties the workspace together:
//!
//! - re-exports the core types (`Value`, `Row`, `Record`, `Connection`,
//!   entity metadata, errors) and the query layer (`Query`, `Collection`,
//!   grammar, pagination, traversal)
//! - adds the active-record surface: `save`, `create`, `find`, `all`,
//!   `update_or_create`, `purge`, `delete_record`, and the typed
//!   [`ActiveEntity`] sugar
//!
//! # Example
//!
//! ```ignore
//! use activerow::prelude::*;
//!
//! static USERS: EntityMeta = EntityMeta::new("users", "id", &["id", "email"])
//!     .fillable(&["email"]);
//!
//! struct User;
//!
//! impl Entity for User {
//!     fn meta() -> &'static EntityMeta {
//!         &USERS
//!     }
//! }
//!
//! let adults = User::query_on(&conn)
//!     .filter("age", ">=", 18_i64)
//!     .order_by("email")
//!     .get(&cx, &conn)
//!     .await;
//! ```

pub mod active;

pub use active::{
    ActiveEntity, all, create, delete_record, find, purge, query_on, save, save_with_cipher,
    update_or_create,
};

pub use activerow_core::{
    AttributeCipher, Connection, Cx, Entity, EntityMeta, Error, Hook, LifecycleHooks, Outcome,
    QueryError, Record, RelationDef, RelationKind, RelationValue, Result, Row, RowCursor, Value,
    find_relation,
};
pub use activerow_query::{
    Collection, ConditionClause, ConditionKind, Connector, DatePart, Dialect, EmbedSpec,
    JoinClause, JoinKind, Page, PivotBinding, Query, RecordCursor, RecordStream, exists_condition,
    relation_query,
};

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::active::{ActiveEntity, delete_record, save, save_with_cipher};
    pub use activerow_core::{
        Connection, Cx, Entity, EntityMeta, Error, LifecycleHooks, Outcome, Record, RelationDef,
        RelationValue, Result, Row, Value,
    };
    pub use activerow_query::{Collection, DatePart, Dialect, Page, Query, relation_query};
}
