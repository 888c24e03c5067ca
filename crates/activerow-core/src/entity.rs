//! Entity metadata and the `Entity` trait.
//!
//! Every mapped table is described by a static [`EntityMeta`]: table name,
//! primary key, column list, mass-assignment whitelist, hidden and
//! encrypted field lists, timestamp opt-in, declared relations, and
//! lifecycle hooks. The query and record layers operate on
//! `&'static EntityMeta`, so heterogeneous relation targets need no
//! dynamic dispatch and nested eager-load paths resolve without generics.

use crate::error::Result;
use crate::record::Record;
use crate::relation::RelationDef;

/// A lifecycle hook: runs against the record being persisted.
///
/// A before-hook returning `Err` aborts the operation before any SQL is
/// issued; the error propagates to the caller.
pub type Hook = fn(&mut Record) -> Result<()>;

/// Hooks fired at defined points of the record lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleHooks {
    pub before_create: Option<Hook>,
    pub after_create: Option<Hook>,
    pub before_update: Option<Hook>,
    pub after_update: Option<Hook>,
    pub before_delete: Option<Hook>,
    pub after_delete: Option<Hook>,
}

impl LifecycleHooks {
    /// No hooks.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            before_create: None,
            after_create: None,
            before_update: None,
            after_update: None,
            before_delete: None,
            after_delete: None,
        }
    }
}

/// Static schema descriptor for a mapped table.
#[derive(Debug)]
pub struct EntityMeta {
    /// The table name.
    pub table: &'static str,

    /// The primary key column.
    pub primary_key: &'static str,

    /// All columns of the table, in declaration order.
    pub columns: &'static [&'static str],

    /// Mass-assignable columns. `fill` silently skips anything else.
    pub fillable: &'static [&'static str],

    /// Columns omitted from serialized output.
    pub hidden: &'static [&'static str],

    /// Columns stored encrypted; passed through the attribute cipher on
    /// materialization and persistence.
    pub encrypted: &'static [&'static str],

    /// Whether `created_at`/`updated_at` are maintained on writes.
    pub timestamps: bool,

    /// Declared relations.
    pub relations: &'static [RelationDef],

    /// Lifecycle hooks.
    pub hooks: LifecycleHooks,
}

impl EntityMeta {
    /// Create a descriptor with the given table, primary key and columns.
    ///
    /// Everything else defaults to empty/off; chain the const setters.
    #[must_use]
    pub const fn new(
        table: &'static str,
        primary_key: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        Self {
            table,
            primary_key,
            columns,
            fillable: &[],
            hidden: &[],
            encrypted: &[],
            timestamps: false,
            relations: &[],
            hooks: LifecycleHooks::none(),
        }
    }

    /// Set the mass-assignment whitelist.
    #[must_use]
    pub const fn fillable(mut self, columns: &'static [&'static str]) -> Self {
        self.fillable = columns;
        self
    }

    /// Set the columns hidden from serialization.
    #[must_use]
    pub const fn hidden(mut self, columns: &'static [&'static str]) -> Self {
        self.hidden = columns;
        self
    }

    /// Set the encrypted column list.
    #[must_use]
    pub const fn encrypted(mut self, columns: &'static [&'static str]) -> Self {
        self.encrypted = columns;
        self
    }

    /// Maintain `created_at`/`updated_at` on writes.
    #[must_use]
    pub const fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    /// Declare the entity's relations.
    #[must_use]
    pub const fn relations(mut self, relations: &'static [RelationDef]) -> Self {
        self.relations = relations;
        self
    }

    /// Install lifecycle hooks.
    #[must_use]
    pub const fn hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Check whether `column` is part of this table.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| *c == column)
    }

    /// Check whether `column` may be mass-assigned.
    #[must_use]
    pub fn is_fillable(&self, column: &str) -> bool {
        column != self.primary_key && self.fillable.iter().any(|c| *c == column)
    }

    /// Check whether `column` is hidden from serialization.
    #[must_use]
    pub fn is_hidden(&self, column: &str) -> bool {
        self.hidden.iter().any(|c| *c == column)
    }

    /// Check whether `column` is stored encrypted.
    #[must_use]
    pub fn is_encrypted(&self, column: &str) -> bool {
        self.encrypted.iter().any(|c| *c == column)
    }
}

/// Trait implemented by every mapped entity type.
///
/// An entity type is a zero-sized marker whose whole schema lives in its
/// [`EntityMeta`].
pub trait Entity: Send + Sync {
    /// The static metadata describing this entity's table.
    fn meta() -> &'static EntityMeta;
}
