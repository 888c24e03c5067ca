//! Relationship descriptors.
//!
//! Relations are declared as static metadata on each entity and consumed
//! by the query layer to generate scoped builders, batched eager loads,
//! and existence subqueries. Declaration is a pure value: invoking a
//! relation never mutates the record it was invoked on.

use crate::entity::EntityMeta;

/// The shape of a relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// One parent row owns at most one related row (`users` -> `profiles`).
    HasOne,
    /// One parent row owns many related rows (`posts` -> `comments`).
    HasMany,
    /// The declaring row carries the foreign key (`comments` -> `posts`).
    BelongsTo,
    /// Many-to-many through a pivot table (`heroes` <-> `powers`).
    BelongsToMany,
}

/// Static metadata describing one relationship.
///
/// The related entity's metadata is reached through a fn pointer so
/// mutually-referential entities can both carry const descriptors.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    /// Name of the relation (the eager-load path segment).
    pub name: &'static str,

    /// Shape of the relationship.
    pub kind: RelationKind,

    /// The related entity's metadata.
    pub related: fn() -> &'static EntityMeta,

    /// The foreign key column.
    ///
    /// - HasOne/HasMany: column on the related table pointing at the parent.
    /// - BelongsTo: column on the declaring table pointing at the owner.
    /// - BelongsToMany: the parent's column in the pivot table.
    pub foreign_key: &'static str,

    /// The key the foreign key references.
    ///
    /// - HasOne/HasMany/BelongsToMany: key on the parent (usually its pk).
    /// - BelongsTo: key on the owner (usually the owner's pk).
    pub local_key: &'static str,

    /// Pivot table name (BelongsToMany only).
    pub pivot_table: Option<&'static str>,

    /// The related entity's column in the pivot table (BelongsToMany only).
    pub related_key: Option<&'static str>,
}

impl RelationDef {
    /// Declare a one-to-one relation; `foreign_key` lives on the related table.
    #[must_use]
    pub const fn has_one(
        name: &'static str,
        related: fn() -> &'static EntityMeta,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::HasOne,
            related,
            foreign_key,
            local_key: "id",
            pivot_table: None,
            related_key: None,
        }
    }

    /// Declare a one-to-many relation; `foreign_key` lives on the related table.
    #[must_use]
    pub const fn has_many(
        name: &'static str,
        related: fn() -> &'static EntityMeta,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::HasMany,
            related,
            foreign_key,
            local_key: "id",
            pivot_table: None,
            related_key: None,
        }
    }

    /// Declare an inverse relation; `foreign_key` lives on the declaring table.
    #[must_use]
    pub const fn belongs_to(
        name: &'static str,
        related: fn() -> &'static EntityMeta,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::BelongsTo,
            related,
            foreign_key,
            local_key: "id",
            pivot_table: None,
            related_key: None,
        }
    }

    /// Declare a many-to-many relation through `pivot_table`.
    ///
    /// `foreign_key` is the parent's pivot column, `related_key` the related
    /// entity's pivot column.
    #[must_use]
    pub const fn belongs_to_many(
        name: &'static str,
        related: fn() -> &'static EntityMeta,
        pivot_table: &'static str,
        foreign_key: &'static str,
        related_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind: RelationKind::BelongsToMany,
            related,
            foreign_key,
            local_key: "id",
            pivot_table: Some(pivot_table),
            related_key: Some(related_key),
        }
    }

    /// Override the key the foreign key references (defaults to `"id"`).
    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = key;
        self
    }

    /// True when loading yields a single record rather than a collection.
    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self.kind, RelationKind::HasOne | RelationKind::BelongsTo)
    }
}

/// Find a relation by name in an entity's declared relations.
#[must_use]
pub fn find_relation(meta: &'static EntityMeta, name: &str) -> Option<&'static RelationDef> {
    meta.relations.iter().find(|r| r.name == name)
}
