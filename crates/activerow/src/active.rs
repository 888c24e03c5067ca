//! Active-record persistence over `Record`.
//!
//! The record owns its create/update/delete lifecycle; these functions
//! wire the lifecycle hooks, timestamp maintenance, encryption and the
//! dirty-restricted update rule around the query builder. The typed sugar
//! on [`ActiveEntity`] is what route handlers and migrations' DML call.

use activerow_core::{
    AttributeCipher, Connection, Cx, Entity, EntityMeta, Error, Outcome, Record, Value,
};
use activerow_query::{Collection, Dialect, Query, try_outcome};
use std::collections::BTreeMap;
use std::sync::Arc;

fn dialect_of<C: Connection>(conn: &C) -> Dialect {
    Dialect::from_driver_name(conn.driver_name())
}

/// Build a query for `meta` with the connection's dialect installed.
#[must_use]
pub fn query_on<C: Connection>(meta: &'static EntityMeta, conn: &C) -> Query {
    Query::new(meta).with_dialect(dialect_of(conn))
}

/// Fetch every row of the entity's table.
pub async fn all<C: Connection>(
    cx: &Cx,
    conn: &C,
    meta: &'static EntityMeta,
) -> Outcome<Collection, Error> {
    query_on(meta, conn).get(cx, conn).await
}

/// Find one record by primary key.
pub async fn find<C: Connection>(
    cx: &Cx,
    conn: &C,
    meta: &'static EntityMeta,
    key: impl Into<Value>,
) -> Outcome<Option<Record>, Error> {
    query_on(meta, conn).find(cx, conn, key).await
}

/// Mass-assign `attrs` onto a fresh record and persist it.
pub async fn create<C: Connection>(
    cx: &Cx,
    conn: &C,
    meta: &'static EntityMeta,
    attrs: impl IntoIterator<Item = (String, Value)>,
) -> Outcome<Record, Error> {
    let mut record = Record::new(meta);
    record.fill(attrs);
    try_outcome!(save(cx, conn, &mut record).await);
    Outcome::Ok(record)
}

/// Find the first record matching `match_attrs` and fill it with
/// `values`, or create one carrying both.
pub async fn update_or_create<C: Connection>(
    cx: &Cx,
    conn: &C,
    meta: &'static EntityMeta,
    match_attrs: BTreeMap<String, Value>,
    values: BTreeMap<String, Value>,
) -> Outcome<Record, Error> {
    let mut q = query_on(meta, conn);
    for (column, value) in &match_attrs {
        q = q.filter(column.clone(), "=", value.clone());
    }

    match try_outcome!(q.first(cx, conn).await) {
        Some(mut record) => {
            record.fill(values);
            try_outcome!(save(cx, conn, &mut record).await);
            Outcome::Ok(record)
        }
        None => {
            let mut merged = match_attrs;
            merged.extend(values);
            create(cx, conn, meta, merged).await
        }
    }
}

/// Delete the rows with the given primary keys; returns affected count.
pub async fn purge<C: Connection>(
    cx: &Cx,
    conn: &C,
    meta: &'static EntityMeta,
    keys: Vec<Value>,
) -> Outcome<u64, Error> {
    if keys.is_empty() {
        return Outcome::Ok(0);
    }
    query_on(meta, conn)
        .in_list(meta.primary_key, keys)
        .delete(cx, conn)
        .await
}

/// Persist the record: INSERT when the primary key is unset, otherwise an
/// UPDATE restricted to dirty, whitelisted fields.
pub async fn save<C: Connection>(cx: &Cx, conn: &C, record: &mut Record) -> Outcome<(), Error> {
    save_with_cipher(cx, conn, record, None).await
}

/// [`save`] with an attribute cipher for entities declaring encrypted
/// columns.
#[tracing::instrument(level = "debug", skip_all, fields(table = record.meta().table))]
pub async fn save_with_cipher<C: Connection>(
    cx: &Cx,
    conn: &C,
    record: &mut Record,
    cipher: Option<Arc<dyn AttributeCipher + Send + Sync>>,
) -> Outcome<(), Error> {
    let meta = record.meta();
    let mut q = query_on(meta, conn);
    if let Some(cipher) = cipher {
        q = q.with_cipher(cipher);
    }

    if record.exists() {
        update_existing(cx, conn, record, q).await
    } else {
        insert_new(cx, conn, record, q).await
    }
}

async fn insert_new<C: Connection>(
    cx: &Cx,
    conn: &C,
    record: &mut Record,
    q: Query,
) -> Outcome<(), Error> {
    let meta = record.meta();
    if let Some(hook) = meta.hooks.before_create {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }

    if meta.timestamps {
        let now = Value::Timestamp(now());
        if record.get("created_at").is_none() {
            record.set("created_at", now.clone());
        }
        if record.get("updated_at").is_none() {
            record.set("updated_at", now);
        }
    }

    let attrs: BTreeMap<String, Value> = record
        .attributes()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let id = try_outcome!(q.insert(cx, conn, attrs).await);

    if record.key().is_none() {
        record.set_key(id);
    }
    record.mark_persisted();
    record.sync_original();

    if let Some(hook) = meta.hooks.after_create {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }
    Outcome::Ok(())
}

async fn update_existing<C: Connection>(
    cx: &Cx,
    conn: &C,
    record: &mut Record,
    q: Query,
) -> Outcome<(), Error> {
    let meta = record.meta();
    if !record.is_dirty() {
        return Outcome::Ok(());
    }
    let Some(key) = record.key().cloned() else {
        return Outcome::Err(Error::invalid_argument(format!(
            "cannot update a '{}' record without a primary key",
            meta.table
        )));
    };

    if let Some(hook) = meta.hooks.before_update {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }

    if meta.timestamps {
        record.set("updated_at", Value::Timestamp(now()));
    }

    // Dirty fields only, restricted to the whitelist (an entity with no
    // whitelist updates any column); timestamps always pass, the key never.
    let attrs: BTreeMap<String, Value> = record
        .dirty()
        .into_iter()
        .filter(|(column, _)| {
            if column == meta.primary_key {
                return false;
            }
            meta.fillable.is_empty()
                || meta.is_fillable(column)
                || (meta.timestamps && (column == "created_at" || column == "updated_at"))
        })
        .collect();
    if attrs.is_empty() {
        return Outcome::Ok(());
    }

    try_outcome!(
        q.filter(meta.primary_key, "=", key)
            .update(cx, conn, attrs)
            .await
    );
    record.sync_original();

    if let Some(hook) = meta.hooks.after_update {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }
    Outcome::Ok(())
}

/// Delete the record's row. The record transitions to its terminal state;
/// a record that never existed is a no-op.
pub async fn delete_record<C: Connection>(
    cx: &Cx,
    conn: &C,
    record: &mut Record,
) -> Outcome<u64, Error> {
    let meta = record.meta();
    if !record.exists() {
        return Outcome::Ok(0);
    }
    let Some(key) = record.key().cloned() else {
        return Outcome::Err(Error::invalid_argument(format!(
            "cannot delete a '{}' record without a primary key",
            meta.table
        )));
    };

    if let Some(hook) = meta.hooks.before_delete {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }

    let affected = try_outcome!(
        query_on(meta, conn)
            .filter(meta.primary_key, "=", key)
            .delete(cx, conn)
            .await
    );
    record.mark_deleted();

    if let Some(hook) = meta.hooks.after_delete {
        if let Err(e) = hook(record) {
            return Outcome::Err(e);
        }
    }
    Outcome::Ok(affected)
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Typed convenience surface over the free functions.
pub trait ActiveEntity: Entity {
    /// A query over this entity's table (MySQL grammar until a dialect is
    /// installed).
    fn query() -> Query {
        Query::new(Self::meta())
    }

    /// A query with the connection's dialect installed.
    fn query_on<C: Connection>(conn: &C) -> Query {
        query_on(Self::meta(), conn)
    }

    /// Fetch all rows.
    fn all<C: Connection>(
        cx: &Cx,
        conn: &C,
    ) -> impl Future<Output = Outcome<Collection, Error>> + Send {
        all(cx, conn, Self::meta())
    }

    /// Find by primary key.
    fn find<C: Connection>(
        cx: &Cx,
        conn: &C,
        key: impl Into<Value> + Send,
    ) -> impl Future<Output = Outcome<Option<Record>, Error>> + Send {
        find(cx, conn, Self::meta(), key)
    }

    /// Create and persist a record from mass-assigned attributes.
    fn create<C: Connection>(
        cx: &Cx,
        conn: &C,
        attrs: BTreeMap<String, Value>,
    ) -> impl Future<Output = Outcome<Record, Error>> + Send {
        create(cx, conn, Self::meta(), attrs)
    }

    /// Update the first match or create a new record.
    fn update_or_create<C: Connection>(
        cx: &Cx,
        conn: &C,
        match_attrs: BTreeMap<String, Value>,
        values: BTreeMap<String, Value>,
    ) -> impl Future<Output = Outcome<Record, Error>> + Send {
        update_or_create(cx, conn, Self::meta(), match_attrs, values)
    }

    /// Delete rows by primary key.
    fn purge<C: Connection>(
        cx: &Cx,
        conn: &C,
        keys: Vec<Value>,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        purge(cx, conn, Self::meta(), keys)
    }
}

impl<E: Entity> ActiveEntity for E {}

use std::future::Future;
