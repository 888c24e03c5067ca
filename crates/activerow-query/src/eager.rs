//! The relationship engine: batched eager loading, relation counts,
//! existence subqueries, and per-record scoped builders.
//!
//! Eager loading issues exactly one query per relation level regardless of
//! parent-collection size: collect the distinct parent keys, fetch the
//! related rows with a single `IN` (or pivot-joined) query, group them by
//! foreign key, and hand each parent its slice. Nested paths re-enter the
//! same batching with the loaded level as the new parent set.

use crate::builder::{EmbedSpec, PivotBinding, Query};
use crate::clause::{ConditionKind, collect_bindings, render_conditions};
use crate::grammar::Dialect;
use crate::try_outcome;
use activerow_core::{
    AttributeCipher, Connection, Cx, EntityMeta, Error, Outcome, Record, RelationDef,
    RelationKind, RelationValue, Value, find_relation,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A canonical grouping key for a value, used to bucket related rows by
/// foreign key. Values group by representation, not SQL-level equality.
fn binding_key(value: &Value) -> String {
    format!("{value:?}")
}

/// The column on the parent whose values key the batch for `rel`.
fn parent_key_column(rel: &RelationDef) -> &'static str {
    match rel.kind {
        RelationKind::BelongsTo => rel.foreign_key,
        _ => rel.local_key,
    }
}

/// Distinct, non-null key values across `records`, in first-seen order.
fn distinct_keys(records: &[Record], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in records {
        if let Some(value) = record.get(column) {
            if !value.is_null() && seen.insert(binding_key(value)) {
                keys.push(value.clone());
            }
        }
    }
    keys
}

fn empty_slot(rel: &RelationDef) -> RelationValue {
    if rel.is_single() {
        RelationValue::One(None)
    } else {
        RelationValue::Many(Vec::new())
    }
}

/// Load the eager-load directives onto `records`, one batched query per
/// relation level.
///
/// Boxed because nested paths recurse through `Query::get`.
pub fn load_embedded<'a, C: Connection>(
    cx: &'a Cx,
    conn: &'a C,
    records: &'a mut Vec<Record>,
    specs: &'a [EmbedSpec],
    meta: &'static EntityMeta,
    dialect: Dialect,
    cipher: Option<Arc<dyn AttributeCipher + Send + Sync>>,
) -> Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>> {
    Box::pin(async move {
        if records.is_empty() {
            return Outcome::Ok(());
        }

        for spec in specs {
            let (head, rest) = match spec.path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (spec.path.as_str(), None),
            };
            let Some(rel) = find_relation(meta, head) else {
                return Outcome::Err(Error::unresolved(meta.table, spec.path.clone()));
            };
            let related_meta = (rel.related)();
            let parent_col = parent_key_column(rel);
            let keys = distinct_keys(records, parent_col);

            if keys.is_empty() {
                for record in records.iter_mut() {
                    record.set_relation(rel.name, empty_slot(rel));
                }
                continue;
            }

            let mut q = Query::new(related_meta).with_dialect(dialect);
            if let Some(cipher) = cipher.clone() {
                q = q.with_cipher(cipher);
            }
            q = match rel.kind {
                RelationKind::HasOne | RelationKind::HasMany => {
                    q.in_list(rel.foreign_key, keys.clone())
                }
                RelationKind::BelongsTo => q.in_list(rel.local_key, keys.clone()),
                RelationKind::BelongsToMany => {
                    let Some(pivot) = rel.pivot_table else {
                        return Outcome::Err(Error::invalid_argument(format!(
                            "relation '{}' declared without a pivot table",
                            rel.name
                        )));
                    };
                    let related_key = rel.related_key.unwrap_or(related_meta.primary_key);
                    q.add_select(format!("{}.*", related_meta.table))
                        .add_select(format!(
                            "{pivot}.{} AS pivot_{}",
                            rel.foreign_key, rel.foreign_key
                        ))
                        .add_select(format!("{pivot}.{related_key} AS pivot_{related_key}"))
                        .join(
                            pivot,
                            format!("{pivot}.{related_key}"),
                            "=",
                            format!("{}.{}", related_meta.table, related_meta.primary_key),
                        )
                        .in_list(format!("{pivot}.{}", rel.foreign_key), keys.clone())
                }
            };

            // A constraint on a nested path applies to the final segment.
            let (constraint_here, constraint_down) = if rest.is_some() {
                (None, spec.constraint.clone())
            } else {
                (spec.constraint.clone(), None)
            };
            if let Some(constraint) = &constraint_here {
                q = constraint(q);
            }

            tracing::debug!(
                relation = rel.name,
                parents = records.len(),
                keys = keys.len(),
                "batch loading relation"
            );
            let mut related = try_outcome!(q.get(cx, conn).await).into_records();

            if let Some(rest) = rest {
                let nested = EmbedSpec {
                    path: rest.to_string(),
                    constraint: constraint_down,
                };
                try_outcome!(
                    load_embedded(
                        cx,
                        conn,
                        &mut related,
                        std::slice::from_ref(&nested),
                        related_meta,
                        dialect,
                        cipher.clone(),
                    )
                    .await
                );
            }

            let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
            for record in related {
                let key = match rel.kind {
                    RelationKind::BelongsToMany => record
                        .pivot()
                        .and_then(|p| p.get(rel.foreign_key))
                        .map(binding_key),
                    RelationKind::BelongsTo => record.get(rel.local_key).map(binding_key),
                    _ => record.get(rel.foreign_key).map(binding_key),
                };
                if let Some(key) = key {
                    buckets.entry(key).or_default().push(record);
                }
            }

            for parent in records.iter_mut() {
                let bucket = parent
                    .get(parent_col)
                    .filter(|v| !v.is_null())
                    .map(binding_key)
                    .and_then(|k| buckets.get(&k));
                let value = if rel.is_single() {
                    RelationValue::One(bucket.and_then(|b| b.first().cloned()).map(Box::new))
                } else {
                    RelationValue::Many(bucket.cloned().unwrap_or_default())
                };
                parent.set_relation(rel.name, value);
            }
        }

        Outcome::Ok(())
    })
}

/// Attach `<relation>_count` attributes via one grouped aggregate query
/// per relation, using the same key-batching as eager loading.
pub async fn load_counts<C: Connection>(
    cx: &Cx,
    conn: &C,
    records: &mut Vec<Record>,
    relations: &[String],
    meta: &'static EntityMeta,
) -> Outcome<(), Error> {
    if records.is_empty() {
        return Outcome::Ok(());
    }

    for name in relations {
        let Some(rel) = find_relation(meta, name) else {
            return Outcome::Err(Error::unresolved(meta.table, name.clone()));
        };
        let related_meta = (rel.related)();
        let parent_col = parent_key_column(rel);
        let attr = format!("{}_count", rel.name);
        let keys = distinct_keys(records, parent_col);

        if keys.is_empty() {
            for record in records.iter_mut() {
                record.set(attr.clone(), Value::Int(0));
            }
            continue;
        }

        let q = match rel.kind {
            RelationKind::HasOne | RelationKind::HasMany => Query::new(related_meta)
                .add_select(format!("{} AS group_key", rel.foreign_key))
                .add_select("COUNT(*) AS aggregate")
                .in_list(rel.foreign_key, keys.clone())
                .group_by(&[rel.foreign_key]),
            RelationKind::BelongsTo => Query::new(related_meta)
                .add_select(format!("{} AS group_key", rel.local_key))
                .add_select("COUNT(*) AS aggregate")
                .in_list(rel.local_key, keys.clone())
                .group_by(&[rel.local_key]),
            RelationKind::BelongsToMany => {
                let Some(pivot) = rel.pivot_table else {
                    return Outcome::Err(Error::invalid_argument(format!(
                        "relation '{}' declared without a pivot table",
                        rel.name
                    )));
                };
                let related_key = rel.related_key.unwrap_or(related_meta.primary_key);
                let fk = format!("{pivot}.{}", rel.foreign_key);
                Query::new(related_meta)
                    .add_select(format!("{fk} AS group_key"))
                    .add_select("COUNT(*) AS aggregate")
                    .join(
                        pivot,
                        format!("{pivot}.{related_key}"),
                        "=",
                        format!("{}.{}", related_meta.table, related_meta.primary_key),
                    )
                    .in_list(fk.clone(), keys.clone())
                    .group_by(&[fk.as_str()])
            }
        };

        let rows = try_outcome!(conn.query(cx, &q.to_sql(), &q.bind_values()).await);
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in &rows {
            let key = row.get_by_name("group_key").map(binding_key);
            let count = row
                .get_by_name("aggregate")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if let Some(key) = key {
                counts.insert(key, count);
            }
        }

        for record in records.iter_mut() {
            let count = record
                .get(parent_col)
                .filter(|v| !v.is_null())
                .map(binding_key)
                .and_then(|k| counts.get(&k).copied())
                .unwrap_or(0);
            record.set(attr.clone(), Value::Int(count));
        }
    }

    Outcome::Ok(())
}

/// Compile an existence filter into a correlated EXISTS condition.
///
/// The caller's constraint runs against a builder scoped to the related
/// table, so its conditions render inside the subquery.
pub fn exists_condition(
    meta: &'static EntityMeta,
    relation: &str,
    constraint: Option<&dyn Fn(Query) -> Query>,
    dialect: Dialect,
    negated: bool,
) -> Result<ConditionKind, Error> {
    let rel =
        find_relation(meta, relation).ok_or_else(|| Error::unresolved(meta.table, relation))?;
    let related_meta = (rel.related)();
    let related_table = related_meta.table;
    let parent_table = meta.table;

    let mut subquery = match rel.kind {
        RelationKind::HasOne | RelationKind::HasMany => format!(
            "SELECT 1 FROM {related_table} WHERE {related_table}.{} = {parent_table}.{}",
            rel.foreign_key, rel.local_key
        ),
        RelationKind::BelongsTo => format!(
            "SELECT 1 FROM {related_table} WHERE {related_table}.{} = {parent_table}.{}",
            rel.local_key, rel.foreign_key
        ),
        RelationKind::BelongsToMany => {
            let Some(pivot) = rel.pivot_table else {
                return Err(Error::invalid_argument(format!(
                    "relation '{}' declared without a pivot table",
                    rel.name
                )));
            };
            let related_key = rel.related_key.unwrap_or(related_meta.primary_key);
            format!(
                "SELECT 1 FROM {pivot} INNER JOIN {related_table} \
                 ON {pivot}.{related_key} = {related_table}.{} \
                 WHERE {pivot}.{} = {parent_table}.{}",
                related_meta.primary_key, rel.foreign_key, rel.local_key
            )
        }
    };

    let mut bindings = Vec::new();
    if let Some(constraint) = constraint {
        let sub = constraint(Query::new(related_meta).with_dialect(dialect));
        if !sub.wheres().is_empty() {
            subquery.push_str(" AND (");
            subquery.push_str(&render_conditions(sub.wheres()));
            subquery.push(')');
            collect_bindings(sub.wheres(), &mut bindings);
        }
    }

    Ok(ConditionKind::Exists {
        subquery,
        bindings,
        negated,
    })
}

/// Build the pre-scoped builder a record's relation resolves to.
///
/// Direct (non-eager) relationship access goes through this query, which
/// is filtered to the parent record's key (pivot-joined for many-to-many,
/// with the pivot binding attached).
pub fn relation_query(parent: &Record, name: &str, dialect: Dialect) -> Result<Query, Error> {
    let meta = parent.meta();
    let rel = find_relation(meta, name).ok_or_else(|| Error::unresolved(meta.table, name))?;
    let related_meta = (rel.related)();

    let query = match rel.kind {
        RelationKind::HasOne | RelationKind::HasMany => {
            let key = parent.get(rel.local_key).cloned().unwrap_or(Value::Null);
            Query::new(related_meta)
                .with_dialect(dialect)
                .filter(rel.foreign_key, "=", key)
        }
        RelationKind::BelongsTo => {
            let key = parent.get(rel.foreign_key).cloned().unwrap_or(Value::Null);
            Query::new(related_meta)
                .with_dialect(dialect)
                .filter(rel.local_key, "=", key)
        }
        RelationKind::BelongsToMany => {
            let Some(pivot) = rel.pivot_table else {
                return Err(Error::invalid_argument(format!(
                    "relation '{}' declared without a pivot table",
                    rel.name
                )));
            };
            let related_key = rel.related_key.unwrap_or(related_meta.primary_key);
            let key = parent.get(rel.local_key).cloned().unwrap_or(Value::Null);
            Query::new(related_meta)
                .with_dialect(dialect)
                .add_select(format!("{}.*", related_meta.table))
                .add_select(format!(
                    "{pivot}.{} AS pivot_{}",
                    rel.foreign_key, rel.foreign_key
                ))
                .add_select(format!("{pivot}.{related_key} AS pivot_{related_key}"))
                .join(
                    pivot,
                    format!("{pivot}.{related_key}"),
                    "=",
                    format!("{}.{}", related_meta.table, related_meta.primary_key),
                )
                .filter(format!("{pivot}.{}", rel.foreign_key), "=", key.clone())
                .with_pivot(PivotBinding {
                    pivot_table: pivot,
                    foreign_pivot_key: rel.foreign_key,
                    related_pivot_key: related_key,
                    parent_key: key,
                })
        }
    };

    Ok(query)
}
