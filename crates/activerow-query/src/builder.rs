//! The fluent query builder.
//!
//! A `Query` is constructed per statement, cheap to clone (nested groups,
//! relationship subqueries and chunked traversal all branch by cloning),
//! and renders its SQL and bindings on demand, never caching across
//! mutation. Execution methods borrow the builder and take the shared
//! connection handle per call.

use crate::clause::{ConditionClause, ConditionKind, collect_bindings, render_conditions};
use crate::collection::Collection;
use crate::eager;
use crate::grammar::{DatePart, Dialect};
use crate::join::{JoinClause, JoinKind};
use crate::paginate::Page;
use crate::try_outcome;
use activerow_core::{
    AttributeCipher, Connection, Cx, EntityMeta, Error, Outcome, Record, Value,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A caller-supplied constraint applied to a relationship query.
pub type Constraint = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// One eager-load directive: a relation path plus an optional constraint.
///
/// For nested paths (`"posts.comments"`) the constraint applies to the
/// final segment.
#[derive(Clone)]
pub struct EmbedSpec {
    pub path: String,
    pub constraint: Option<Constraint>,
}

impl fmt::Debug for EmbedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedSpec")
            .field("path", &self.path)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

/// The relationship binding carried by a builder that represents a
/// many-to-many collection: pivot table, pivot keys, and the parent key
/// the collection is scoped to.
#[derive(Debug, Clone)]
pub struct PivotBinding {
    pub pivot_table: &'static str,
    pub foreign_pivot_key: &'static str,
    pub related_pivot_key: &'static str,
    pub parent_key: Value,
}

/// One ORDER BY term.
#[derive(Debug, Clone)]
pub enum OrderTerm {
    /// Column with direction.
    Column { column: String, descending: bool },
    /// Raw expression, rendered verbatim.
    Raw(String),
}

/// The stateful, chainable query object.
#[derive(Clone)]
pub struct Query {
    meta: &'static EntityMeta,
    dialect: Dialect,
    columns: Vec<String>,
    distinct: bool,
    wheres: Vec<ConditionClause>,
    havings: Vec<ConditionClause>,
    joins: Vec<JoinClause>,
    groups: Vec<String>,
    orders: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    embeds: Vec<EmbedSpec>,
    embed_counts: Vec<String>,
    pivot: Option<PivotBinding>,
    cipher: Option<Arc<dyn AttributeCipher + Send + Sync>>,
}

impl Query {
    /// Create a query over the given entity's table.
    ///
    /// The dialect defaults to MySQL grammar until
    /// [`with_dialect`](Query::with_dialect) installs the connection's.
    #[must_use]
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self {
            meta,
            dialect: Dialect::default(),
            columns: Vec::new(),
            distinct: false,
            wheres: Vec::new(),
            havings: Vec::new(),
            joins: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            embeds: Vec::new(),
            embed_counts: Vec::new(),
            pivot: None,
            cipher: None,
        }
    }

    /// The entity metadata this query is built over.
    #[must_use]
    pub const fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    /// The active dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Install the dialect (usually resolved from the connection's driver
    /// name). Grammar-backed clauses added afterwards use it.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Install the attribute cipher used when materializing and
    /// persisting encrypted columns.
    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn AttributeCipher + Send + Sync>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// The many-to-many binding, when this builder represents a pivot
    /// collection.
    #[must_use]
    pub fn pivot_binding(&self) -> Option<&PivotBinding> {
        self.pivot.as_ref()
    }

    pub(crate) fn with_pivot(mut self, binding: PivotBinding) -> Self {
        self.pivot = Some(binding);
        self
    }

    pub(crate) fn cipher_arc(&self) -> Option<Arc<dyn AttributeCipher + Send + Sync>> {
        self.cipher.clone()
    }

    fn cipher_ref(&self) -> Option<&dyn AttributeCipher> {
        self.cipher
            .as_deref()
            .map(|c| c as &dyn AttributeCipher)
    }

    // ==================== Projection ====================

    /// Select specific columns (default: all).
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|&c| c.to_string()).collect();
        self
    }

    /// Append one select expression.
    #[must_use]
    pub fn add_select(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Make this a DISTINCT query.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== Conditions ====================

    pub(crate) fn push_where(mut self, clause: ConditionClause) -> Self {
        self.wheres.push(clause);
        self
    }

    /// The current WHERE clause list.
    #[must_use]
    pub fn wheres(&self) -> &[ConditionClause] {
        &self.wheres
    }

    /// Add a binary comparison joined with AND.
    #[must_use]
    pub fn filter(
        self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Compare {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }))
    }

    /// Add a binary comparison joined with OR.
    #[must_use]
    pub fn or_filter(
        self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.push_where(ConditionClause::or(ConditionKind::Compare {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }))
    }

    /// `column BETWEEN low AND high`.
    #[must_use]
    pub fn between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }))
    }

    /// `column NOT BETWEEN low AND high`.
    #[must_use]
    pub fn not_between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            negated: true,
        }))
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Null {
            column: column.into(),
            negated: false,
        }))
    }

    /// `column IS NOT NULL`.
    #[must_use]
    pub fn not_null(self, column: impl Into<String>) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Null {
            column: column.into(),
            negated: true,
        }))
    }

    /// `column IN (values)`. An empty list matches nothing.
    #[must_use]
    pub fn in_list(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::In {
            column: column.into(),
            values,
            negated: false,
        }))
    }

    /// `column NOT IN (values)`. An empty list matches everything.
    #[must_use]
    pub fn not_in_list(self, column: impl Into<String>, values: Vec<Value>) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::In {
            column: column.into(),
            values,
            negated: true,
        }))
    }

    /// Add a raw SQL fragment with its bindings.
    #[must_use]
    pub fn raw_filter(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(ConditionClause::and(ConditionKind::Raw {
            sql: sql.into(),
            bindings,
        }))
    }

    /// Add a parenthesized group built on a fresh sub-builder, AND-joined.
    #[must_use]
    pub fn group(self, f: impl FnOnce(Query) -> Query) -> Self {
        let sub = f(Query::new(self.meta).with_dialect(self.dialect));
        if sub.wheres.is_empty() {
            return self;
        }
        self.push_where(ConditionClause::and(ConditionKind::Group(sub.wheres)))
    }

    /// Add a parenthesized group built on a fresh sub-builder, OR-joined.
    #[must_use]
    pub fn or_group(self, f: impl FnOnce(Query) -> Query) -> Self {
        let sub = f(Query::new(self.meta).with_dialect(self.dialect));
        if sub.wheres.is_empty() {
            return self;
        }
        self.push_where(ConditionClause::or(ConditionKind::Group(sub.wheres)))
    }

    // ==================== Grammar-backed conditions ====================

    /// Compare a date component of `column` (dialect-specific extraction).
    #[must_use]
    pub fn filter_date_part(
        self,
        part: DatePart,
        column: &str,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let expr = self.dialect.date_part(column, part);
        let operator = operator.into();
        let binding = value.into();
        self.push_where(ConditionClause::and(ConditionKind::Raw {
            sql: format!("{expr} {operator} ?"),
            bindings: vec![binding],
        }))
    }

    /// JSON containment test against `column` at `path`.
    #[must_use]
    pub fn filter_json_contains(
        self,
        column: &str,
        path: &str,
        value: &serde_json::Value,
    ) -> Self {
        let (sql, bindings) = self.dialect.json_contains(column, path, value);
        self.push_where(ConditionClause::and(ConditionKind::Raw { sql, bindings }))
    }

    /// Case-insensitive LIKE (dialect-correct operator).
    #[must_use]
    pub fn filter_ci_like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        let operator = self.dialect.ci_like_operator().to_string();
        self.push_where(ConditionClause::and(ConditionKind::Compare {
            column: column.into(),
            operator,
            value: Value::Text(pattern.into()),
        }))
    }

    // ==================== Relationship existence ====================

    /// Keep rows having at least one related row.
    pub fn present(self, relation: &str) -> Result<Self, Error> {
        let kind = eager::exists_condition(self.meta, relation, None, self.dialect, false)?;
        Ok(self.push_where(ConditionClause::and(kind)))
    }

    /// Keep rows having no related row.
    pub fn absent(self, relation: &str) -> Result<Self, Error> {
        let kind = eager::exists_condition(self.meta, relation, None, self.dialect, true)?;
        Ok(self.push_where(ConditionClause::and(kind)))
    }

    /// OR-joined variant of [`present`](Query::present).
    pub fn or_present(self, relation: &str) -> Result<Self, Error> {
        let kind = eager::exists_condition(self.meta, relation, None, self.dialect, false)?;
        Ok(self.push_where(ConditionClause::or(kind)))
    }

    /// OR-joined variant of [`absent`](Query::absent).
    pub fn or_absent(self, relation: &str) -> Result<Self, Error> {
        let kind = eager::exists_condition(self.meta, relation, None, self.dialect, true)?;
        Ok(self.push_where(ConditionClause::or(kind)))
    }

    /// Keep rows whose related rows satisfy the constraint.
    pub fn linked(
        self,
        relation: &str,
        constraint: impl Fn(Query) -> Query,
    ) -> Result<Self, Error> {
        let kind =
            eager::exists_condition(self.meta, relation, Some(&constraint), self.dialect, false)?;
        Ok(self.push_where(ConditionClause::and(kind)))
    }

    // ==================== Joins / grouping / ordering ====================

    /// Add an INNER JOIN.
    #[must_use]
    pub fn join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_kind(JoinKind::Inner, table, left, operator, right)
    }

    /// Add a LEFT JOIN.
    #[must_use]
    pub fn left_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_kind(JoinKind::Left, table, left, operator, right)
    }

    /// Add a RIGHT JOIN.
    #[must_use]
    pub fn right_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.join_kind(JoinKind::Right, table, left, operator, right)
    }

    fn join_kind(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.joins
            .push(JoinClause::new(kind, table, left, operator, right));
        self
    }

    /// Add GROUP BY columns.
    #[must_use]
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.groups.extend(columns.iter().map(|&c| c.to_string()));
        self
    }

    /// Add a HAVING comparison.
    #[must_use]
    pub fn having(
        mut self,
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.havings
            .push(ConditionClause::and(ConditionKind::Compare {
                column: column.into(),
                operator: operator.into(),
                value: value.into(),
            }));
        self
    }

    /// Order ascending by `column`.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderTerm::Column {
            column: column.into(),
            descending: false,
        });
        self
    }

    /// Order descending by `column`.
    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.orders.push(OrderTerm::Column {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// Order by a raw expression, rendered verbatim.
    #[must_use]
    pub fn order_by_raw(mut self, expr: impl Into<String>) -> Self {
        self.orders.push(OrderTerm::Raw(expr.into()));
        self
    }

    /// Order randomly (dialect-specific expression).
    #[must_use]
    pub fn in_random_order(self) -> Self {
        let expr = self.dialect.random_order().to_string();
        self.order_by_raw(expr)
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set OFFSET.
    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    // ==================== Eager directives ====================

    /// Eager-load a relation path (`"posts"` or `"posts.comments"`).
    #[must_use]
    pub fn embed(mut self, path: impl Into<String>) -> Self {
        self.embeds.push(EmbedSpec {
            path: path.into(),
            constraint: None,
        });
        self
    }

    /// Eager-load a relation path, constraining the final segment.
    #[must_use]
    pub fn embed_with(
        mut self,
        path: impl Into<String>,
        constraint: impl Fn(Query) -> Query + Send + Sync + 'static,
    ) -> Self {
        self.embeds.push(EmbedSpec {
            path: path.into(),
            constraint: Some(Arc::new(constraint)),
        });
        self
    }

    /// Attach a `<relation>_count` attribute via one aggregate query.
    #[must_use]
    pub fn embed_count(mut self, relation: impl Into<String>) -> Self {
        self.embed_counts.push(relation.into());
        self
    }

    // ==================== Rendering ====================

    /// Render this query to SQL text.
    ///
    /// Placeholder order matches [`bind_values`](Query::bind_values)
    /// exactly; the two passes traverse the clause lists identically.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        sql.push_str(&self.render_columns());
        sql.push_str(" FROM ");
        sql.push_str(self.meta.table);

        for join in &self.joins {
            sql.push_str(&join.render());
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.wheres));
        }

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if !self.havings.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&render_conditions(&self.havings));
        }

        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            let terms: Vec<String> = self
                .orders
                .iter()
                .map(|term| match term {
                    OrderTerm::Column { column, descending } => {
                        format!("{column} {}", if *descending { "DESC" } else { "ASC" })
                    }
                    OrderTerm::Raw(expr) => expr.clone(),
                })
                .collect();
            sql.push_str(&terms.join(", "));
        }

        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(n) = self.offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }

        sql
    }

    /// Collect positional bindings in rendering order.
    #[must_use]
    pub fn bind_values(&self) -> Vec<Value> {
        let mut bindings = Vec::new();
        collect_bindings(&self.wheres, &mut bindings);
        collect_bindings(&self.havings, &mut bindings);
        bindings
    }

    /// Render SQL plus bindings for human inspection.
    #[must_use]
    pub fn debug(&self) -> String {
        format!("{} | bindings: {:?}", self.to_sql(), self.bind_values())
    }

    fn render_columns(&self) -> String {
        if !self.columns.is_empty() {
            return self.columns.join(", ");
        }
        if self.groups.is_empty() {
            return "*".to_string();
        }
        // Strict grouping rules: expand * and wrap non-grouped columns in
        // an aggregate so every selected column is grouping-valid.
        self.meta
            .columns
            .iter()
            .map(|c| {
                if self.groups.iter().any(|g| g == c) {
                    (*c).to_string()
                } else {
                    format!("MAX({c}) AS {c}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ==================== Execution ====================

    /// Execute the SELECT and materialize rows into records, then run any
    /// eager-load directives (one batched query per relation level).
    #[tracing::instrument(level = "debug", skip(self, cx, conn), fields(table = self.meta.table))]
    pub async fn get<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Collection, Error> {
        let sql = self.to_sql();
        let params = self.bind_values();
        tracing::trace!(sql = %sql, bindings = params.len(), "executing select");

        let rows = try_outcome!(conn.query(cx, &sql, &params).await);
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match Record::from_row(self.meta, row, self.cipher_ref()) {
                Ok(record) => records.push(record),
                Err(e) => return Outcome::Err(e),
            }
        }
        drop(rows);

        if !self.embeds.is_empty() {
            try_outcome!(
                eager::load_embedded(
                    cx,
                    conn,
                    &mut records,
                    &self.embeds,
                    self.meta,
                    self.dialect,
                    self.cipher_arc(),
                )
                .await
            );
        }
        if !self.embed_counts.is_empty() {
            try_outcome!(
                eager::load_counts(cx, conn, &mut records, &self.embed_counts, self.meta).await
            );
        }

        Outcome::Ok(Collection::new(records))
    }

    /// Execute with `LIMIT 1` and return the first record, if any.
    pub async fn first<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Option<Record>, Error> {
        let collection = try_outcome!(self.clone().limit(1).get(cx, conn).await);
        Outcome::Ok(collection.into_records().into_iter().next())
    }

    /// Find one record by primary key.
    pub async fn find<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key: impl Into<Value>,
    ) -> Outcome<Option<Record>, Error> {
        self.clone()
            .filter(self.meta.primary_key, "=", key)
            .first(cx, conn)
            .await
    }

    /// Count matching rows.
    ///
    /// A grouped query is wrapped as a derived table and its rows counted:
    /// counting the grouped result directly would return one count per
    /// group instead of the number of groups.
    pub async fn count<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        self.count_column(cx, conn, "*").await
    }

    /// Count distinct values of `column`, which must exist on the table.
    pub async fn count_distinct<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<u64, Error> {
        if !self.meta.has_column(column) {
            return Outcome::Err(Error::invalid_argument(format!(
                "unknown column '{column}' on table '{}'",
                self.meta.table
            )));
        }
        self.count_column(cx, conn, &format!("DISTINCT {column}"))
            .await
    }

    async fn count_column<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<u64, Error> {
        let mut q = self.clone();
        q.orders.clear();
        q.limit = None;
        q.offset = None;
        q.embeds.clear();
        q.embed_counts.clear();

        let (sql, params) = if q.groups.is_empty() {
            q.columns = vec![format!("COUNT({column}) AS aggregate")];
            (q.to_sql(), q.bind_values())
        } else {
            let params = q.bind_values();
            (
                format!(
                    "SELECT COUNT(*) AS aggregate FROM ({}) AS grouped_set",
                    q.to_sql()
                ),
                params,
            )
        };

        let row = try_outcome!(conn.query_one(cx, &sql, &params).await);
        let count = row
            .and_then(|r| r.get_by_name("aggregate").and_then(Value::as_i64))
            .unwrap_or(0);
        Outcome::Ok(count.max(0) as u64)
    }

    async fn aggregate<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        expr: String,
    ) -> Outcome<Option<Value>, Error> {
        let mut q = self.clone();
        q.orders.clear();
        q.limit = None;
        q.offset = None;
        q.embeds.clear();
        q.embed_counts.clear();
        q.columns = vec![format!("{expr} AS aggregate")];

        let row = try_outcome!(conn.query_one(cx, &q.to_sql(), &q.bind_values()).await);
        Outcome::Ok(
            row.and_then(|r| r.get_by_name("aggregate").cloned())
                .filter(|v| !v.is_null()),
        )
    }

    /// Sum of `column` over matching rows; 0 when no rows match.
    pub async fn sum<C: Connection>(&self, cx: &Cx, conn: &C, column: &str) -> Outcome<Value, Error> {
        let value = try_outcome!(self.aggregate(cx, conn, format!("SUM({column})")).await);
        Outcome::Ok(value.unwrap_or(Value::Int(0)))
    }

    /// Minimum of `column` over matching rows.
    pub async fn min<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Option<Value>, Error> {
        self.aggregate(cx, conn, format!("MIN({column})")).await
    }

    /// Maximum of `column` over matching rows.
    pub async fn max<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Option<Value>, Error> {
        self.aggregate(cx, conn, format!("MAX({column})")).await
    }

    /// Average of `column` over matching rows.
    pub async fn avg<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Option<Value>, Error> {
        self.aggregate(cx, conn, format!("AVG({column})")).await
    }

    /// Population standard deviation of `column` (dialect-specific).
    pub async fn std_dev<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Option<Value>, Error> {
        let expr = self.dialect.std_dev(column);
        self.aggregate(cx, conn, expr).await
    }

    /// Whether any row matches.
    pub async fn exists<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<bool, Error> {
        let mut q = self.clone();
        q.columns = vec!["1".to_string()];
        q.orders.clear();
        q.limit = Some(1);
        q.embeds.clear();
        q.embed_counts.clear();
        let row = try_outcome!(conn.query_one(cx, &q.to_sql(), &q.bind_values()).await);
        Outcome::Ok(row.is_some())
    }

    /// Collect one column's values from matching rows.
    pub async fn pluck<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
    ) -> Outcome<Vec<Value>, Error> {
        let mut q = self.clone();
        q.columns = vec![column.to_string()];
        q.embeds.clear();
        q.embed_counts.clear();
        let rows = try_outcome!(conn.query(cx, &q.to_sql(), &q.bind_values()).await);
        let values = rows
            .iter()
            .map(|row| row.get_by_name(column).or_else(|| row.get(0)).cloned().unwrap_or(Value::Null))
            .collect();
        Outcome::Ok(values)
    }

    // ==================== Writes ====================

    /// Insert one row and return the last inserted id.
    pub async fn insert<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        mut attrs: BTreeMap<String, Value>,
    ) -> Outcome<i64, Error> {
        self.stamp_timestamps(&mut attrs, true);
        self.encrypt_attrs(&mut attrs);

        let columns: Vec<&str> = attrs.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.meta.table,
            columns.join(", ")
        );
        let params: Vec<Value> = attrs.values().cloned().collect();
        conn.insert(cx, &sql, &params).await
    }

    /// Insert many rows in fixed-size batches; returns total affected.
    ///
    /// Empty input returns 0 without touching the connection. Rows with
    /// differing column sets fail fast.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, rows), fields(table = self.meta.table))]
    pub async fn insert_many<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        rows: Vec<BTreeMap<String, Value>>,
        chunk_size: usize,
    ) -> Outcome<u64, Error> {
        if rows.is_empty() {
            return Outcome::Ok(0);
        }
        if chunk_size == 0 {
            return Outcome::Err(Error::invalid_argument("chunk size must be positive"));
        }
        let rows = match self.normalize_rows(rows) {
            Ok(rows) => rows,
            Err(e) => return Outcome::Err(e),
        };
        let columns: Vec<String> = rows[0].keys().cloned().collect();

        let mut total = 0_u64;
        for chunk in rows.chunks(chunk_size) {
            let row_sql = format!("({})", vec!["?"; columns.len()].join(", "));
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.meta.table,
                columns.join(", "),
                vec![row_sql; chunk.len()].join(", ")
            );
            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.values().cloned())
                .collect();
            total += try_outcome!(conn.execute(cx, &sql, &params).await);
        }
        tracing::debug!(rows = total, "insert_many complete");
        Outcome::Ok(total)
    }

    /// Update matching rows; returns affected count.
    pub async fn update<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        mut attrs: BTreeMap<String, Value>,
    ) -> Outcome<u64, Error> {
        if attrs.is_empty() {
            return Outcome::Ok(0);
        }
        self.stamp_timestamps(&mut attrs, false);
        self.encrypt_attrs(&mut attrs);

        let assignments: Vec<String> = attrs.keys().map(|c| format!("{c} = ?")).collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.meta.table,
            assignments.join(", ")
        );
        let mut params: Vec<Value> = attrs.values().cloned().collect();
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.wheres));
            collect_bindings(&self.wheres, &mut params);
        }
        conn.execute(cx, &sql, &params).await
    }

    /// Add `amount` to `column` on matching rows; returns affected count.
    pub async fn increment<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
        amount: i64,
    ) -> Outcome<u64, Error> {
        self.adjust(cx, conn, column, '+', amount).await
    }

    /// Subtract `amount` from `column` on matching rows.
    pub async fn decrement<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
        amount: i64,
    ) -> Outcome<u64, Error> {
        self.adjust(cx, conn, column, '-', amount).await
    }

    async fn adjust<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        column: &str,
        op: char,
        amount: i64,
    ) -> Outcome<u64, Error> {
        if !self.meta.has_column(column) {
            return Outcome::Err(Error::invalid_argument(format!(
                "unknown column '{column}' on table '{}'",
                self.meta.table
            )));
        }
        let mut sql = format!(
            "UPDATE {} SET {column} = {column} {op} ?",
            self.meta.table
        );
        let mut params = vec![Value::Int(amount)];
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.wheres));
            collect_bindings(&self.wheres, &mut params);
        }
        conn.execute(cx, &sql, &params).await
    }

    /// Delete matching rows; returns affected count.
    pub async fn delete<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let mut sql = format!("DELETE FROM {}", self.meta.table);
        let mut params = Vec::new();
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.wheres));
            collect_bindings(&self.wheres, &mut params);
        }
        conn.execute(cx, &sql, &params).await
    }

    /// Multi-row insert with a dialect-specific conflict clause.
    ///
    /// Returns the number of logically affected rows: MySQL natively
    /// reports 2 per updated row, which is normalized to 1 per row.
    #[tracing::instrument(level = "debug", skip(self, cx, conn, rows), fields(table = self.meta.table))]
    pub async fn upsert<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        rows: Vec<BTreeMap<String, Value>>,
        unique_by: &[&str],
        update_columns: Option<&[&str]>,
        ignore_errors: bool,
    ) -> Outcome<u64, Error> {
        if rows.is_empty() {
            return Outcome::Ok(0);
        }
        if unique_by.is_empty() {
            return Outcome::Err(Error::invalid_argument(
                "upsert requires at least one unique-by column",
            ));
        }
        if !self.dialect.supports_upsert() {
            return Outcome::Err(Error::Custom(format!(
                "driver '{}' does not support upsert",
                self.dialect.driver_name()
            )));
        }

        let mut rows = match self.normalize_rows(rows) {
            Ok(rows) => rows,
            Err(e) => return Outcome::Err(e),
        };
        if self.meta.timestamps {
            for row in &mut rows {
                self.stamp_timestamps(row, true);
            }
        }
        for row in &mut rows {
            self.encrypt_attrs(row);
        }

        let columns: Vec<String> = rows[0].keys().cloned().collect();
        let update_columns: Vec<String> = match update_columns {
            Some(cols) => cols.iter().map(|&c| c.to_string()).collect(),
            // Default: everything except the conflict target and the
            // creation timestamp.
            None => columns
                .iter()
                .filter(|c| !unique_by.contains(&c.as_str()) && *c != "created_at")
                .cloned()
                .collect(),
        };

        let sql = self.dialect.upsert(
            self.meta.table,
            &columns,
            rows.len(),
            unique_by,
            &update_columns,
            ignore_errors,
        );
        let params: Vec<Value> = rows
            .iter()
            .flat_map(|row| row.values().cloned())
            .collect();

        let mut affected = try_outcome!(conn.execute(cx, &sql, &params).await);
        let processed = rows.len() as u64;
        if self.dialect.reports_doubled_update_count() && affected > processed {
            tracing::warn!(
                native = affected,
                normalized = processed,
                "normalizing doubled upsert count"
            );
            affected = processed;
        }
        Outcome::Ok(affected)
    }

    /// Fetch one page and wrap it in a page envelope.
    ///
    /// The page number is supplied by the caller (1-based; values below 1
    /// clamp to 1).
    pub async fn paginate<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        per_page: u64,
        page: u64,
        path: &str,
    ) -> Outcome<Page, Error> {
        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = try_outcome!(self.count(cx, conn).await);
        let data = try_outcome!(
            self.clone()
                .limit(per_page)
                .offset((page - 1) * per_page)
                .get(cx, conn)
                .await
        );
        Outcome::Ok(Page::new(data, total, per_page, page, path))
    }

    // ==================== Internal helpers ====================

    /// Validate that every row carries the same column set.
    fn normalize_rows(
        &self,
        rows: Vec<BTreeMap<String, Value>>,
    ) -> Result<Vec<BTreeMap<String, Value>>, Error> {
        let first_keys: Vec<&String> = rows[0].keys().collect();
        for (i, row) in rows.iter().enumerate().skip(1) {
            let keys: Vec<&String> = row.keys().collect();
            if keys != first_keys {
                return Err(Error::invalid_argument(format!(
                    "row {i} has a different column set than row 0"
                )));
            }
        }
        Ok(rows)
    }

    fn stamp_timestamps(&self, attrs: &mut BTreeMap<String, Value>, creating: bool) {
        if !self.meta.timestamps {
            return;
        }
        let now = unix_timestamp();
        if creating {
            attrs
                .entry("created_at".to_string())
                .or_insert(Value::Timestamp(now));
        }
        attrs
            .entry("updated_at".to_string())
            .or_insert(Value::Timestamp(now));
    }

    fn encrypt_attrs(&self, attrs: &mut BTreeMap<String, Value>) {
        let Some(cipher) = self.cipher_ref() else {
            return;
        };
        for column in self.meta.encrypted {
            if let Some(Value::Text(plain)) = attrs.get(*column) {
                let encrypted = cipher.encrypt(plain);
                attrs.insert((*column).to_string(), Value::Text(encrypted));
            }
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.meta.table)
            .field("sql", &self.to_sql())
            .field("bindings", &self.bind_values())
            .finish()
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
