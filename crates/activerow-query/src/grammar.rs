//! Dialect-specific SQL grammar.
//!
//! Pure functions translating semantic operations into SQL text for the
//! three supported backends. Every function branches exhaustively on the
//! dialect; driver names that match no known backend fall back to MySQL
//! grammar.
//!
//! Placeholders are positional `?` in every dialect. Drivers translate to
//! their native scheme; the engine only guarantees that placeholder count
//! and binding order agree.

use activerow_core::Value;

/// A SQL backend dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// MySQL / MariaDB
    #[default]
    Mysql,
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
}

/// A date component extractable from a datetime column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Day,
    Month,
    Year,
}

impl Dialect {
    /// Resolve a dialect from a driver name.
    ///
    /// Unknown drivers fall back to MySQL grammar.
    #[must_use]
    pub fn from_driver_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "pgsql" | "postgres" | "postgresql" => Dialect::Postgres,
            "sqlite" | "sqlite3" => Dialect::Sqlite,
            "mysql" | "mariadb" => Dialect::Mysql,
            other => {
                tracing::debug!(driver = other, "unknown driver, using mysql grammar");
                Dialect::Mysql
            }
        }
    }

    /// The canonical driver name for this dialect.
    #[must_use]
    pub const fn driver_name(self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier.
    ///
    /// Embedded quote characters are escaped by doubling.
    #[must_use]
    pub fn wrap(self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// Extract a date component from a column.
    #[must_use]
    pub fn date_part(self, column: &str, part: DatePart) -> String {
        match self {
            Dialect::Mysql => {
                let func = match part {
                    DatePart::Day => "DAY",
                    DatePart::Month => "MONTH",
                    DatePart::Year => "YEAR",
                };
                format!("{func}({column})")
            }
            Dialect::Postgres => {
                let field = match part {
                    DatePart::Day => "DAY",
                    DatePart::Month => "MONTH",
                    DatePart::Year => "YEAR",
                };
                format!("EXTRACT({field} FROM {column})")
            }
            Dialect::Sqlite => {
                let fmt = match part {
                    DatePart::Day => "%d",
                    DatePart::Month => "%m",
                    DatePart::Year => "%Y",
                };
                format!("CAST(STRFTIME('{fmt}', {column}) AS INTEGER)")
            }
        }
    }

    /// A JSON containment test against `column` at `path` (dot-separated,
    /// empty for the document root).
    ///
    /// Returns the SQL fragment and the bindings it consumes. The three
    /// backends express containment differently and none of the forms is
    /// interchangeable:
    ///
    /// - MySQL probes with `JSON_CONTAINS`, casting the bound value to JSON
    /// - PostgreSQL casts to `jsonb` and applies the `@>` operator
    /// - SQLite compares the `json_extract`ed path for equality
    #[must_use]
    pub fn json_contains(
        self,
        column: &str,
        path: &str,
        value: &serde_json::Value,
    ) -> (String, Vec<Value>) {
        let bound = Value::Text(value.to_string());
        match self {
            Dialect::Mysql => {
                let sql = if path.is_empty() {
                    format!("JSON_CONTAINS({column}, CAST(? AS JSON))")
                } else {
                    format!("JSON_CONTAINS({column}, CAST(? AS JSON), '$.{path}')")
                };
                (sql, vec![bound])
            }
            Dialect::Postgres => {
                let target = if path.is_empty() {
                    format!("({column})::jsonb")
                } else {
                    let accessors: Vec<String> =
                        path.split('.').map(|seg| format!("->'{seg}'")).collect();
                    format!("({column}{})::jsonb", accessors.join(""))
                };
                (format!("{target} @> (?)::jsonb"), vec![bound])
            }
            Dialect::Sqlite => {
                let sql = if path.is_empty() {
                    format!("json_extract({column}, '$') = ?")
                } else {
                    format!("json_extract({column}, '$.{path}') = ?")
                };
                // SQLite compares the extracted scalar, not a JSON document.
                let bound = match value {
                    serde_json::Value::String(s) => Value::Text(s.clone()),
                    serde_json::Value::Number(n) if n.is_i64() => {
                        Value::Int(n.as_i64().unwrap_or_default())
                    }
                    serde_json::Value::Bool(b) => Value::Bool(*b),
                    other => Value::Text(other.to_string()),
                };
                (sql, vec![bound])
            }
        }
    }

    /// SQL that lists the columns of `table`.
    #[must_use]
    pub fn table_columns_sql(self, table: &str) -> String {
        match self {
            Dialect::Mysql => format!("SHOW COLUMNS FROM {}", self.wrap(table)),
            Dialect::Postgres => format!(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = '{table}' ORDER BY ordinal_position"
            ),
            Dialect::Sqlite => format!("PRAGMA table_info({})", self.wrap(table)),
        }
    }

    /// The expression used for random ordering.
    #[must_use]
    pub const fn random_order(self) -> &'static str {
        match self {
            Dialect::Mysql => "RAND()",
            Dialect::Postgres | Dialect::Sqlite => "RANDOM()",
        }
    }

    /// The population standard deviation of `column`.
    ///
    /// SQLite has no native aggregate, so the arithmetic identity is used.
    #[must_use]
    pub fn std_dev(self, column: &str) -> String {
        match self {
            Dialect::Mysql | Dialect::Postgres => format!("STDDEV_POP({column})"),
            Dialect::Sqlite => format!(
                "SQRT(AVG({column} * {column}) - AVG({column}) * AVG({column}))"
            ),
        }
    }

    /// The operator for a case-insensitive LIKE.
    ///
    /// MySQL and SQLite fold case in their default collations; PostgreSQL
    /// needs `ILIKE`.
    #[must_use]
    pub const fn ci_like_operator(self) -> &'static str {
        match self {
            Dialect::Mysql | Dialect::Sqlite => "LIKE",
            Dialect::Postgres => "ILIKE",
        }
    }

    /// Whether the backend can express an insert-or-update conflict clause.
    #[must_use]
    pub const fn supports_upsert(self) -> bool {
        match self {
            Dialect::Mysql | Dialect::Postgres | Dialect::Sqlite => true,
        }
    }

    /// Whether the backend reports 2 affected rows per updated row.
    ///
    /// MySQL counts an `ON DUPLICATE KEY UPDATE` hit as delete+insert.
    #[must_use]
    pub const fn reports_doubled_update_count(self) -> bool {
        matches!(self, Dialect::Mysql)
    }

    /// A multi-row INSERT with a conflict clause.
    ///
    /// `update_columns` are assigned from the incoming row on conflict;
    /// with `ignore_errors` the conflict is swallowed instead.
    #[must_use]
    pub fn upsert(
        self,
        table: &str,
        columns: &[String],
        row_count: usize,
        unique_by: &[&str],
        update_columns: &[String],
        ignore_errors: bool,
    ) -> String {
        let column_list = columns.join(", ");
        let row = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = vec![row; row_count].join(", ");

        match self {
            Dialect::Mysql => {
                if ignore_errors {
                    return format!("INSERT IGNORE INTO {table} ({column_list}) VALUES {values}");
                }
                let assignments: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = VALUES({c})"))
                    .collect();
                format!(
                    "INSERT INTO {table} ({column_list}) VALUES {values} \
                     ON DUPLICATE KEY UPDATE {}",
                    assignments.join(", ")
                )
            }
            Dialect::Postgres | Dialect::Sqlite => {
                let conflict_target = unique_by.join(", ");
                if ignore_errors {
                    return format!(
                        "INSERT INTO {table} ({column_list}) VALUES {values} \
                         ON CONFLICT ({conflict_target}) DO NOTHING"
                    );
                }
                let assignments: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .collect();
                format!(
                    "INSERT INTO {table} ({column_list}) VALUES {values} \
                     ON CONFLICT ({conflict_target}) DO UPDATE SET {}",
                    assignments.join(", ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_driver_name_known() {
        assert_eq!(Dialect::from_driver_name("mysql"), Dialect::Mysql);
        assert_eq!(Dialect::from_driver_name("pgsql"), Dialect::Postgres);
        assert_eq!(Dialect::from_driver_name("PostgreSQL"), Dialect::Postgres);
        assert_eq!(Dialect::from_driver_name("sqlite"), Dialect::Sqlite);
    }

    #[test]
    fn test_from_driver_name_unknown_falls_back_to_mysql() {
        assert_eq!(Dialect::from_driver_name("oracle"), Dialect::Mysql);
        assert_eq!(Dialect::from_driver_name(""), Dialect::Mysql);
    }

    #[test]
    fn test_wrap_per_dialect() {
        assert_eq!(Dialect::Mysql.wrap("name"), "`name`");
        assert_eq!(Dialect::Postgres.wrap("name"), "\"name\"");
        assert_eq!(Dialect::Mysql.wrap("a`b"), "`a``b`");
    }

    #[test]
    fn test_date_part_per_dialect() {
        assert_eq!(
            Dialect::Mysql.date_part("created_at", DatePart::Month),
            "MONTH(created_at)"
        );
        assert_eq!(
            Dialect::Postgres.date_part("created_at", DatePart::Month),
            "EXTRACT(MONTH FROM created_at)"
        );
        assert_eq!(
            Dialect::Sqlite.date_part("created_at", DatePart::Month),
            "CAST(STRFTIME('%m', created_at) AS INTEGER)"
        );
    }

    #[test]
    fn test_json_contains_mysql_casts_probe() {
        let (sql, bindings) =
            Dialect::Mysql.json_contains("meta", "tags", &serde_json::json!("fast"));
        assert_eq!(sql, "JSON_CONTAINS(meta, CAST(? AS JSON), '$.tags')");
        assert_eq!(bindings, vec![Value::Text("\"fast\"".into())]);
    }

    #[test]
    fn test_json_contains_postgres_uses_containment_operator() {
        let (sql, bindings) =
            Dialect::Postgres.json_contains("meta", "tags", &serde_json::json!("fast"));
        assert_eq!(sql, "(meta->'tags')::jsonb @> (?)::jsonb");
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_json_contains_sqlite_compares_extracted_path() {
        let (sql, bindings) =
            Dialect::Sqlite.json_contains("meta", "level", &serde_json::json!(3));
        assert_eq!(sql, "json_extract(meta, '$.level') = ?");
        assert_eq!(bindings, vec![Value::Int(3)]);
    }

    #[test]
    fn test_random_order() {
        assert_eq!(Dialect::Mysql.random_order(), "RAND()");
        assert_eq!(Dialect::Postgres.random_order(), "RANDOM()");
        assert_eq!(Dialect::Sqlite.random_order(), "RANDOM()");
    }

    #[test]
    fn test_std_dev_sqlite_fallback() {
        assert_eq!(Dialect::Postgres.std_dev("age"), "STDDEV_POP(age)");
        assert_eq!(
            Dialect::Sqlite.std_dev("age"),
            "SQRT(AVG(age * age) - AVG(age) * AVG(age))"
        );
    }

    #[test]
    fn test_ci_like_operator() {
        assert_eq!(Dialect::Mysql.ci_like_operator(), "LIKE");
        assert_eq!(Dialect::Postgres.ci_like_operator(), "ILIKE");
    }

    #[test]
    fn test_table_columns_sql() {
        assert_eq!(
            Dialect::Mysql.table_columns_sql("users"),
            "SHOW COLUMNS FROM `users`"
        );
        assert!(
            Dialect::Postgres
                .table_columns_sql("users")
                .contains("information_schema.columns")
        );
        assert_eq!(
            Dialect::Sqlite.table_columns_sql("users"),
            "PRAGMA table_info(\"users\")"
        );
    }

    #[test]
    fn test_upsert_mysql() {
        let sql = Dialect::Mysql.upsert(
            "users",
            &["email".to_string(), "name".to_string()],
            2,
            &["email"],
            &["name".to_string()],
            false,
        );
        assert_eq!(
            sql,
            "INSERT INTO users (email, name) VALUES (?, ?), (?, ?) \
             ON DUPLICATE KEY UPDATE name = VALUES(name)"
        );
    }

    #[test]
    fn test_upsert_postgres() {
        let sql = Dialect::Postgres.upsert(
            "users",
            &["email".to_string(), "name".to_string()],
            1,
            &["email"],
            &["name".to_string()],
            false,
        );
        assert_eq!(
            sql,
            "INSERT INTO users (email, name) VALUES (?, ?) \
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name"
        );
    }

    #[test]
    fn test_upsert_ignore_errors() {
        let mysql = Dialect::Mysql.upsert(
            "users",
            &["email".to_string()],
            1,
            &["email"],
            &[],
            true,
        );
        assert!(mysql.starts_with("INSERT IGNORE INTO users"));

        let sqlite = Dialect::Sqlite.upsert(
            "users",
            &["email".to_string()],
            1,
            &["email"],
            &[],
            true,
        );
        assert!(sqlite.ends_with("ON CONFLICT (email) DO NOTHING"));
    }

    #[test]
    fn test_doubled_update_count_flag() {
        assert!(Dialect::Mysql.reports_doubled_update_count());
        assert!(!Dialect::Postgres.reports_doubled_update_count());
        assert!(!Dialect::Sqlite.reports_doubled_update_count());
    }
}
