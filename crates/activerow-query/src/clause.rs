//! The condition model: an ordered, heterogeneous clause list.
//!
//! Rendering and binding collection are two separate passes over the same
//! list. They are intentionally decoupled, but they must traverse clauses
//! in identical order, including recursion into nested groups, or the
//! positional parameters drift out of alignment with the placeholders.

use activerow_core::Value;

/// The boolean connector preceding a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    /// The SQL keyword for this connector.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// One entry in a WHERE/HAVING predicate list.
#[derive(Debug, Clone)]
pub struct ConditionClause {
    /// How this clause connects to the one before it. The first clause's
    /// connector is never emitted.
    pub connector: Connector,
    /// The condition itself.
    pub kind: ConditionKind,
}

/// The shape of a single condition.
#[derive(Debug, Clone)]
pub enum ConditionKind {
    /// `column op ?`; one binding.
    Compare {
        column: String,
        operator: String,
        value: Value,
    },
    /// `column [NOT] BETWEEN ? AND ?`; two bindings, (low, high) order.
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `column IS [NOT] NULL`; zero bindings.
    Null { column: String, negated: bool },
    /// `column [NOT] IN (?, ...)`; one binding per element, list order.
    /// An empty list renders a constant predicate with zero bindings.
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    /// Raw SQL fragment carrying its own bindings.
    Raw { sql: String, bindings: Vec<Value> },
    /// Parenthesized nested group; renders recursively.
    Group(Vec<ConditionClause>),
    /// `[NOT] EXISTS (subquery)` carrying the subquery's bindings.
    Exists {
        subquery: String,
        bindings: Vec<Value>,
        negated: bool,
    },
}

impl ConditionClause {
    /// Build a clause with an AND connector.
    #[must_use]
    pub fn and(kind: ConditionKind) -> Self {
        Self {
            connector: Connector::And,
            kind,
        }
    }

    /// Build a clause with an OR connector.
    #[must_use]
    pub fn or(kind: ConditionKind) -> Self {
        Self {
            connector: Connector::Or,
            kind,
        }
    }
}

/// Render a clause list to SQL (without the leading `WHERE`).
///
/// The first clause's connector is suppressed; groups are parenthesized
/// with the connector placed before the parenthesis.
#[must_use]
pub fn render_conditions(clauses: &[ConditionClause]) -> String {
    let mut sql = String::new();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(clause.connector.as_str());
            sql.push(' ');
        }
        render_kind(&clause.kind, &mut sql);
    }
    sql
}

fn render_kind(kind: &ConditionKind, sql: &mut String) {
    match kind {
        ConditionKind::Compare {
            column, operator, ..
        } => {
            sql.push_str(column);
            sql.push(' ');
            sql.push_str(operator);
            sql.push_str(" ?");
        }
        ConditionKind::Between {
            column, negated, ..
        } => {
            sql.push_str(column);
            sql.push_str(if *negated {
                " NOT BETWEEN ? AND ?"
            } else {
                " BETWEEN ? AND ?"
            });
        }
        ConditionKind::Null { column, negated } => {
            sql.push_str(column);
            sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
        }
        ConditionKind::In {
            column,
            values,
            negated,
        } => {
            if values.is_empty() {
                // Constant predicate keeps placeholder and binding counts
                // aligned at zero.
                sql.push_str(if *negated { "1 = 1" } else { "1 = 0" });
                return;
            }
            sql.push_str(column);
            sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
            sql.push_str(&vec!["?"; values.len()].join(", "));
            sql.push(')');
        }
        ConditionKind::Raw { sql: fragment, .. } => {
            sql.push_str(fragment);
        }
        ConditionKind::Group(inner) => {
            if inner.is_empty() {
                sql.push_str("(1 = 1)");
                return;
            }
            sql.push('(');
            sql.push_str(&render_conditions(inner));
            sql.push(')');
        }
        ConditionKind::Exists {
            subquery, negated, ..
        } => {
            sql.push_str(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
            sql.push_str(subquery);
            sql.push(')');
        }
    }
}

/// Collect bindings in the exact order the rendered SQL consumes them.
pub fn collect_bindings(clauses: &[ConditionClause], out: &mut Vec<Value>) {
    for clause in clauses {
        match &clause.kind {
            ConditionKind::Compare { value, .. } => out.push(value.clone()),
            ConditionKind::Between { low, high, .. } => {
                out.push(low.clone());
                out.push(high.clone());
            }
            ConditionKind::Null { .. } => {}
            ConditionKind::In { values, .. } => out.extend(values.iter().cloned()),
            ConditionKind::Raw { bindings, .. }
            | ConditionKind::Exists { bindings, .. } => out.extend(bindings.iter().cloned()),
            ConditionKind::Group(inner) => collect_bindings(inner, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> usize {
        sql.matches('?').count()
    }

    #[test]
    fn test_first_connector_suppressed() {
        let clauses = vec![
            ConditionClause::and(ConditionKind::Compare {
                column: "age".into(),
                operator: ">".into(),
                value: Value::Int(18),
            }),
            ConditionClause::or(ConditionKind::Compare {
                column: "role".into(),
                operator: "=".into(),
                value: Value::Text("admin".into()),
            }),
        ];
        assert_eq!(render_conditions(&clauses), "age > ? OR role = ?");
    }

    #[test]
    fn test_between_contributes_low_high_in_order() {
        let clauses = vec![ConditionClause::and(ConditionKind::Between {
            column: "age".into(),
            low: Value::Int(25),
            high: Value::Int(30),
            negated: false,
        })];
        assert_eq!(render_conditions(&clauses), "age BETWEEN ? AND ?");
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);
        assert_eq!(bindings, vec![Value::Int(25), Value::Int(30)]);
    }

    #[test]
    fn test_null_test_contributes_no_bindings() {
        let clauses = vec![
            ConditionClause::and(ConditionKind::Null {
                column: "deleted_at".into(),
                negated: false,
            }),
            ConditionClause::and(ConditionKind::Null {
                column: "archived_at".into(),
                negated: true,
            }),
        ];
        assert_eq!(
            render_conditions(&clauses),
            "deleted_at IS NULL AND archived_at IS NOT NULL"
        );
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_in_list_one_binding_per_element() {
        let clauses = vec![ConditionClause::and(ConditionKind::In {
            column: "id".into(),
            values: vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            negated: false,
        })];
        assert_eq!(render_conditions(&clauses), "id IN (?, ?, ?)");
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn test_empty_in_renders_constant_predicate() {
        let clauses = vec![ConditionClause::and(ConditionKind::In {
            column: "id".into(),
            values: vec![],
            negated: false,
        })];
        assert_eq!(render_conditions(&clauses), "1 = 0");
        let negated = vec![ConditionClause::and(ConditionKind::In {
            column: "id".into(),
            values: vec![],
            negated: true,
        })];
        assert_eq!(render_conditions(&negated), "1 = 1");
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_nested_group_parenthesized_with_leading_connector() {
        let clauses = vec![
            ConditionClause::and(ConditionKind::Compare {
                column: "active".into(),
                operator: "=".into(),
                value: Value::Bool(true),
            }),
            ConditionClause::or(ConditionKind::Group(vec![
                ConditionClause::and(ConditionKind::Compare {
                    column: "age".into(),
                    operator: ">".into(),
                    value: Value::Int(65),
                }),
                ConditionClause::and(ConditionKind::Null {
                    column: "retired_at".into(),
                    negated: true,
                }),
            ])),
        ];
        assert_eq!(
            render_conditions(&clauses),
            "active = ? OR (age > ? AND retired_at IS NOT NULL)"
        );
    }

    #[test]
    fn test_exists_carries_subquery_bindings() {
        let clauses = vec![ConditionClause::and(ConditionKind::Exists {
            subquery: "SELECT 1 FROM posts WHERE posts.user_id = users.id AND posts.state = ?"
                .into(),
            bindings: vec![Value::Text("published".into())],
            negated: true,
        })];
        let sql = render_conditions(&clauses);
        assert!(sql.starts_with("NOT EXISTS (SELECT 1 FROM posts"));
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);
        assert_eq!(bindings, vec![Value::Text("published".into())]);
    }

    // The round-trip property: placeholder count equals binding count, in
    // matching order, across every clause kind including nesting.
    #[test]
    fn test_placeholder_binding_lockstep() {
        let clauses = vec![
            ConditionClause::and(ConditionKind::Compare {
                column: "a".into(),
                operator: "=".into(),
                value: Value::Int(1),
            }),
            ConditionClause::and(ConditionKind::Between {
                column: "b".into(),
                low: Value::Int(2),
                high: Value::Int(3),
                negated: true,
            }),
            ConditionClause::or(ConditionKind::In {
                column: "c".into(),
                values: vec![Value::Int(4), Value::Int(5)],
                negated: false,
            }),
            ConditionClause::and(ConditionKind::Null {
                column: "d".into(),
                negated: false,
            }),
            ConditionClause::and(ConditionKind::Raw {
                sql: "e % ? = ?".into(),
                bindings: vec![Value::Int(6), Value::Int(7)],
            }),
            ConditionClause::or(ConditionKind::Group(vec![
                ConditionClause::and(ConditionKind::Compare {
                    column: "f".into(),
                    operator: "<".into(),
                    value: Value::Int(8),
                }),
                ConditionClause::or(ConditionKind::In {
                    column: "g".into(),
                    values: vec![Value::Int(9)],
                    negated: true,
                }),
            ])),
        ];

        let sql = render_conditions(&clauses);
        let mut bindings = Vec::new();
        collect_bindings(&clauses, &mut bindings);

        assert_eq!(placeholders(&sql), bindings.len());
        assert_eq!(
            bindings,
            vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
                Value::Int(4),
                Value::Int(5),
                Value::Int(6),
                Value::Int(7),
                Value::Int(8),
                Value::Int(9),
            ]
        );
    }
}
