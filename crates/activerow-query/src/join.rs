//! JOIN clauses.

/// The kind of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    /// The SQL keyword sequence for this join kind.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// A single join: target table plus a column-to-column ON term.
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub left: String,
    pub operator: String,
    pub right: String,
}

impl JoinClause {
    /// Create a join clause.
    #[must_use]
    pub fn new(
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            table: table.into(),
            left: left.into(),
            operator: operator.into(),
            right: right.into(),
        }
    }

    /// Render this join, including its leading space.
    #[must_use]
    pub fn render(&self) -> String {
        if self.kind == JoinKind::Cross {
            return format!(" CROSS JOIN {}", self.table);
        }
        format!(
            " {} {} ON {} {} {}",
            self.kind.as_sql(),
            self.table,
            self.left,
            self.operator,
            self.right
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_join_render() {
        let join = JoinClause::new(JoinKind::Inner, "teams", "heroes.team_id", "=", "teams.id");
        assert_eq!(
            join.render(),
            " INNER JOIN teams ON heroes.team_id = teams.id"
        );
    }

    #[test]
    fn test_left_join_render() {
        let join = JoinClause::new(JoinKind::Left, "teams", "heroes.team_id", "=", "teams.id");
        assert!(join.render().starts_with(" LEFT JOIN teams ON"));
    }

    #[test]
    fn test_cross_join_has_no_on_term() {
        let join = JoinClause::new(JoinKind::Cross, "numbers", "", "", "");
        assert_eq!(join.render(), " CROSS JOIN numbers");
    }
}
