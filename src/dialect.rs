//! SQL dialect selection and statement rendering
//!
//! Two render paths exist: the in-process path binds values as parameters,
//! the bulk-export path hands a self-contained literal statement to an
//! external reader that cannot receive bind parameters.

use sea_query::{MysqlQueryBuilder, PostgresQueryBuilder, SelectStatement, Values};

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL ($1, $2 placeholders)
    #[default]
    Postgres,
    /// MySQL / MariaDB (? placeholders)
    MySql,
}

impl Dialect {
    /// Dialect name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Guess the dialect from a connection URL scheme. Driver qualifiers
    /// (`postgresql+mydriver://`) are ignored. `None` for unknown schemes,
    /// letting the factory-declared dialect win.
    pub fn for_url(url: &str) -> Option<Self> {
        let scheme = url.split("://").next()?;
        let base = scheme.split('+').next()?;
        match base {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Render a statement with bind-parameter placeholders
    pub fn build(self, stmt: &SelectStatement) -> (String, Values) {
        match self {
            Self::Postgres => stmt.build(PostgresQueryBuilder),
            Self::MySql => stmt.build(MysqlQueryBuilder),
        }
    }

    /// Render a statement with all values inlined as literals
    pub fn build_literal(self, stmt: &SelectStatement) -> String {
        match self {
            Self::Postgres => stmt.to_string(PostgresQueryBuilder),
            Self::MySql => stmt.to_string(MysqlQueryBuilder),
        }
    }
}

/// Strip a driver qualifier from a connection URL scheme, producing the plain
/// vendor URL bulk readers expect (`postgresql+mydriver://…` → `postgresql://…`).
pub(crate) fn bulk_connection_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let base = scheme.split('+').next().unwrap_or(scheme);
            format!("{base}://{rest}")
        }
        None => url.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Alias, Asterisk, Expr, Query};

    #[test]
    fn test_for_url() {
        assert_eq!(
            Dialect::for_url("postgresql://localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::for_url("postgres+adapter://localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(
            Dialect::for_url("mysql://localhost/db"),
            Some(Dialect::MySql)
        );
        assert_eq!(Dialect::for_url("memory://anything"), None);
    }

    #[test]
    fn test_build_placeholders() {
        let stmt = Query::select()
            .column(Asterisk)
            .from(Alias::new("events"))
            .and_where(Expr::col(Alias::new("id")).gte(10_i64))
            .to_owned();

        let (sql, values) = Dialect::Postgres.build(&stmt);
        assert!(sql.contains("$1"));
        assert_eq!(values.0.len(), 1);

        let (sql, _) = Dialect::MySql.build(&stmt);
        assert!(sql.contains('?'));
    }

    #[test]
    fn test_build_literal_inlines_values() {
        let stmt = Query::select()
            .column(Asterisk)
            .from(Alias::new("events"))
            .and_where(Expr::col(Alias::new("id")).gte(10_i64))
            .to_owned();

        let sql = Dialect::Postgres.build_literal(&stmt);
        assert!(sql.contains("10"));
        assert!(!sql.contains("$1"));
    }

    #[test]
    fn test_bulk_connection_url_strips_qualifier() {
        assert_eq!(
            bulk_connection_url("postgresql+mydriver://u:p@h/db"),
            "postgresql://u:p@h/db"
        );
        assert_eq!(
            bulk_connection_url("mysql://u:p@h/db"),
            "mysql://u:p@h/db"
        );
    }
}
