use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};

/// SQL validation for compiled queries before they touch a customer
/// database.
pub struct SqlValidator;

impl SqlValidator {
    /// Validate SQL and ensure every statement is a SELECT.
    pub fn validate_select_only(sql: &str) -> Result<String> {
        let ast = Self::parse(sql)?;

        if ast.is_empty() {
            return Err(Error::InvalidSql("empty SQL query".to_string()));
        }

        for stmt in &ast {
            match stmt {
                Statement::Query(_) => {}
                other => {
                    return Err(Error::InvalidSql(format!(
                        "only SELECT queries are permitted, found: {}",
                        statement_kind(other)
                    )));
                }
            }
        }

        Ok(sql.to_string())
    }

    /// Append a LIMIT clause when the query lacks one. Detection goes
    /// through the AST, so table or column names containing "limit" do not
    /// trigger false positives.
    pub fn ensure_limit(sql: &str, default_limit: u64) -> Result<String> {
        let ast = Self::parse(sql)?;

        if ast.is_empty() {
            return Err(Error::InvalidSql("empty SQL query".to_string()));
        }

        if Self::statement_has_limit(&ast[0]) {
            Ok(sql.to_string())
        } else {
            let trimmed = sql.trim_end_matches(';').trim_end();
            Ok(format!("{} LIMIT {}", trimmed, default_limit))
        }
    }

    /// Validate SELECT-only and ensure a LIMIT, returning the prepared SQL
    /// and whether the default limit was applied.
    pub fn validate_and_prepare(sql: &str, default_limit: u64) -> Result<(String, bool)> {
        let validated = Self::validate_select_only(sql)?;
        let had_limit = Self::has_limit(&validated);
        let prepared = Self::ensure_limit(&validated, default_limit)?;
        Ok((prepared, !had_limit))
    }

    fn parse(sql: &str) -> Result<Vec<Statement>> {
        Parser::new(&SQLiteDialect {})
            .try_with_sql(sql)
            .map_err(|e| Error::InvalidSql(format!("SQL parsing error: {}", e)))?
            .parse_statements()
            .map_err(|e| Error::InvalidSql(format!("SQL parsing error: {}", e)))
    }

    fn statement_has_limit(stmt: &Statement) -> bool {
        match stmt {
            Statement::Query(query) => query.limit_clause.is_some(),
            _ => false,
        }
    }

    fn has_limit(sql: &str) -> bool {
        match Self::parse(sql) {
            Ok(ast) => ast.first().map(Self::statement_has_limit).unwrap_or(false),
            Err(_) => false,
        }
    }
}

fn statement_kind(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        _ => "non-SELECT statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_select_only() {
        assert!(SqlValidator::validate_select_only("SELECT * FROM contracts").is_ok());
        assert!(
            SqlValidator::validate_select_only("INSERT INTO contracts VALUES (1)").is_err()
        );
        assert!(
            SqlValidator::validate_select_only("UPDATE contracts SET status = 'x'").is_err()
        );
        assert!(SqlValidator::validate_select_only("DELETE FROM contracts").is_err());
        assert!(SqlValidator::validate_select_only("DROP TABLE contracts").is_err());
        assert!(SqlValidator::validate_select_only("").is_err());
    }

    #[test]
    fn test_validate_multiline_compiled_sql() {
        let sql = "SELECT c.contract_id AS contract_identifier\nFROM contracts AS c\nWHERE c.status = 'active'";
        assert!(SqlValidator::validate_select_only(sql).is_ok());
    }

    #[test]
    fn test_ensure_limit() {
        let result = SqlValidator::ensure_limit("SELECT * FROM contracts", 1000).unwrap();
        assert!(result.ends_with("LIMIT 1000"));

        let sql = "SELECT * FROM contracts LIMIT 100";
        assert_eq!(SqlValidator::ensure_limit(sql, 1000).unwrap(), sql);
    }

    #[test]
    fn test_limit_detection_uses_ast() {
        // names containing "limit" must not count as a LIMIT clause
        let (sql, applied) =
            SqlValidator::validate_and_prepare("SELECT * FROM table_limit", 1000).unwrap();
        assert!(sql.contains("LIMIT 1000"));
        assert!(applied);

        let (sql, applied) =
            SqlValidator::validate_and_prepare("SELECT limit_value FROM contracts", 1000)
                .unwrap();
        assert!(sql.contains("LIMIT 1000"));
        assert!(applied);

        let (sql, applied) =
            SqlValidator::validate_and_prepare("SELECT * FROM contracts LIMIT 50", 1000)
                .unwrap();
        assert!(sql.contains("LIMIT 50"));
        assert!(!applied);
    }

    #[test]
    fn test_validate_and_prepare_rejects_writes() {
        assert!(SqlValidator::validate_and_prepare("DELETE FROM contracts", 1000).is_err());
    }
}
