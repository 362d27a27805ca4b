use sqlx::SqlitePool;

pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
pub const SCHEMA_VERSION: &str = "1.0.0";

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '-' if !in_single_quote && !in_double_quote && chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
                continue;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }

        current.push(ch);
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

/// Applies the schema once; later runs see the recorded version and return.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS "_db_metadata" ("key" TEXT PRIMARY KEY, "value" TEXT NOT NULL)"#,
    )
    .execute(pool)
    .await?;

    let version: Option<String> =
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(pool)
            .await?;

    if version.as_deref() == Some(SCHEMA_VERSION) {
        tracing::debug!(version = SCHEMA_VERSION, "schema up to date");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for stmt in split_sql_statements(SCHEMA_SQL) {
        sqlx::query(&stmt).execute(&mut *tx).await?;
    }

    sqlx::query(
        r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
    )
    .bind(SCHEMA_VERSION)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(version = SCHEMA_VERSION, "schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_semicolons_in_quotes() {
        let sql = r#"INSERT INTO "a;b" VALUES ('x;y'); SELECT 1;"#;
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], r#"INSERT INTO "a;b" VALUES ('x;y')"#);
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_split_drops_comments_with_semicolons() {
        let sql = "-- first; note\nCREATE TABLE t (a TEXT); -- trailing; comment\nSELECT '--kept';";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE t (a TEXT)", "SELECT '--kept'"]);
    }

    #[tokio::test]
    async fn test_migrations_apply_on_fresh_database() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let version: String = sqlx::query_scalar(
            r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('xp_events', 'xp_balances')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_schema_splits_into_statements() {
        let statements = split_sql_statements(SCHEMA_SQL);
        assert!(statements.iter().any(|s| s.contains(r#""xp_events""#)));
        assert!(statements.iter().any(|s| s.contains(r#""xp_balances""#)));
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
    }
}
