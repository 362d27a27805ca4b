use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};

use crate::db::operations::{catalog, events};
use crate::types::{BalanceTotals, XpType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBalance {
    pub user_id: String,
    pub course_id: String,
    #[serde(flatten)]
    pub totals: BalanceTotals,
    pub updated_at: Option<DateTime<Utc>>,
}

impl XpBalance {
    pub fn empty(user_id: &str, course_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            totals: BalanceTotals::default(),
            updated_at: None,
        }
    }
}

fn map_totals(row: &SqliteRow) -> Result<BalanceTotals, sqlx::Error> {
    Ok(BalanceTotals {
        xp_mandatory: row.try_get("xpMandatory")?,
        xp_extra: row.try_get("xpExtra")?,
        xp_optional: row.try_get("xpOptional")?,
        xp_bonus: row.try_get("xpBonus")?,
        xp_welcome: row.try_get("xpWelcome")?,
        xp_primary: row.try_get("xpPrimary")?,
        xp_total: row.try_get("xpTotal")?,
    })
}

pub async fn get_balance<'e, E>(
    executor: E,
    user_id: &str,
    course_id: &str,
) -> Result<Option<XpBalance>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT "userId", "courseId", "xpMandatory", "xpExtra", "xpOptional", "xpBonus",
                  "xpWelcome", "xpPrimary", "xpTotal", "updatedAt"
           FROM "xp_balances" WHERE "userId" = ? AND "courseId" = ?"#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await?;

    row.map(|r| {
        Ok(XpBalance {
            user_id: r.try_get("userId")?,
            course_id: r.try_get("courseId")?,
            totals: map_totals(&r)?,
            updated_at: r.try_get("updatedAt")?,
        })
    })
    .transpose()
}

async fn ensure_balance_row(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO "xp_balances" ("userId", "courseId", "updatedAt") VALUES (?, ?, ?)
           ON CONFLICT ("userId", "courseId") DO NOTHING"#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

async fn read_totals(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<BalanceTotals, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "xpMandatory", "xpExtra", "xpOptional", "xpBonus", "xpWelcome", "xpPrimary", "xpTotal"
           FROM "xp_balances" WHERE "userId" = ? AND "courseId" = ?"#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(conn)
    .await?;
    map_totals(&row)
}

async fn write_derived(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    totals: &BalanceTotals,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE "xp_balances" SET "xpPrimary" = ?, "xpTotal" = ?, "updatedAt" = ?
           WHERE "userId" = ? AND "courseId" = ?"#,
    )
    .bind(totals.xp_primary)
    .bind(totals.xp_total)
    .bind(Utc::now())
    .bind(user_id)
    .bind(course_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Adds `xp_amount` to the accumulator selected by `xp_type` and re-derives
/// the primary/total fields from the post-increment row.
///
/// The increment is a relative `SET col = col + ?`. Callers run this inside a
/// transaction so the re-derivation sees exactly the row it incremented.
pub async fn apply_to_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
    xp_amount: i64,
    xp_type: XpType,
) -> Result<BalanceTotals, sqlx::Error> {
    ensure_balance_row(&mut *conn, user_id, course_id).await?;

    // column name comes from a closed enum, never from input
    let column = xp_type.balance_column();
    let sql = format!(
        r#"UPDATE "xp_balances" SET "{column}" = "{column}" + ? WHERE "userId" = ? AND "courseId" = ?"#
    );
    sqlx::query(&sql)
        .bind(xp_amount)
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *conn)
        .await?;

    let config = catalog::get_course_config(&mut *conn, course_id).await?;
    let totals = read_totals(&mut *conn, user_id, course_id)
        .await?
        .derive(config.count_extra_in_primary);
    write_derived(&mut *conn, user_id, course_id, &totals).await?;

    tracing::debug!(
        user_id,
        course_id,
        xp_type = xp_type.as_str(),
        xp_amount,
        xp_primary = totals.xp_primary,
        xp_total = totals.xp_total,
        "balance updated"
    );

    Ok(totals)
}

/// Replays every event of (user, course) and overwrites the balance row.
/// Returns the balance before and after the overwrite.
pub async fn recompute_from_events(
    conn: &mut SqliteConnection,
    user_id: &str,
    course_id: &str,
) -> Result<(BalanceTotals, BalanceTotals), sqlx::Error> {
    // write first so the transaction holds the write lock before reading
    ensure_balance_row(&mut *conn, user_id, course_id).await?;
    let before = read_totals(&mut *conn, user_id, course_id).await?;

    let sums = events::sum_by_xp_type(&mut *conn, user_id, course_id).await?;
    let config = catalog::get_course_config(&mut *conn, course_id).await?;

    let mut totals = BalanceTotals::default();
    for xp_type in XpType::ALL {
        totals.add(xp_type, sums.get(&xp_type).copied().unwrap_or(0));
    }
    let totals = totals.derive(config.count_extra_in_primary);

    sqlx::query(
        r#"
        UPDATE "xp_balances" SET
            "xpMandatory" = ?, "xpExtra" = ?, "xpOptional" = ?, "xpBonus" = ?, "xpWelcome" = ?,
            "xpPrimary" = ?, "xpTotal" = ?, "updatedAt" = ?
        WHERE "userId" = ? AND "courseId" = ?
        "#,
    )
    .bind(totals.xp_mandatory)
    .bind(totals.xp_extra)
    .bind(totals.xp_optional)
    .bind(totals.xp_bonus)
    .bind(totals.xp_welcome)
    .bind(totals.xp_primary)
    .bind(totals.xp_total)
    .bind(Utc::now())
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *conn)
    .await?;

    Ok((before, totals))
}
