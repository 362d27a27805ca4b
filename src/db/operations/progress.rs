use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite};

use crate::types::ProgressStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUnitProgress {
    pub user_id: String,
    pub unit_id: String,
    pub status: ProgressStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub watched_seconds: i64,
    pub watched_pct: f64,
}

impl UserUnitProgress {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some() || self.status == ProgressStatus::Completed
    }
}

pub async fn get_progress<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
) -> Result<Option<UserUnitProgress>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT "userId", "unitId", "status", "completedAt", "lastViewedAt", "watchedSeconds", "watchedPct"
           FROM "user_unit_progress" WHERE "userId" = ? AND "unitId" = ?"#,
    )
    .bind(user_id)
    .bind(unit_id)
    .fetch_optional(executor)
    .await?;

    row.map(|r| {
        let status: String = r.try_get("status")?;
        Ok(UserUnitProgress {
            user_id: r.try_get("userId")?,
            unit_id: r.try_get("unitId")?,
            status: ProgressStatus::parse(&status),
            completed_at: r.try_get("completedAt")?,
            last_viewed_at: r.try_get("lastViewedAt")?,
            watched_seconds: r.try_get("watchedSeconds")?,
            watched_pct: r.try_get("watchedPct")?,
        })
    })
    .transpose()
}

/// Marks the unit completed unless `completedAt` is already set.
///
/// Returns `true` when this call set `completedAt`, `false` when the unit was
/// already completed. The check and the write are one statement, so of two
/// concurrent callers exactly one gets `true`.
pub async fn claim_completion<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let claimed: Option<String> = sqlx::query_scalar(
        r#"
        INSERT INTO "user_unit_progress" (
            "id", "userId", "unitId", "status", "completedAt", "lastViewedAt", "watchedSeconds", "watchedPct"
        ) VALUES (?, ?, ?, ?, ?, ?, 0, 0)
        ON CONFLICT ("userId", "unitId") DO UPDATE SET
            "status" = excluded."status",
            "completedAt" = excluded."completedAt",
            "lastViewedAt" = excluded."lastViewedAt"
        WHERE "user_unit_progress"."completedAt" IS NULL
        RETURNING "id"
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(unit_id)
    .bind(ProgressStatus::Completed.as_str())
    .bind(now)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    Ok(claimed.is_some())
}

/// Monotonic progress upsert. Counters only move up, completed rows keep
/// their status and frozen counters, `lastViewedAt` always advances.
pub async fn upsert_progress<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
    watched_seconds: i64,
    watched_pct: f64,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO "user_unit_progress" (
            "id", "userId", "unitId", "status", "lastViewedAt", "watchedSeconds", "watchedPct"
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("userId", "unitId") DO UPDATE SET
            "status" = CASE
                WHEN "user_unit_progress"."status" = 'COMPLETED' THEN "user_unit_progress"."status"
                ELSE excluded."status"
            END,
            "watchedSeconds" = CASE
                WHEN "user_unit_progress"."status" = 'COMPLETED' THEN "user_unit_progress"."watchedSeconds"
                ELSE MAX("user_unit_progress"."watchedSeconds", excluded."watchedSeconds")
            END,
            "watchedPct" = CASE
                WHEN "user_unit_progress"."status" = 'COMPLETED' THEN "user_unit_progress"."watchedPct"
                ELSE MAX("user_unit_progress"."watchedPct", excluded."watchedPct")
            END,
            "lastViewedAt" = excluded."lastViewedAt"
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(unit_id)
    .bind(ProgressStatus::InProgress.as_str())
    .bind(now)
    .bind(watched_seconds)
    .bind(watched_pct)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn is_unit_completed<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let completed: Option<i64> = sqlx::query_scalar(
        r#"SELECT 1 FROM "user_unit_progress"
           WHERE "userId" = ? AND "unitId" = ? AND "completedAt" IS NOT NULL"#,
    )
    .bind(user_id)
    .bind(unit_id)
    .fetch_optional(executor)
    .await?;
    Ok(completed.is_some())
}
