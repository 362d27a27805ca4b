use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::types::{EventScope, EventType, XpType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpEvent {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub module_id: Option<String>,
    pub unit_id: Option<String>,
    pub event_type: EventType,
    pub xp_amount: i64,
    pub xp_type: XpType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to record one event.
#[derive(Debug, Clone)]
pub struct NewXpEvent<'a> {
    pub user_id: &'a str,
    pub course_id: &'a str,
    pub module_id: Option<&'a str>,
    pub unit_id: Option<&'a str>,
    pub event_type: EventType,
    pub xp_amount: i64,
    pub xp_type: XpType,
    pub metadata: Option<serde_json::Value>,
}

impl NewXpEvent<'_> {
    pub fn scope(&self) -> EventScope<'_> {
        EventScope::resolve(self.course_id, self.module_id, self.unit_id)
    }
}

const EVENT_COLUMNS: &str = r#""id", "userId", "courseId", "moduleId", "unitId", "eventType",
    "xpAmount", "xpType", "metadata", "createdAt""#;

fn map_event(row: &SqliteRow) -> Result<XpEvent, sqlx::Error> {
    let event_type: String = row.try_get("eventType")?;
    let xp_type: String = row.try_get("xpType")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(XpEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        course_id: row.try_get("courseId")?,
        module_id: row.try_get("moduleId")?,
        unit_id: row.try_get("unitId")?,
        event_type: EventType::parse(&event_type).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "eventType".to_string(),
            source: format!("unknown event type {event_type}").into(),
        })?,
        xp_amount: row.try_get("xpAmount")?,
        xp_type: XpType::parse(&xp_type).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "xpType".to_string(),
            source: format!("unknown xp type {xp_type}").into(),
        })?,
        metadata: metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.try_get("createdAt")?,
    })
}

/// Inserts the event unless one already exists for its (user, scope, type)
/// key. Returns `None` for the duplicate case, including a concurrent writer
/// winning the race.
pub async fn record_event_once<'e, E>(
    executor: E,
    event: &NewXpEvent<'_>,
) -> Result<Option<XpEvent>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let scope_key = event.scope().key();
    let metadata = event
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| sqlx::Error::Protocol(format!("unencodable event metadata: {e}")))?;

    let sql = format!(
        r#"
        INSERT INTO "xp_events" (
            "id", "userId", "courseId", "moduleId", "unitId", "scopeKey",
            "eventType", "xpAmount", "xpType", "metadata", "createdAt"
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("userId", "scopeKey", "eventType") DO NOTHING
        RETURNING {EVENT_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(&id)
        .bind(event.user_id)
        .bind(event.course_id)
        .bind(event.module_id)
        .bind(event.unit_id)
        .bind(&scope_key)
        .bind(event.event_type.as_str())
        .bind(event.xp_amount)
        .bind(event.xp_type.as_str())
        .bind(metadata)
        .bind(now)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => {
            let recorded = map_event(&row)?;
            tracing::debug!(
                event_id = %recorded.id,
                user_id = %recorded.user_id,
                scope = %scope_key,
                event_type = recorded.event_type.as_str(),
                xp = recorded.xp_amount,
                "xp event recorded"
            );
            Ok(Some(recorded))
        }
        None => {
            tracing::debug!(
                user_id = %event.user_id,
                scope = %scope_key,
                event_type = event.event_type.as_str(),
                "duplicate xp event ignored"
            );
            Ok(None)
        }
    }
}

/// Events of a user in a course, newest first.
pub async fn list_events<'e, E>(
    executor: E,
    user_id: &str,
    course_id: &str,
) -> Result<Vec<XpEvent>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"SELECT {EVENT_COLUMNS} FROM "xp_events"
           WHERE "userId" = ? AND "courseId" = ?
           ORDER BY "createdAt" DESC, "id" DESC"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(course_id)
        .fetch_all(executor)
        .await?;
    rows.iter().map(map_event).collect()
}

pub async fn find_unit_completion<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
) -> Result<Option<XpEvent>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"SELECT {EVENT_COLUMNS} FROM "xp_events"
           WHERE "userId" = ? AND "scopeKey" = ? AND "eventType" = ?"#
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(EventScope::Unit(unit_id).key())
        .bind(EventType::UnitCompleted.as_str())
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(map_event).transpose()
}

/// (unitId, xpAmount) of the user's mandatory completion events for the
/// required units of a module.
pub async fn list_required_completions<'e, E>(
    executor: E,
    user_id: &str,
    module_id: &str,
) -> Result<Vec<(String, i64)>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT e."unitId", e."xpAmount"
        FROM "xp_events" e
        JOIN "learning_units" u ON u."id" = e."unitId"
        WHERE e."userId" = ?
          AND u."moduleId" = ?
          AND u."isOptional" = 0
          AND u."isExtra" = 0
          AND e."eventType" = ?
          AND e."xpType" = ?
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(EventType::UnitCompleted.as_str())
    .bind(XpType::Mandatory.as_str())
    .fetch_all(executor)
    .await?;

    rows.iter()
        .map(|r| Ok((r.try_get("unitId")?, r.try_get("xpAmount")?)))
        .collect()
}

/// Event XP of a user in a course summed per xp type.
pub async fn sum_by_xp_type<'e, E>(
    executor: E,
    user_id: &str,
    course_id: &str,
) -> Result<HashMap<XpType, i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"SELECT "xpType", SUM("xpAmount") AS "total" FROM "xp_events"
           WHERE "userId" = ? AND "courseId" = ?
           GROUP BY "xpType""#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(executor)
    .await?;

    let mut sums = HashMap::new();
    for row in rows {
        let raw: String = row.try_get("xpType")?;
        let total: i64 = row.try_get("total")?;
        match XpType::parse(&raw) {
            Some(xp_type) => {
                sums.insert(xp_type, total);
            }
            None => tracing::warn!(xp_type = %raw, "skipping events with unknown xp type"),
        }
    }
    Ok(sums)
}

/// Distinct (userId, courseId) pairs that have at least one event.
pub async fn list_event_owners<'e, E>(executor: E) -> Result<Vec<(String, String)>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(r#"SELECT DISTINCT "userId", "courseId" FROM "xp_events""#)
        .fetch_all(executor)
        .await?;
    rows.iter()
        .map(|r| Ok((r.try_get("userId")?, r.try_get("courseId")?)))
        .collect()
}

/// Modules in which the user has at least one mandatory completion.
pub async fn list_modules_with_completions<'e, E>(
    executor: E,
    user_id: &str,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"SELECT DISTINCT "moduleId" FROM "xp_events"
           WHERE "userId" = ? AND "courseId" = ? AND "eventType" = ? AND "xpType" = ?
             AND "moduleId" IS NOT NULL"#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(EventType::UnitCompleted.as_str())
    .bind(XpType::Mandatory.as_str())
    .fetch_all(executor)
    .await
}
