use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySubmission {
    pub id: String,
    pub user_id: String,
    pub unit_id: String,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn get_submission<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
) -> Result<Option<ActivitySubmission>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        r#"SELECT "id", "userId", "unitId", "text", "attachmentUrl", "submittedAt", "updatedAt"
           FROM "activity_submissions" WHERE "userId" = ? AND "unitId" = ?"#,
    )
    .bind(user_id)
    .bind(unit_id)
    .fetch_optional(executor)
    .await?;

    row.map(|r| {
        Ok(ActivitySubmission {
            id: r.try_get("id")?,
            user_id: r.try_get("userId")?,
            unit_id: r.try_get("unitId")?,
            text: r.try_get("text")?,
            attachment_url: r.try_get("attachmentUrl")?,
            submitted_at: r.try_get("submittedAt")?,
            updated_at: r.try_get("updatedAt")?,
        })
    })
    .transpose()
}

/// Resubmission replaces the content and keeps the original `submittedAt`.
pub async fn upsert_submission<'e, E>(
    executor: E,
    user_id: &str,
    unit_id: &str,
    text: Option<&str>,
    attachment_url: Option<&str>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO "activity_submissions" (
            "id", "userId", "unitId", "text", "attachmentUrl", "submittedAt", "updatedAt"
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("userId", "unitId") DO UPDATE SET
            "text" = excluded."text",
            "attachmentUrl" = excluded."attachmentUrl",
            "updatedAt" = excluded."updatedAt"
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(unit_id)
    .bind(text)
    .bind(attachment_url)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}
