use serde::Serialize;

use crate::db::operations::{activity, catalog, events, progress, ActivitySubmission};
use crate::db::DatabaseProxy;
use crate::services::gamification::{self, CompletionOutcome};
use crate::services::LedgerError;
use crate::types::UnitKind;

const MAX_TEXT_CHARS: usize = 20_000;
const MAX_URL_CHARS: usize = 2_048;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatus {
    pub is_completed: bool,
    pub earned_xp: i64,
    pub submission: Option<ActivitySubmission>,
}

fn normalize(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Stores the learner's submission and completes the unit. Resubmitting
/// updates the stored content; XP is only ever granted by the first
/// completion.
pub async fn submit_activity(
    proxy: &DatabaseProxy,
    user_id: &str,
    unit_id: &str,
    text: Option<&str>,
    attachment_url: Option<&str>,
) -> Result<CompletionOutcome, LedgerError> {
    let pool = proxy.pool();
    let unit = catalog::get_unit(pool, unit_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("unit", unit_id))?;

    if unit.kind != UnitKind::Activity {
        return Err(LedgerError::InvalidInput(format!(
            "unit {unit_id} does not accept submissions"
        )));
    }

    let text = normalize(text);
    let attachment_url = normalize(attachment_url);
    if text.is_none() && attachment_url.is_none() {
        return Err(LedgerError::InvalidInput(
            "submission needs text or an attachment".to_string(),
        ));
    }
    if text.is_some_and(|t| t.chars().count() > MAX_TEXT_CHARS) {
        return Err(LedgerError::InvalidInput(format!(
            "text exceeds {MAX_TEXT_CHARS} characters"
        )));
    }
    if attachment_url.is_some_and(|u| u.chars().count() > MAX_URL_CHARS) {
        return Err(LedgerError::InvalidInput(format!(
            "attachment url exceeds {MAX_URL_CHARS} characters"
        )));
    }

    activity::upsert_submission(pool, user_id, unit_id, text, attachment_url).await?;
    gamification::complete_unit(proxy, user_id, unit_id).await
}

pub async fn get_activity_status(
    proxy: &DatabaseProxy,
    user_id: &str,
    unit_id: &str,
) -> Result<ActivityStatus, LedgerError> {
    let pool = proxy.pool();
    catalog::get_unit(pool, unit_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("unit", unit_id))?;

    let is_completed = progress::is_unit_completed(pool, user_id, unit_id).await?;
    let earned_xp = events::find_unit_completion(pool, user_id, unit_id)
        .await?
        .map(|event| event.xp_amount)
        .unwrap_or(0);
    let submission = activity::get_submission(pool, user_id, unit_id).await?;

    Ok(ActivityStatus {
        is_completed,
        earned_xp,
        submission,
    })
}
