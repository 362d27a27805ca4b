use chrono::Utc;
use serde::Serialize;

use crate::db::operations::{catalog, progress};
use crate::db::DatabaseProxy;
use crate::services::LedgerError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    pub is_completed: bool,
    pub watched_pct: f64,
    pub watched_seconds: i64,
    #[serde(rename = "unitXP")]
    pub unit_xp: i64,
    pub is_locked: bool,
}

/// Bad input is clamped, never rejected. Seconds are floored and kept
/// non-negative, the percentage is kept in [0, 100] and non-finite values
/// count as zero.
pub fn clamp_progress(watched_seconds: f64, watched_pct: f64) -> (i64, f64) {
    let seconds = if watched_seconds.is_finite() {
        watched_seconds.floor().max(0.0) as i64
    } else {
        0
    };
    let pct = if watched_pct.is_finite() {
        watched_pct.clamp(0.0, 100.0)
    } else {
        0.0
    };
    (seconds, pct)
}

/// Records a playback ping. Never touches the event log or balances.
pub async fn record_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    unit_id: &str,
    watched_seconds: f64,
    watched_pct: f64,
) -> Result<(), LedgerError> {
    let pool = proxy.pool();
    catalog::get_unit(pool, unit_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("unit", unit_id))?;

    let (seconds, pct) = clamp_progress(watched_seconds, watched_pct);
    progress::upsert_progress(pool, user_id, unit_id, seconds, pct, Utc::now()).await?;

    tracing::trace!(user_id, unit_id, seconds, pct, "progress recorded");
    Ok(())
}

pub async fn get_unit_status(
    proxy: &DatabaseProxy,
    user_id: &str,
    unit_id: &str,
) -> Result<UnitStatus, LedgerError> {
    let pool = proxy.pool();
    let unit = catalog::get_unit(pool, unit_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("unit", unit_id))?;

    let row = progress::get_progress(pool, user_id, unit_id).await?;
    let is_completed = row.as_ref().map(|p| p.is_completed()).unwrap_or(false);

    let is_locked = if unit.requires_completed_previous && !is_completed {
        match catalog::previous_unit_id(pool, &unit.module_id, unit.sort_index).await? {
            Some(previous) => !progress::is_unit_completed(pool, user_id, &previous).await?,
            None => false,
        }
    } else {
        false
    };

    Ok(UnitStatus {
        is_completed,
        watched_pct: row.as_ref().map(|p| p.watched_pct).unwrap_or(0.0),
        watched_seconds: row.as_ref().map(|p| p.watched_seconds).unwrap_or(0),
        unit_xp: unit.xp_value.unwrap_or(0),
        is_locked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_floors_seconds() {
        assert_eq!(clamp_progress(12.9, 50.0), (12, 50.0));
    }

    #[test]
    fn test_clamp_negative_and_out_of_range() {
        assert_eq!(clamp_progress(-5.0, -1.0), (0, 0.0));
        assert_eq!(clamp_progress(30.0, 140.0), (30, 100.0));
    }

    #[test]
    fn test_clamp_non_finite() {
        assert_eq!(clamp_progress(f64::NAN, f64::INFINITY), (0, 0.0));
    }
}
