//! XP ledger orchestration: unit completion, module bonuses, course welcome
//! grants and balance reconciliation.
//!
//! Every operation that writes more than one row runs in a single
//! transaction whose first statement is a write, so SQLite takes the write
//! lock before anything is read. Idempotency comes from the unique
//! (user, scope, event type) key on `xp_events`, not from the reads.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::db::operations::{balance, catalog, events, progress};
use crate::db::operations::{NewXpEvent, XpBalance, XpEvent};
use crate::db::DatabaseProxy;
use crate::services::LedgerError;
use crate::types::{BalanceTotals, EventType, XpType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub awarded_xp: i64,
    pub next_unit_slug: Option<String>,
    pub already_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeOutcome {
    pub awarded_xp: i64,
    pub already_granted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub before: BalanceTotals,
    pub after: BalanceTotals,
    pub drifted: bool,
}

pub async fn complete_unit(
    proxy: &DatabaseProxy,
    user_id: &str,
    unit_id: &str,
) -> Result<CompletionOutcome, LedgerError> {
    let pool = proxy.pool();
    let ctx = catalog::get_unit_context(pool, unit_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("unit", unit_id))?;

    let xp_type = ctx.unit.xp_type();
    let xp_amount = ctx.unit.completion_xp();

    let mut tx = pool.begin().await?;
    let claimed = progress::claim_completion(&mut *tx, user_id, unit_id, Utc::now()).await?;

    if !claimed {
        tx.rollback().await?;
        tracing::debug!(user_id, unit_id, "unit already completed");

        // a bonus skipped by an earlier failure gets another chance on retries
        if xp_type == XpType::Mandatory {
            evaluate_module_bonus_logged(proxy, user_id, &ctx.module.id).await;
        }

        let next_unit_slug =
            catalog::next_unit_slug(pool, &ctx.module.id, ctx.unit.sort_index).await?;
        return Ok(CompletionOutcome {
            awarded_xp: 0,
            next_unit_slug,
            already_completed: true,
        });
    }

    let event = events::record_event_once(
        &mut *tx,
        &NewXpEvent {
            user_id,
            course_id: &ctx.course_id,
            module_id: Some(&ctx.module.id),
            unit_id: Some(unit_id),
            event_type: EventType::UnitCompleted,
            xp_amount,
            xp_type,
            metadata: Some(json!({
                "slug": ctx.unit.slug,
                "xpMode": ctx.unit.xp_mode.as_str(),
            })),
        },
    )
    .await?;

    let awarded_xp = match &event {
        Some(event) => {
            balance::apply_to_balance(&mut tx, user_id, &ctx.course_id, event.xp_amount, xp_type)
                .await?;
            event.xp_amount
        }
        None => 0,
    };
    tx.commit().await?;

    if event.is_some() && xp_type == XpType::Mandatory {
        evaluate_module_bonus_logged(proxy, user_id, &ctx.module.id).await;
    }

    let next_unit_slug = catalog::next_unit_slug(pool, &ctx.module.id, ctx.unit.sort_index).await?;

    tracing::info!(
        user_id,
        unit_id,
        course_id = %ctx.course_id,
        xp_type = xp_type.as_str(),
        awarded_xp,
        "unit completed"
    );

    Ok(CompletionOutcome {
        awarded_xp,
        next_unit_slug,
        already_completed: false,
    })
}

/// Bonus failures never undo the completion that triggered them.
async fn evaluate_module_bonus_logged(proxy: &DatabaseProxy, user_id: &str, module_id: &str) {
    if let Err(err) = maybe_award_module_bonus(proxy, user_id, module_id).await {
        tracing::warn!(error = %err, user_id, module_id, "module bonus evaluation failed");
    }
}

/// Grants the module bonus once every required unit has a mandatory
/// completion event. Safe to call any number of times.
pub async fn maybe_award_module_bonus(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
) -> Result<Option<XpEvent>, LedgerError> {
    let pool = proxy.pool();
    let module = catalog::get_module(pool, module_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("module", module_id))?;

    if module.is_optional {
        return Ok(None);
    }

    let units = catalog::list_module_units(pool, module_id).await?;
    let required: HashSet<&str> = units
        .iter()
        .filter(|unit| unit.is_required())
        .map(|unit| unit.id.as_str())
        .collect();
    if required.is_empty() {
        return Ok(None);
    }

    let completions = events::list_required_completions(pool, user_id, module_id).await?;
    let Some(bonus) = module_bonus_amount(&required, &completions, module.bonus_percent) else {
        return Ok(None);
    };

    let mut tx = pool.begin().await?;
    let event = events::record_event_once(
        &mut *tx,
        &NewXpEvent {
            user_id,
            course_id: &module.course_id,
            module_id: Some(module_id),
            unit_id: None,
            event_type: EventType::ModuleBonus,
            xp_amount: bonus,
            xp_type: XpType::Bonus,
            metadata: Some(json!({
                "bonusPercent": module.bonus_percent,
                "requiredUnits": required.len(),
            })),
        },
    )
    .await?;

    if let Some(event) = &event {
        balance::apply_to_balance(&mut tx, user_id, &module.course_id, event.xp_amount, XpType::Bonus)
            .await?;
    }
    tx.commit().await?;

    if event.is_some() {
        tracing::info!(user_id, module_id, bonus, "module bonus awarded");
    }

    Ok(event)
}

/// Bonus for a module given the required unit ids and the user's
/// (unitId, xp) mandatory completions. `None` until every required unit is
/// covered or when the rounded bonus is not positive.
pub fn module_bonus_amount(
    required: &HashSet<&str>,
    completions: &[(String, i64)],
    bonus_percent: i64,
) -> Option<i64> {
    let mut covered: HashSet<&str> = HashSet::new();
    let mut sum = 0i64;
    for (unit_id, xp) in completions {
        if required.contains(unit_id.as_str()) && covered.insert(unit_id.as_str()) {
            sum += xp;
        }
    }

    if covered.len() < required.len() {
        return None;
    }

    let bonus = (sum as f64 * bonus_percent as f64 / 100.0).round() as i64;
    (bonus > 0).then_some(bonus)
}

pub async fn grant_course_welcome(
    proxy: &DatabaseProxy,
    user_id: &str,
    course_id: &str,
) -> Result<WelcomeOutcome, LedgerError> {
    let pool = proxy.pool();
    catalog::get_course(pool, course_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("course", course_id))?;

    let config = catalog::get_course_config(pool, course_id).await?;
    if config.xp_welcome <= 0 {
        return Ok(WelcomeOutcome {
            awarded_xp: 0,
            already_granted: false,
        });
    }

    let mut tx = pool.begin().await?;
    let event = events::record_event_once(
        &mut *tx,
        &NewXpEvent {
            user_id,
            course_id,
            module_id: None,
            unit_id: None,
            event_type: EventType::CourseWelcome,
            xp_amount: config.xp_welcome,
            xp_type: XpType::Welcome,
            metadata: None,
        },
    )
    .await?;

    let outcome = match &event {
        Some(event) => {
            balance::apply_to_balance(&mut tx, user_id, course_id, event.xp_amount, XpType::Welcome)
                .await?;
            WelcomeOutcome {
                awarded_xp: event.xp_amount,
                already_granted: false,
            }
        }
        None => WelcomeOutcome {
            awarded_xp: 0,
            already_granted: true,
        },
    };
    tx.commit().await?;

    tracing::info!(user_id, course_id, awarded_xp = outcome.awarded_xp, "course welcome processed");
    Ok(outcome)
}

pub async fn get_balance(
    proxy: &DatabaseProxy,
    user_id: &str,
    course_id: &str,
) -> Result<XpBalance, LedgerError> {
    let pool = proxy.pool();
    catalog::get_course(pool, course_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("course", course_id))?;

    Ok(balance::get_balance(pool, user_id, course_id)
        .await?
        .unwrap_or_else(|| XpBalance::empty(user_id, course_id)))
}

pub async fn list_events(
    proxy: &DatabaseProxy,
    user_id: &str,
    course_id: &str,
) -> Result<Vec<XpEvent>, LedgerError> {
    let pool = proxy.pool();
    catalog::get_course(pool, course_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("course", course_id))?;

    Ok(events::list_events(pool, user_id, course_id).await?)
}

/// Authoritative rebuild of a balance from the event log.
pub async fn recompute_balance(
    proxy: &DatabaseProxy,
    user_id: &str,
    course_id: &str,
) -> Result<Reconciliation, LedgerError> {
    catalog::get_course(proxy.pool(), course_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("course", course_id))?;

    let mut tx = proxy.pool().begin().await?;
    let (before, after) = balance::recompute_from_events(&mut tx, user_id, course_id).await?;
    tx.commit().await?;

    let drifted = before != after;
    if drifted {
        tracing::warn!(
            user_id,
            course_id,
            before_total = before.xp_total,
            after_total = after.xp_total,
            "balance drift corrected"
        );
    }

    Ok(Reconciliation {
        before,
        after,
        drifted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required<'a>(ids: &[&'a str]) -> HashSet<&'a str> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_bonus_requires_every_required_unit() {
        let req = required(&["a", "b", "c"]);
        let completions = vec![("a".to_string(), 100), ("b".to_string(), 100)];
        assert_eq!(module_bonus_amount(&req, &completions, 10), None);
    }

    #[test]
    fn test_bonus_is_percentage_of_required_sum() {
        let req = required(&["a", "b", "c"]);
        let completions = vec![
            ("a".to_string(), 100),
            ("b".to_string(), 100),
            ("c".to_string(), 100),
        ];
        assert_eq!(module_bonus_amount(&req, &completions, 10), Some(30));
    }

    #[test]
    fn test_bonus_ignores_units_outside_required_set() {
        let req = required(&["a"]);
        let completions = vec![("a".to_string(), 100), ("extra".to_string(), 50)];
        assert_eq!(module_bonus_amount(&req, &completions, 10), Some(10));
    }

    #[test]
    fn test_bonus_rounds_half_up() {
        let req = required(&["a"]);
        assert_eq!(module_bonus_amount(&req, &[("a".to_string(), 25)], 10), Some(3));
        assert_eq!(module_bonus_amount(&req, &[("a".to_string(), 24)], 10), Some(2));
    }

    #[test]
    fn test_zero_bonus_is_not_granted() {
        let req = required(&["a"]);
        assert_eq!(module_bonus_amount(&req, &[("a".to_string(), 0)], 10), None);
        assert_eq!(module_bonus_amount(&req, &[("a".to_string(), 100)], 0), None);
        assert_eq!(module_bonus_amount(&req, &[("a".to_string(), 4)], 10), None);
    }
}
