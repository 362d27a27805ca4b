use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::db::operations::events;
use crate::db::DatabaseProxy;
use crate::services::gamification;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub balances_scanned: u64,
    pub bonuses_awarded: u64,
    pub balances_drifted: u64,
    pub failures: u64,
}

/// Heals missed module bonuses and rebuilds every balance from its events.
pub async fn run_reconcile_cycle(db: Arc<DatabaseProxy>) -> Result<ReconcileStats, super::WorkerError> {
    let start = Instant::now();
    info!("Starting XP reconciliation");

    let owners = events::list_event_owners(db.pool()).await?;
    let mut stats = ReconcileStats::default();

    for (user_id, course_id) in owners {
        stats.balances_scanned += 1;
        if let Err(e) = reconcile_owner(&db, &user_id, &course_id, &mut stats).await {
            stats.failures += 1;
            error!(user_id = %user_id, course_id = %course_id, error = %e, "Failed to reconcile balance");
        }
    }

    info!(
        balances_scanned = stats.balances_scanned,
        bonuses_awarded = stats.bonuses_awarded,
        balances_drifted = stats.balances_drifted,
        failures = stats.failures,
        duration_secs = start.elapsed().as_secs_f64(),
        "XP reconciliation completed"
    );

    Ok(stats)
}

async fn reconcile_owner(
    db: &DatabaseProxy,
    user_id: &str,
    course_id: &str,
    stats: &mut ReconcileStats,
) -> Result<(), super::WorkerError> {
    let modules = events::list_modules_with_completions(db.pool(), user_id, course_id).await?;
    for module_id in modules {
        if gamification::maybe_award_module_bonus(db, user_id, &module_id)
            .await?
            .is_some()
        {
            stats.bonuses_awarded += 1;
        }
    }

    let reconciliation = gamification::recompute_balance(db, user_id, course_id).await?;
    if reconciliation.drifted {
        stats.balances_drifted += 1;
    }
    Ok(())
}
