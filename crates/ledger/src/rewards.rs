//! Reward Ledger
//!
//! Budget-constrained allocation of VR from one giver to teams, flat or
//! broken into named categories. `give` and `reset` are atomic re-balancing
//! operations: each runs in a single transaction that locks the giver's
//! participant row first, so the balance check is never evaluated against a
//! stale aggregate when the same giver hits several teams concurrently.

use crate::db::{queries, DbPool};
use crate::error::{LedgerError, Result};
use crate::models::{Allocation, Participant, ResetResult, RewardSnapshot};
use crate::registry::require_participant;
use chrono::Utc;
use tokio_postgres::GenericClient;
use tracing::{debug, info};
use uuid::Uuid;

/// Balance invariant: everything committed elsewhere plus this call's total
/// must fit the giver's static budget.
fn check_budget(budget: i64, committed_elsewhere: i64, requested: i64) -> Result<()> {
    // checked_add: a request large enough to overflow the sum cannot fit
    // any budget either
    let fits = committed_elsewhere
        .checked_add(requested)
        .is_some_and(|total| total <= budget);
    if !fits {
        return Err(LedgerError::InsufficientBalance {
            budget,
            committed: committed_elsewhere,
            requested,
        });
    }
    Ok(())
}

/// Common preconditions for give/reset: active event, giver role, team in
/// event, and the giver's row locked for the rest of the transaction.
async fn locked_giver<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    team_id: Uuid,
    giver_user_id: &str,
) -> Result<(crate::models::Event, Participant)> {
    let event = queries::get_event(client, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    if !event.is_active(Utc::now()) {
        return Err(LedgerError::EventNotActive);
    }

    let giver = require_participant(client, event_id, giver_user_id).await?;
    if !giver.role.is_giver() {
        return Err(LedgerError::Forbidden(
            "only guests and committee members hold a VR budget".into(),
        ));
    }

    queries::get_team(client, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;

    // Re-read under lock; the pre-lock copy may already be stale
    let giver = queries::lock_participant(client, event_id, giver.id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", giver.id))?;
    Ok((event, giver))
}

/// Allocate VR to a team, replacing the giver's previous allocation to it.
///
/// Categorized mode replaces all of the giver's category rows for the team
/// and removes any flat row; flat mode does the opposite. Either way the
/// giver ends up in exactly one mode for this team.
pub async fn give(
    pool: &DbPool,
    event_id: Uuid,
    team_id: Uuid,
    giver_user_id: &str,
    allocation: Allocation,
) -> Result<RewardSnapshot> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let (event, giver) = locked_giver(&*tx, event_id, team_id, giver_user_id).await?;

    if let Allocation::Categorized(entries) = &allocation {
        let known = queries::event_category_ids(&*tx, event_id).await?;
        for entry in entries {
            if !known.contains(&entry.category_id) {
                return Err(LedgerError::not_found("category", entry.category_id));
            }
        }
    }

    let total = allocation.total();
    if let Some(cap) = event.team_cap_for(giver.role) {
        if total > cap {
            return Err(LedgerError::ExceedsTeamCap { cap, requested: total });
        }
    }

    let committed_elsewhere =
        queries::committed_outside_team(&*tx, event_id, giver.id, team_id).await?;
    check_budget(giver.virtual_reward, committed_elsewhere, total)?;

    match &allocation {
        Allocation::Flat(amount) => {
            queries::delete_categorized_rewards(&*tx, team_id, giver.id).await?;
            if *amount == 0 {
                queries::delete_flat_reward(&*tx, team_id, giver.id).await?;
            } else {
                queries::upsert_flat_reward(&*tx, event_id, team_id, giver.id, *amount).await?;
            }
        }
        Allocation::Categorized(entries) => {
            queries::delete_flat_reward(&*tx, team_id, giver.id).await?;
            queries::delete_categorized_rewards(&*tx, team_id, giver.id).await?;
            queries::insert_categorized_rewards(&*tx, event_id, team_id, giver.id, entries)
                .await?;
        }
    }

    let total_used = queries::total_used(&*tx, event_id, giver.id).await?;
    tx.commit().await?;

    info!(
        event_id = %event_id,
        team_id = %team_id,
        giver = %giver_user_id,
        amount = total,
        total_used,
        "VR allocated"
    );
    Ok(RewardSnapshot {
        total_limit: giver.virtual_reward,
        total_used,
    })
}

/// Remove the giver's allocation (both modes) from a team.
/// Removing nothing is a no-op, not an error.
pub async fn reset(
    pool: &DbPool,
    event_id: Uuid,
    team_id: Uuid,
    giver_user_id: &str,
) -> Result<ResetResult> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let (_event, giver) = locked_giver(&*tx, event_id, team_id, giver_user_id).await?;

    let flat = queries::delete_flat_reward(&*tx, team_id, giver.id).await?;
    let categorized = queries::delete_categorized_rewards(&*tx, team_id, giver.id).await?;
    let removed = flat + categorized > 0;

    let total_used = queries::total_used(&*tx, event_id, giver.id).await?;
    tx.commit().await?;

    if removed {
        info!(event_id = %event_id, team_id = %team_id, giver = %giver_user_id, "VR reset");
    } else {
        debug!(event_id = %event_id, team_id = %team_id, giver = %giver_user_id, "VR reset no-op");
    }
    Ok(ResetResult {
        snapshot: RewardSnapshot {
            total_limit: giver.virtual_reward,
            total_used,
        },
        removed,
    })
}

/// Current budget snapshot for a giver, outside any write path
pub async fn snapshot(pool: &DbPool, event_id: Uuid, giver_user_id: &str) -> Result<RewardSnapshot> {
    let client = pool.get().await?;
    let giver = require_participant(&**client, event_id, giver_user_id).await?;
    if !giver.role.is_giver() {
        return Err(LedgerError::Forbidden(
            "only guests and committee members hold a VR budget".into(),
        ));
    }
    let total_used = queries::total_used(&**client, event_id, giver.id).await?;
    Ok(RewardSnapshot {
        total_limit: giver.virtual_reward,
        total_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows_exact_fit() {
        assert!(check_budget(100, 60, 40).is_ok());
        assert!(check_budget(100, 0, 100).is_ok());
        assert!(check_budget(100, 0, 0).is_ok());
    }

    #[test]
    fn test_budget_rejects_overcommit() {
        // Guest with budget 100 gave 60 to team A; 50 to team B must fail
        let err = check_budget(100, 60, 50).unwrap_err();
        match err {
            LedgerError::InsufficientBalance {
                budget,
                committed,
                requested,
            } => {
                assert_eq!(budget, 100);
                assert_eq!(committed, 60);
                assert_eq!(requested, 50);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_budget_rejects_request_that_overflows_sum() {
        // committed + requested would wrap past i64::MAX; must reject, not
        // wrap negative and pass
        let err = check_budget(100, 60, i64::MAX).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        let err = check_budget(i64::MAX, i64::MAX, 1).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert!(check_budget(i64::MAX, 0, i64::MAX).is_ok());
    }

    #[test]
    fn test_budget_after_reset() {
        // After resetting team A the same 50 fits
        assert!(check_budget(100, 0, 50).is_ok());
    }

    #[test]
    fn test_rebalancing_same_team_does_not_double_count() {
        // 70 already on this team is excluded from committed_elsewhere, so
        // lowering it to 40 passes even with 30 on other teams
        assert!(check_budget(100, 30, 40).is_ok());
    }
}
