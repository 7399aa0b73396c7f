//! Special-Reward Vote Manager
//!
//! Committee members cast exclusive votes: one team per (reward, committee
//! member). `set_votes` carries full-replace semantics: the requested set
//! becomes the member's votes for that team, applied as a delete/insert diff
//! in one transaction. The pre-check gives good error messages; the unique
//! constraint on (reward_id, committee_id) is the authoritative guard when
//! two calls race.

use crate::db::{queries, DbPool};
use crate::error::{LedgerError, Result};
use crate::models::{Role, SpecialRewardVote};
use crate::registry::require_participant;
use chrono::Utc;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Diff the requested reward set against the current one.
/// Returns `(to_add, to_remove)`; duplicates in the request collapse.
fn plan_votes(current: &[Uuid], requested: &[Uuid]) -> (Vec<Uuid>, Vec<Uuid>) {
    let current: HashSet<Uuid> = current.iter().copied().collect();
    let requested: HashSet<Uuid> = requested.iter().copied().collect();
    let to_add = requested.difference(&current).copied().collect();
    let to_remove = current.difference(&requested).copied().collect();
    (to_add, to_remove)
}

/// Replace the committee member's votes for a team with `reward_ids`
pub async fn set_votes(
    pool: &DbPool,
    event_id: Uuid,
    team_id: Uuid,
    committee_user_id: &str,
    reward_ids: &[Uuid],
) -> Result<Vec<SpecialRewardVote>> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    if !event.is_active(Utc::now()) {
        return Err(LedgerError::EventNotActive);
    }

    let voter = require_participant(&*tx, event_id, committee_user_id).await?;
    if voter.role != Role::Committee {
        return Err(LedgerError::Forbidden(
            "only committee members vote on special rewards".into(),
        ));
    }

    queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;

    // Every requested reward must belong to this event
    let requested: Vec<Uuid> = reward_ids
        .iter()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let known = queries::special_reward_names(&*tx, event_id, &requested).await?;
    if known.len() != requested.len() {
        let known_ids: HashSet<Uuid> = known.iter().map(|r| r.id).collect();
        let missing = requested
            .iter()
            .find(|id| !known_ids.contains(id))
            .copied()
            .unwrap_or_default();
        return Err(LedgerError::not_found("special reward", missing));
    }

    let current: Vec<Uuid> = queries::votes_for_team(&*tx, team_id, voter.id)
        .await?
        .into_iter()
        .map(|v| v.reward_id)
        .collect();
    let (to_add, to_remove) = plan_votes(&current, &requested);

    // All-or-nothing: one conflicting reward fails the whole call
    if !to_add.is_empty() {
        let conflicts =
            queries::conflicting_reward_names(&*tx, voter.id, team_id, &to_add).await?;
        if !conflicts.is_empty() {
            return Err(LedgerError::RewardAlreadyAssigned { rewards: conflicts });
        }
    }

    if !to_remove.is_empty() {
        queries::delete_votes(&*tx, team_id, voter.id, &to_remove).await?;
    }
    for reward_id in &to_add {
        queries::insert_vote(&*tx, event_id, *reward_id, voter.id, team_id)
            .await
            .map_err(|e| {
                if queries::is_unique_violation(&e) {
                    // A concurrent call won the constraint race; report the
                    // same conflict the pre-check would have.
                    let name = known
                        .iter()
                        .find(|r| r.id == *reward_id)
                        .map(|r| r.name.clone())
                        .unwrap_or_else(|| reward_id.to_string());
                    LedgerError::RewardAlreadyAssigned { rewards: vec![name] }
                } else {
                    e.into()
                }
            })?;
    }

    let votes = queries::votes_for_team(&*tx, team_id, voter.id).await?;
    tx.commit().await?;

    info!(
        event_id = %event_id,
        team_id = %team_id,
        voter = %committee_user_id,
        added = to_add.len(),
        removed = to_remove.len(),
        "Special-reward votes replaced"
    );
    Ok(votes)
}

/// Clear the committee member's votes for one team only
pub async fn reset_votes(
    pool: &DbPool,
    event_id: Uuid,
    team_id: Uuid,
    committee_user_id: &str,
) -> Result<u64> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    if !event.is_active(Utc::now()) {
        return Err(LedgerError::EventNotActive);
    }

    let voter = require_participant(&*tx, event_id, committee_user_id).await?;
    if voter.role != Role::Committee {
        return Err(LedgerError::Forbidden(
            "only committee members vote on special rewards".into(),
        ));
    }
    queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;

    let deleted = queries::delete_all_votes_for_team(&*tx, team_id, voter.id).await?;
    tx.commit().await?;

    info!(
        event_id = %event_id,
        team_id = %team_id,
        voter = %committee_user_id,
        deleted,
        "Special-reward votes cleared"
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_plan_votes_disjoint() {
        let current = ids(2);
        let requested = ids(2);
        let (mut to_add, mut to_remove) = plan_votes(&current, &requested);
        to_add.sort();
        to_remove.sort();
        let mut want_add = requested.clone();
        want_add.sort();
        let mut want_remove = current.clone();
        want_remove.sort();
        assert_eq!(to_add, want_add);
        assert_eq!(to_remove, want_remove);
    }

    #[test]
    fn test_plan_votes_overlap_untouched() {
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();
        let add = Uuid::new_v4();
        let (to_add, to_remove) = plan_votes(&[keep, drop], &[keep, add]);
        assert_eq!(to_add, vec![add]);
        assert_eq!(to_remove, vec![drop]);
    }

    #[test]
    fn test_plan_votes_identical_is_noop() {
        let current = ids(3);
        let (to_add, to_remove) = plan_votes(&current, &current);
        assert!(to_add.is_empty());
        assert!(to_remove.is_empty());
    }

    #[test]
    fn test_plan_votes_duplicates_collapse() {
        let r = Uuid::new_v4();
        let (to_add, to_remove) = plan_votes(&[], &[r, r, r]);
        assert_eq!(to_add, vec![r]);
        assert!(to_remove.is_empty());
    }

    #[test]
    fn test_plan_votes_empty_request_clears() {
        let current = ids(2);
        let (to_add, mut to_remove) = plan_votes(&current, &[]);
        assert!(to_add.is_empty());
        to_remove.sort();
        let mut want = current.clone();
        want.sort();
        assert_eq!(to_remove, want);
    }
}
