//! Participant Registry
//!
//! Tracks each person's role, team membership, leadership flag and VR budget
//! within one event. Role and membership changes that revoke allocation
//! authority purge the participant's reward and vote rows in the same
//! transaction, and team departures run through the Team Manager cascade.

use crate::db::{queries, DbPool};
use crate::error::{LedgerError, Result};
use crate::models::{Event, EventStatus, JoinCredential, Participant, Role};
use crate::teams;
use sha2::{Digest, Sha256};
use tokio_postgres::GenericClient;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Shared invite token for self-service guest/committee joins
pub fn invite_token_for(event: &Event, role: Role) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", event.invite_secret, role.as_str()));
    hex::encode(hasher.finalize())
}

/// Per-user grant signature, minted by the invite collaborator for
/// organizer/presenter joins
pub fn join_grant_for(event: &Event, user_id: &str, role: Role) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}:join:{}:{}:{}",
        event.invite_secret,
        event.id,
        user_id,
        role.as_str()
    ));
    hex::encode(hasher.finalize())
}

fn verify_credential(
    event: &Event,
    user_id: &str,
    role: Role,
    credential: &JoinCredential,
) -> Result<()> {
    match credential {
        JoinCredential::InviteToken(token) => {
            // Tokens are only minted for the self-service roles
            if !role.is_giver() || *token != invite_token_for(event, role) {
                return Err(LedgerError::InvalidToken);
            }
            Ok(())
        }
        JoinCredential::GrantSignature(signature) => {
            if *signature != join_grant_for(event, user_id, role) {
                return Err(LedgerError::InvalidSignature);
            }
            Ok(())
        }
    }
}

// ============================================================================
// SHARED AUTHORITY CHECKS
// ============================================================================

pub(crate) async fn require_participant<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    user_id: &str,
) -> Result<Participant> {
    queries::get_participant_by_user(client, event_id, user_id)
        .await?
        .ok_or_else(|| LedgerError::Forbidden("not a participant of this event".into()))
}

pub(crate) async fn require_organizer<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    user_id: &str,
) -> Result<Participant> {
    let actor = require_participant(client, event_id, user_id).await?;
    if actor.role != Role::Organizer {
        return Err(LedgerError::Forbidden("organizer role required".into()));
    }
    Ok(actor)
}

pub(crate) async fn require_organizer_leader<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    user_id: &str,
) -> Result<Participant> {
    let actor = require_organizer(client, event_id, user_id).await?;
    if !actor.is_leader {
        return Err(LedgerError::Forbidden("organizer leadership required".into()));
    }
    Ok(actor)
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Join an event under a role, presenting an invite token or grant signature.
/// The VR budget is copied from the event's per-role default at this moment.
pub async fn join(
    pool: &DbPool,
    event_id: Uuid,
    user_id: &str,
    role: Role,
    credential: JoinCredential,
) -> Result<Participant> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;

    // Token joins are self-service and only make sense once the event is
    // visible; grant joins are how organizers staff a draft event.
    if matches!(credential, JoinCredential::InviteToken(_))
        && event.status != EventStatus::Published
    {
        return Err(LedgerError::EventNotActive);
    }

    verify_credential(&event, user_id, role, &credential)?;

    if queries::get_participant_by_user(&*tx, event_id, user_id)
        .await?
        .is_some()
    {
        return Err(LedgerError::AlreadyJoined);
    }

    let budget = event.budget_for(role);
    let row = tx
        .query_one(
            "INSERT INTO participants (event_id, user_id, role, virtual_reward)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
            &[&event_id, &user_id, &role.as_str(), &budget],
        )
        .await
        .map_err(|e| {
            if queries::is_unique_violation(&e) {
                LedgerError::AlreadyJoined
            } else {
                e.into()
            }
        })?;
    let participant_id: Uuid = row.get(0);

    let participant = queries::get_participant(&*tx, event_id, participant_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", participant_id))?;
    tx.commit().await?;

    info!(event_id = %event_id, user = %user_id, role = role.as_str(), "Participant joined");
    Ok(participant)
}

/// Change a participant's role.
///
/// A real change revokes the participant's allocation authority: their
/// giver-side reward rows and committee votes are purged, their VR budget is
/// re-assigned from the new role's default, and a presenter leaving the
/// presenter role departs their team first (cascading per team rules).
pub async fn set_role(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    participant_id: Uuid,
    new_role: Role,
) -> Result<Participant> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    let actor = require_organizer(&*tx, event_id, actor_user_id).await?;
    let target = queries::lock_participant(&*tx, event_id, participant_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", participant_id))?;

    if target.role == new_role {
        // Same role: nothing to revoke, nothing to cascade
        return Ok(target);
    }

    if target.role == Role::Organizer || new_role == Role::Organizer {
        if !actor.is_leader {
            return Err(LedgerError::Forbidden(
                "organizer leadership required to change organizer roles".into(),
            ));
        }
        if actor.id == target.id {
            return Err(LedgerError::Forbidden(
                "cannot change your own organizer role".into(),
            ));
        }
    }

    // Departure cascade runs before the role flips
    if target.role == Role::Presenter && target.team_id.is_some() {
        teams::handle_departure(&*tx, &target).await?;
    }

    // Authority to allocate is revoked with the role
    queries::purge_giver_state(&*tx, event_id, target.id).await?;

    let budget = event.budget_for(new_role);
    tx.execute(
        "UPDATE participants SET role = $2, virtual_reward = $3 WHERE id = $1",
        &[&target.id, &new_role.as_str(), &budget],
    )
    .await?;

    let updated = queries::get_participant(&*tx, event_id, target.id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", target.id))?;
    tx.commit().await?;

    info!(
        event_id = %event_id,
        participant = %participant_id,
        from = target.role.as_str(),
        to = new_role.as_str(),
        "Role changed"
    );
    Ok(updated)
}

/// Set or clear a participant's leadership flag
pub async fn set_leader(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    participant_id: Uuid,
    leader: bool,
) -> Result<Participant> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let actor = require_organizer(&*tx, event_id, actor_user_id).await?;
    let target = queries::lock_participant(&*tx, event_id, participant_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", participant_id))?;

    if target.role == Role::Organizer && !actor.is_leader {
        return Err(LedgerError::Forbidden(
            "organizer leadership required to change organizer leadership".into(),
        ));
    }

    if leader {
        if let Some(team_id) = target.team_id {
            // One leader per team: demote the current one in the same tx
            tx.execute(
                "UPDATE participants SET is_leader = FALSE WHERE team_id = $1 AND is_leader",
                &[&team_id],
            )
            .await?;
        }
        tx.execute(
            "UPDATE participants SET is_leader = TRUE WHERE id = $1",
            &[&target.id],
        )
        .await?;
    } else {
        if target.role == Role::Organizer && target.is_leader {
            let leaders = queries::count_organizer_leaders(&*tx, event_id).await?;
            if leaders <= 1 {
                return Err(LedgerError::Forbidden(
                    "cannot demote the only organizer leader".into(),
                ));
            }
        }
        if target.team_id.is_some() && target.is_leader {
            // Leadership only moves off a team via departure or dissolution
            return Err(LedgerError::Forbidden(
                "team leadership cannot be cleared while the team exists".into(),
            ));
        }
        tx.execute(
            "UPDATE participants SET is_leader = FALSE WHERE id = $1",
            &[&target.id],
        )
        .await?;
    }

    let updated = queries::get_participant(&*tx, event_id, target.id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", target.id))?;
    tx.commit().await?;
    Ok(updated)
}

/// Remove a participant from the event.
///
/// Team departures cascade per team rules; everything the participant gave
/// or voted as giver disappears with them.
pub async fn remove(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    participant_id: Uuid,
) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let actor = require_participant(&*tx, event_id, actor_user_id).await?;
    let target = queries::lock_participant(&*tx, event_id, participant_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", participant_id))?;

    let self_removal = actor.id == target.id;
    if !self_removal && actor.role != Role::Organizer {
        return Err(LedgerError::Forbidden(
            "only organizers may remove other participants".into(),
        ));
    }
    if target.role == Role::Organizer {
        if !actor.is_leader {
            return Err(LedgerError::Forbidden(
                "organizer leadership required to remove an organizer".into(),
            ));
        }
        if target.is_leader {
            let leaders = queries::count_organizer_leaders(&*tx, event_id).await?;
            if leaders <= 1 {
                return Err(LedgerError::Forbidden(
                    "the only organizer leader cannot be removed".into(),
                ));
            }
        }
    }

    if target.team_id.is_some() {
        teams::handle_departure(&*tx, &target).await?;
    }

    queries::purge_giver_state(&*tx, event_id, target.id).await?;
    tx.execute(
        "DELETE FROM comments WHERE event_id = $1 AND author_id = $2",
        &[&event_id, &target.id],
    )
    .await?;
    tx.execute(
        "DELETE FROM event_ratings WHERE event_id = $1 AND rater_id = $2",
        &[&event_id, &target.id],
    )
    .await?;
    tx.execute("DELETE FROM participants WHERE id = $1", &[&target.id])
        .await?;

    tx.commit().await?;

    warn!(event_id = %event_id, participant = %participant_id, "Participant removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_event() -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Expo".into(),
            status: EventStatus::Published,
            start_view: None,
            end_view: None,
            vr_guest: 100,
            vr_committee: 200,
            team_cap_enabled: false,
            team_cap_guest: None,
            team_cap_committee: None,
            max_teams: None,
            max_team_members: None,
            invite_secret: "0123456789abcdef".into(),
            created_by: "owner".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_invite_token_accepted_for_giver_roles() {
        let event = test_event();
        let token = invite_token_for(&event, Role::Guest);
        let cred = JoinCredential::InviteToken(token);
        assert!(verify_credential(&event, "alice", Role::Guest, &cred).is_ok());
    }

    #[test]
    fn test_invite_token_is_role_scoped() {
        let event = test_event();
        let guest_token = invite_token_for(&event, Role::Guest);
        let cred = JoinCredential::InviteToken(guest_token);
        assert!(matches!(
            verify_credential(&event, "alice", Role::Committee, &cred),
            Err(LedgerError::InvalidToken)
        ));
    }

    #[test]
    fn test_invite_token_rejected_for_presenter() {
        let event = test_event();
        let token = invite_token_for(&event, Role::Guest);
        let cred = JoinCredential::InviteToken(token);
        assert!(matches!(
            verify_credential(&event, "alice", Role::Presenter, &cred),
            Err(LedgerError::InvalidToken)
        ));
    }

    #[test]
    fn test_grant_signature_binds_user_and_role() {
        let event = test_event();
        let sig = join_grant_for(&event, "bob", Role::Presenter);
        let cred = JoinCredential::GrantSignature(sig.clone());
        assert!(verify_credential(&event, "bob", Role::Presenter, &cred).is_ok());
        assert!(matches!(
            verify_credential(&event, "mallory", Role::Presenter, &cred),
            Err(LedgerError::InvalidSignature)
        ));
        assert!(matches!(
            verify_credential(&event, "bob", Role::Organizer, &cred),
            Err(LedgerError::InvalidSignature)
        ));
    }
}
