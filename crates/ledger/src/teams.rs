//! Team Manager
//!
//! Owns team lifecycle and the departure cascades. The cascade is one
//! transactional detach-then-delete routine shared by every trigger site
//! (role change, removal, member self-departure) instead of relying on
//! database cascade configuration.

use crate::db::{queries, DbPool};
use crate::error::{LedgerError, Result};
use crate::models::{Participant, Role, Team, TeamProfile};
use crate::registry::require_participant;
use tokio_postgres::GenericClient;
use tracing::info;
use uuid::Uuid;

/// Create a team; the creating presenter becomes its leader atomically
pub async fn create(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    name: &str,
) -> Result<Team> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("team name must not be empty".into()));
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    let actor = require_participant(&*tx, event_id, actor_user_id).await?;

    if actor.role != Role::Presenter {
        return Err(LedgerError::Forbidden("only presenters may create teams".into()));
    }
    if actor.team_id.is_some() {
        return Err(LedgerError::AlreadyOnTeam);
    }
    if let Some(max_teams) = event.max_teams {
        let count = queries::count_teams(&*tx, event_id).await?;
        if count >= max_teams as i64 {
            return Err(LedgerError::CapacityReached(format!(
                "event allows at most {max_teams} teams"
            )));
        }
    }

    let row = tx
        .query_one(
            "INSERT INTO teams (event_id, name) VALUES ($1, $2) RETURNING id",
            &[&event_id, &name],
        )
        .await?;
    let team_id: Uuid = row.get(0);

    tx.execute(
        "UPDATE participants SET team_id = $2, is_leader = TRUE WHERE id = $1",
        &[&actor.id, &team_id],
    )
    .await?;

    let team = queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    tx.commit().await?;

    info!(event_id = %event_id, team_id = %team_id, leader = %actor_user_id, "Team created");
    Ok(team)
}

/// Update the team's name/description/cover; leader or organizer only
pub async fn update_profile(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    team_id: Uuid,
    profile: TeamProfile,
) -> Result<Team> {
    if let Some(name) = &profile.name {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("team name must not be empty".into()));
        }
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let team = queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    let actor = require_participant(&*tx, event_id, actor_user_id).await?;
    require_team_authority(&actor, &team)?;

    tx.execute(
        "UPDATE teams SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            cover_url = COALESCE($4, cover_url)
         WHERE id = $1",
        &[&team_id, &profile.name, &profile.description, &profile.cover_url],
    )
    .await?;

    let team = queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    tx.commit().await?;
    Ok(team)
}

/// Add a presenter without a team to this team; leader only
pub async fn add_member(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    team_id: Uuid,
    target_user_id: &str,
) -> Result<Participant> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;

    let actor = require_participant(&*tx, event_id, actor_user_id).await?;
    if actor.team_id != Some(team_id) || !actor.is_leader {
        return Err(LedgerError::Forbidden("only the team leader may add members".into()));
    }

    if let Some(max_members) = event.max_team_members {
        let count = queries::count_team_members(&*tx, team_id).await?;
        if count >= max_members as i64 {
            return Err(LedgerError::CapacityReached(format!(
                "team allows at most {max_members} members"
            )));
        }
    }

    let target = queries::get_participant_by_user(&*tx, event_id, target_user_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", target_user_id))?;
    if target.role != Role::Presenter {
        return Err(LedgerError::InvalidInput(
            "only presenters can be team members".into(),
        ));
    }
    if target.team_id.is_some() {
        return Err(LedgerError::AlreadyOnTeam);
    }

    tx.execute(
        "UPDATE participants SET team_id = $2 WHERE id = $1",
        &[&target.id, &team_id],
    )
    .await?;

    let updated = queries::get_participant(&*tx, event_id, target.id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", target.id))?;
    tx.commit().await?;

    info!(team_id = %team_id, member = %target_user_id, "Team member added");
    Ok(updated)
}

/// Remove a member. Any member may remove themself; only the leader may
/// remove others. A departing leader dissolves the team.
pub async fn remove_member(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    team_id: Uuid,
    target_participant_id: Uuid,
) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    let actor = require_participant(&*tx, event_id, actor_user_id).await?;
    let target = queries::lock_participant(&*tx, event_id, target_participant_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("participant", target_participant_id))?;

    if target.team_id != Some(team_id) {
        return Err(LedgerError::not_found("team member", target_participant_id));
    }

    let self_removal = actor.id == target.id;
    if !self_removal && (actor.team_id != Some(team_id) || !actor.is_leader) {
        return Err(LedgerError::Forbidden(
            "only the team leader may remove other members".into(),
        ));
    }
    if target.is_leader && !self_removal {
        return Err(LedgerError::Forbidden(
            "the leader cannot be removed; dissolve the team instead".into(),
        ));
    }

    handle_departure(&*tx, &target).await?;
    tx.commit().await?;

    info!(team_id = %team_id, member = %target_participant_id, "Team member removed");
    Ok(())
}

/// Dissolve a team explicitly; leader or organizer only
pub async fn dissolve(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    team_id: Uuid,
) -> Result<()> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let team = queries::get_team(&*tx, event_id, team_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    let actor = require_participant(&*tx, event_id, actor_user_id).await?;
    require_team_authority(&actor, &team)?;

    dissolve_team(&*tx, team_id).await?;
    tx.commit().await?;

    info!(event_id = %event_id, team_id = %team_id, "Team dissolved");
    Ok(())
}

fn require_team_authority(actor: &Participant, team: &Team) -> Result<()> {
    let is_team_leader = actor.team_id == Some(team.id) && actor.is_leader;
    if !is_team_leader && actor.role != Role::Organizer {
        return Err(LedgerError::Forbidden(
            "team leadership or organizer role required".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// DEPARTURE CASCADE
// ============================================================================

/// Apply the departure of `participant` from their team, inside the caller's
/// transaction.
///
/// A departing leader dissolves the team outright: every member is detached
/// and the team's rewards, votes and comments are deleted with it. A
/// departing non-leader only detaches; an emptied team is deleted, and a
/// leaderless-but-populated team promotes its earliest-joined member.
pub(crate) async fn handle_departure<C: GenericClient>(
    client: &C,
    participant: &Participant,
) -> Result<()> {
    let team_id = match participant.team_id {
        Some(team_id) => team_id,
        None => return Ok(()),
    };

    if participant.is_leader {
        dissolve_team(client, team_id).await?;
        info!(team_id = %team_id, "Leader departed, team dissolved");
        return Ok(());
    }

    client
        .execute(
            "UPDATE participants SET team_id = NULL, is_leader = FALSE WHERE id = $1",
            &[&participant.id],
        )
        .await?;

    let remaining = queries::count_team_members(client, team_id).await?;
    if remaining == 0 {
        dissolve_team(client, team_id).await?;
        return Ok(());
    }

    // A populated team should still have its leader; promote the
    // earliest-joined member if it somehow does not.
    client
        .execute(
            "UPDATE participants SET is_leader = TRUE
             WHERE id = (
                SELECT id FROM participants
                WHERE team_id = $1 ORDER BY joined_at ASC LIMIT 1
             )
             AND NOT EXISTS (
                SELECT 1 FROM participants WHERE team_id = $1 AND is_leader
             )",
            &[&team_id],
        )
        .await?;
    Ok(())
}

/// Detach every member, drop everything referencing the team, delete the team
pub(crate) async fn dissolve_team<C: GenericClient>(client: &C, team_id: Uuid) -> Result<()> {
    queries::detach_members(client, team_id).await?;
    queries::delete_team_state(client, team_id).await?;
    Ok(())
}
