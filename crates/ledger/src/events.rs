//! Event administration
//!
//! The ledger needs events to exist before anyone can participate; this
//! module owns that lifecycle: create (event plus its organizer-leader in one
//! transaction), publish, settings updates, and the named category /
//! special-reward registries that give/vote operations validate against.

use crate::db::queries::{self, is_unique_violation};
use crate::db::DbPool;
use crate::error::{LedgerError, Result};
use crate::models::{Event, EventSettings, RewardCategory, Role, SpecialReward};
use crate::registry::require_organizer_leader;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

fn mint_invite_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Create an event in draft state. The creator becomes its organizer-leader
/// in the same transaction.
pub async fn create_event(
    pool: &DbPool,
    creator_user_id: &str,
    name: &str,
    settings: EventSettings,
) -> Result<Event> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("event name must not be empty".into()));
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let secret = mint_invite_secret();
    let row = tx
        .query_one(
            "INSERT INTO events
                 (name, status, start_view, end_view, vr_guest, vr_committee,
                  team_cap_enabled, team_cap_guest, team_cap_committee,
                  max_teams, max_team_members, invite_secret, created_by)
             VALUES ($1, 'draft', $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING id",
            &[
                &name,
                &settings.start_view,
                &settings.end_view,
                &settings.vr_guest.unwrap_or(0),
                &settings.vr_committee.unwrap_or(0),
                &settings.team_cap_enabled.unwrap_or(false),
                &settings.team_cap_guest,
                &settings.team_cap_committee,
                &settings.max_teams,
                &settings.max_team_members,
                &secret,
                &creator_user_id,
            ],
        )
        .await?;
    let event_id: Uuid = row.get(0);

    tx.execute(
        "INSERT INTO participants (event_id, user_id, role, is_leader, virtual_reward)
         VALUES ($1, $2, $3, TRUE, 0)",
        &[&event_id, &creator_user_id, &Role::Organizer.as_str()],
    )
    .await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    tx.commit().await?;

    info!(event_id = %event_id, creator = %creator_user_id, "Event created");
    Ok(event)
}

pub async fn get_event(pool: &DbPool, event_id: Uuid) -> Result<Event> {
    let client = pool.get().await?;
    queries::get_event(&**client, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))
}

/// Publish a draft event, opening it for joins and (window permitting) scoring
pub async fn publish_event(pool: &DbPool, event_id: Uuid, actor_user_id: &str) -> Result<Event> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    require_organizer_leader(&*tx, event_id, actor_user_id).await?;
    tx.execute(
        "UPDATE events SET status = 'published' WHERE id = $1",
        &[&event_id],
    )
    .await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    tx.commit().await?;

    info!(event_id = %event_id, "Event published");
    Ok(event)
}

/// Apply a partial settings update; absent fields keep their current value
pub async fn update_settings(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    settings: EventSettings,
) -> Result<Event> {
    if let Some(name) = &settings.name {
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidInput("event name must not be empty".into()));
        }
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    require_organizer_leader(&*tx, event_id, actor_user_id).await?;
    tx.execute(
        "UPDATE events SET
            name = COALESCE($2, name),
            start_view = COALESCE($3, start_view),
            end_view = COALESCE($4, end_view),
            vr_guest = COALESCE($5, vr_guest),
            vr_committee = COALESCE($6, vr_committee),
            team_cap_enabled = COALESCE($7, team_cap_enabled),
            team_cap_guest = COALESCE($8, team_cap_guest),
            team_cap_committee = COALESCE($9, team_cap_committee),
            max_teams = COALESCE($10, max_teams),
            max_team_members = COALESCE($11, max_team_members)
         WHERE id = $1",
        &[
            &event_id,
            &settings.name,
            &settings.start_view,
            &settings.end_view,
            &settings.vr_guest,
            &settings.vr_committee,
            &settings.team_cap_enabled,
            &settings.team_cap_guest,
            &settings.team_cap_committee,
            &settings.max_teams,
            &settings.max_team_members,
        ],
    )
    .await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    tx.commit().await?;
    Ok(event)
}

/// Register a named reward category on the event
pub async fn add_category(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    name: &str,
) -> Result<RewardCategory> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("category name must not be empty".into()));
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    require_organizer_leader(&*tx, event_id, actor_user_id).await?;
    let row = tx
        .query_one(
            "INSERT INTO reward_categories (event_id, name)
             VALUES ($1, $2)
             RETURNING id, event_id, name",
            &[&event_id, &name],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(format!("category '{name}'"))
            } else {
                e.into()
            }
        })?;

    let category = RewardCategory {
        id: row.get(0),
        event_id: row.get(1),
        name: row.get(2),
    };
    tx.commit().await?;
    Ok(category)
}

/// Register a named special reward on the event
pub async fn add_special_reward(
    pool: &DbPool,
    event_id: Uuid,
    actor_user_id: &str,
    name: &str,
) -> Result<SpecialReward> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput(
            "special reward name must not be empty".into(),
        ));
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    require_organizer_leader(&*tx, event_id, actor_user_id).await?;
    let row = tx
        .query_one(
            "INSERT INTO special_rewards (event_id, name)
             VALUES ($1, $2)
             RETURNING id, event_id, name",
            &[&event_id, &name],
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(format!("special reward '{name}'"))
            } else {
                e.into()
            }
        })?;

    let reward = SpecialReward {
        id: row.get(0),
        event_id: row.get(1),
        name: row.get(2),
    };
    tx.commit().await?;
    Ok(reward)
}
