//! Database queries for the Podium ledger (PostgreSQL)
//!
//! Helpers are generic over [`GenericClient`] so the ledger modules can call
//! them on a pooled client for plain reads and on an open transaction inside
//! an operation.

use crate::models::{
    CategoryAmount, Comment, Event, EventRating, EventStatus, Participant, Role, SpecialReward,
    SpecialRewardVote, Team,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::{GenericClient, Row};
use uuid::Uuid;

type DbResult<T> = std::result::Result<T, tokio_postgres::Error>;

/// Whether a database error is a 23505 unique-constraint violation
pub fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const EVENT_COLS: &str = "id, name, status, start_view, end_view, vr_guest, vr_committee, \
     team_cap_enabled, team_cap_guest, team_cap_committee, max_teams, max_team_members, \
     invite_secret, created_by, created_at";

fn event_from_row(row: &Row) -> Event {
    Event {
        id: row.get(0),
        name: row.get(1),
        status: EventStatus::from(row.get::<_, &str>(2)),
        start_view: row.get(3),
        end_view: row.get(4),
        vr_guest: row.get(5),
        vr_committee: row.get(6),
        team_cap_enabled: row.get(7),
        team_cap_guest: row.get(8),
        team_cap_committee: row.get(9),
        max_teams: row.get(10),
        max_team_members: row.get(11),
        invite_secret: row.get(12),
        created_by: row.get(13),
        created_at: row.get(14),
    }
}

const PARTICIPANT_COLS: &str =
    "id, event_id, user_id, role, is_leader, team_id, virtual_reward, joined_at";

fn participant_from_row(row: &Row) -> Participant {
    Participant {
        id: row.get(0),
        event_id: row.get(1),
        user_id: row.get(2),
        role: Role::from(row.get::<_, &str>(3)),
        is_leader: row.get(4),
        team_id: row.get(5),
        virtual_reward: row.get(6),
        joined_at: row.get(7),
    }
}

const TEAM_COLS: &str = "id, event_id, name, description, cover_url, created_at";

fn team_from_row(row: &Row) -> Team {
    Team {
        id: row.get(0),
        event_id: row.get(1),
        name: row.get(2),
        description: row.get(3),
        cover_url: row.get(4),
        created_at: row.get(5),
    }
}

// ============================================================================
// EVENTS
// ============================================================================

pub async fn get_event<C: GenericClient>(client: &C, event_id: Uuid) -> DbResult<Option<Event>> {
    let row = client
        .query_opt(
            &format!("SELECT {EVENT_COLS} FROM events WHERE id = $1"),
            &[&event_id],
        )
        .await?;
    Ok(row.as_ref().map(event_from_row))
}

pub async fn event_category_ids<C: GenericClient>(
    client: &C,
    event_id: Uuid,
) -> DbResult<Vec<Uuid>> {
    let rows = client
        .query(
            "SELECT id FROM reward_categories WHERE event_id = $1",
            &[&event_id],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

pub async fn special_reward_names<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    reward_ids: &[Uuid],
) -> DbResult<Vec<SpecialReward>> {
    let rows = client
        .query(
            "SELECT id, event_id, name FROM special_rewards
             WHERE event_id = $1 AND id = ANY($2)",
            &[&event_id, &reward_ids],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| SpecialReward {
            id: r.get(0),
            event_id: r.get(1),
            name: r.get(2),
        })
        .collect())
}

// ============================================================================
// PARTICIPANTS
// ============================================================================

pub async fn get_participant<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    participant_id: Uuid,
) -> DbResult<Option<Participant>> {
    let row = client
        .query_opt(
            &format!("SELECT {PARTICIPANT_COLS} FROM participants WHERE event_id = $1 AND id = $2"),
            &[&event_id, &participant_id],
        )
        .await?;
    Ok(row.as_ref().map(participant_from_row))
}

pub async fn get_participant_by_user<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    user_id: &str,
) -> DbResult<Option<Participant>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PARTICIPANT_COLS} FROM participants WHERE event_id = $1 AND user_id = $2"
            ),
            &[&event_id, &user_id],
        )
        .await?;
    Ok(row.as_ref().map(participant_from_row))
}

/// Load a participant and take a row lock on it for the rest of the
/// transaction. Serializes every balance-touching operation per giver.
pub async fn lock_participant<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    participant_id: Uuid,
) -> DbResult<Option<Participant>> {
    let row = client
        .query_opt(
            &format!(
                "SELECT {PARTICIPANT_COLS} FROM participants
                 WHERE event_id = $1 AND id = $2 FOR UPDATE"
            ),
            &[&event_id, &participant_id],
        )
        .await?;
    Ok(row.as_ref().map(participant_from_row))
}

pub async fn team_members<C: GenericClient>(client: &C, team_id: Uuid) -> DbResult<Vec<Participant>> {
    let rows = client
        .query(
            &format!(
                "SELECT {PARTICIPANT_COLS} FROM participants
                 WHERE team_id = $1 ORDER BY joined_at ASC"
            ),
            &[&team_id],
        )
        .await?;
    Ok(rows.iter().map(participant_from_row).collect())
}

pub async fn count_organizer_leaders<C: GenericClient>(client: &C, event_id: Uuid) -> DbResult<i64> {
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM participants
             WHERE event_id = $1 AND role = 'organizer' AND is_leader",
            &[&event_id],
        )
        .await?;
    Ok(row.get(0))
}

// ============================================================================
// TEAMS
// ============================================================================

pub async fn get_team<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    team_id: Uuid,
) -> DbResult<Option<Team>> {
    let row = client
        .query_opt(
            &format!("SELECT {TEAM_COLS} FROM teams WHERE event_id = $1 AND id = $2"),
            &[&event_id, &team_id],
        )
        .await?;
    Ok(row.as_ref().map(team_from_row))
}

pub async fn count_teams<C: GenericClient>(client: &C, event_id: Uuid) -> DbResult<i64> {
    let row = client
        .query_one("SELECT COUNT(*) FROM teams WHERE event_id = $1", &[&event_id])
        .await?;
    Ok(row.get(0))
}

pub async fn count_team_members<C: GenericClient>(client: &C, team_id: Uuid) -> DbResult<i64> {
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM participants WHERE team_id = $1",
            &[&team_id],
        )
        .await?;
    Ok(row.get(0))
}

/// Detach every member of a team: membership and leadership cleared together
pub async fn detach_members<C: GenericClient>(client: &C, team_id: Uuid) -> DbResult<u64> {
    client
        .execute(
            "UPDATE participants SET team_id = NULL, is_leader = FALSE WHERE team_id = $1",
            &[&team_id],
        )
        .await
}

/// Drop every row that references a team: allocations, votes, comments,
/// then the team itself. Callers run this inside the triggering transaction.
pub async fn delete_team_state<C: GenericClient>(client: &C, team_id: Uuid) -> DbResult<()> {
    client
        .execute("DELETE FROM team_rewards WHERE team_id = $1", &[&team_id])
        .await?;
    client
        .execute(
            "DELETE FROM team_reward_categories WHERE team_id = $1",
            &[&team_id],
        )
        .await?;
    client
        .execute(
            "DELETE FROM special_reward_votes WHERE team_id = $1",
            &[&team_id],
        )
        .await?;
    client
        .execute("DELETE FROM comments WHERE team_id = $1", &[&team_id])
        .await?;
    client
        .execute("DELETE FROM teams WHERE id = $1", &[&team_id])
        .await?;
    Ok(())
}

// ============================================================================
// REWARD ALLOCATIONS
// ============================================================================

/// VR the giver has committed to teams other than `exclude_team`
/// (both flat and categorized rows)
pub async fn committed_outside_team<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    giver_id: Uuid,
    exclude_team: Uuid,
) -> DbResult<i64> {
    let row = client
        .query_one(
            "SELECT COALESCE((SELECT SUM(amount) FROM team_rewards
                              WHERE event_id = $1 AND giver_id = $2 AND team_id <> $3), 0)::BIGINT
                  + COALESCE((SELECT SUM(amount) FROM team_reward_categories
                              WHERE event_id = $1 AND giver_id = $2 AND team_id <> $3), 0)::BIGINT",
            &[&event_id, &giver_id, &exclude_team],
        )
        .await?;
    Ok(row.get(0))
}

/// VR the giver has committed across every team, both modes
pub async fn total_used<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    giver_id: Uuid,
) -> DbResult<i64> {
    let row = client
        .query_one(
            "SELECT COALESCE((SELECT SUM(amount) FROM team_rewards
                              WHERE event_id = $1 AND giver_id = $2), 0)::BIGINT
                  + COALESCE((SELECT SUM(amount) FROM team_reward_categories
                              WHERE event_id = $1 AND giver_id = $2), 0)::BIGINT",
            &[&event_id, &giver_id],
        )
        .await?;
    Ok(row.get(0))
}

pub async fn delete_flat_reward<C: GenericClient>(
    client: &C,
    team_id: Uuid,
    giver_id: Uuid,
) -> DbResult<u64> {
    client
        .execute(
            "DELETE FROM team_rewards WHERE team_id = $1 AND giver_id = $2",
            &[&team_id, &giver_id],
        )
        .await
}

pub async fn upsert_flat_reward<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    team_id: Uuid,
    giver_id: Uuid,
    amount: i64,
) -> DbResult<()> {
    client
        .execute(
            "INSERT INTO team_rewards (event_id, team_id, giver_id, amount)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (event_id, team_id, giver_id) DO UPDATE SET
                amount = EXCLUDED.amount,
                updated_at = NOW()",
            &[&event_id, &team_id, &giver_id, &amount],
        )
        .await?;
    Ok(())
}

pub async fn delete_categorized_rewards<C: GenericClient>(
    client: &C,
    team_id: Uuid,
    giver_id: Uuid,
) -> DbResult<u64> {
    client
        .execute(
            "DELETE FROM team_reward_categories WHERE team_id = $1 AND giver_id = $2",
            &[&team_id, &giver_id],
        )
        .await
}

/// Insert the giver's new category rows for a team; zero amounts are dropped
pub async fn insert_categorized_rewards<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    team_id: Uuid,
    giver_id: Uuid,
    entries: &[CategoryAmount],
) -> DbResult<()> {
    for entry in entries {
        if entry.amount == 0 {
            continue;
        }
        client
            .execute(
                "INSERT INTO team_reward_categories
                     (event_id, team_id, giver_id, category_id, amount)
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &event_id,
                    &team_id,
                    &giver_id,
                    &entry.category_id,
                    &entry.amount,
                ],
            )
            .await?;
    }
    Ok(())
}

/// Remove everything a participant holds as giver or committee voter.
/// Used when a role change or removal revokes their allocation authority.
pub async fn purge_giver_state<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    participant_id: Uuid,
) -> DbResult<()> {
    client
        .execute(
            "DELETE FROM team_rewards WHERE event_id = $1 AND giver_id = $2",
            &[&event_id, &participant_id],
        )
        .await?;
    client
        .execute(
            "DELETE FROM team_reward_categories WHERE event_id = $1 AND giver_id = $2",
            &[&event_id, &participant_id],
        )
        .await?;
    client
        .execute(
            "DELETE FROM special_reward_votes WHERE event_id = $1 AND committee_id = $2",
            &[&event_id, &participant_id],
        )
        .await?;
    Ok(())
}

// ============================================================================
// SPECIAL-REWARD VOTES
// ============================================================================

pub async fn votes_for_team<C: GenericClient>(
    client: &C,
    team_id: Uuid,
    committee_id: Uuid,
) -> DbResult<Vec<SpecialRewardVote>> {
    let rows = client
        .query(
            "SELECT id, event_id, reward_id, committee_id, team_id
             FROM special_reward_votes
             WHERE team_id = $1 AND committee_id = $2",
            &[&team_id, &committee_id],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|r| SpecialRewardVote {
            id: r.get(0),
            event_id: r.get(1),
            reward_id: r.get(2),
            committee_id: r.get(3),
            team_id: r.get(4),
        })
        .collect())
}

/// Names of rewards the committee member already holds on a different team
pub async fn conflicting_reward_names<C: GenericClient>(
    client: &C,
    committee_id: Uuid,
    team_id: Uuid,
    reward_ids: &[Uuid],
) -> DbResult<Vec<String>> {
    let rows = client
        .query(
            "SELECT sr.name
             FROM special_reward_votes v
             JOIN special_rewards sr ON sr.id = v.reward_id
             WHERE v.committee_id = $1 AND v.team_id <> $2 AND v.reward_id = ANY($3)
             ORDER BY sr.name",
            &[&committee_id, &team_id, &reward_ids],
        )
        .await?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

pub async fn insert_vote<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    reward_id: Uuid,
    committee_id: Uuid,
    team_id: Uuid,
) -> DbResult<()> {
    client
        .execute(
            "INSERT INTO special_reward_votes (event_id, reward_id, committee_id, team_id)
             VALUES ($1, $2, $3, $4)",
            &[&event_id, &reward_id, &committee_id, &team_id],
        )
        .await?;
    Ok(())
}

pub async fn delete_votes<C: GenericClient>(
    client: &C,
    team_id: Uuid,
    committee_id: Uuid,
    reward_ids: &[Uuid],
) -> DbResult<u64> {
    client
        .execute(
            "DELETE FROM special_reward_votes
             WHERE team_id = $1 AND committee_id = $2 AND reward_id = ANY($3)",
            &[&team_id, &committee_id, &reward_ids],
        )
        .await
}

pub async fn delete_all_votes_for_team<C: GenericClient>(
    client: &C,
    team_id: Uuid,
    committee_id: Uuid,
) -> DbResult<u64> {
    client
        .execute(
            "DELETE FROM special_reward_votes WHERE team_id = $1 AND committee_id = $2",
            &[&team_id, &committee_id],
        )
        .await
}

// ============================================================================
// FEEDBACK
// ============================================================================

pub async fn upsert_comment<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    team_id: Option<Uuid>,
    author_id: Uuid,
    content: &str,
) -> DbResult<Comment> {
    // Partial unique indexes split the NULL / NOT NULL cases, so the upsert
    // has to target the matching one.
    let row = match team_id {
        Some(team_id) => {
            client
                .query_one(
                    "INSERT INTO comments (event_id, team_id, author_id, content)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (event_id, team_id, author_id) WHERE team_id IS NOT NULL
                     DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
                     RETURNING id, event_id, team_id, author_id, content, updated_at",
                    &[&event_id, &team_id, &author_id, &content],
                )
                .await?
        }
        None => {
            client
                .query_one(
                    "INSERT INTO comments (event_id, author_id, content)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (event_id, author_id) WHERE team_id IS NULL
                     DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
                     RETURNING id, event_id, team_id, author_id, content, updated_at",
                    &[&event_id, &author_id, &content],
                )
                .await?
        }
    };
    Ok(Comment {
        id: row.get(0),
        event_id: row.get(1),
        team_id: row.get(2),
        author_id: row.get(3),
        content: row.get(4),
        updated_at: row.get(5),
    })
}

pub async fn upsert_rating<C: GenericClient>(
    client: &C,
    event_id: Uuid,
    rater_id: Uuid,
    rating: i32,
) -> DbResult<EventRating> {
    let row = client
        .query_one(
            "INSERT INTO event_ratings (event_id, rater_id, rating)
             VALUES ($1, $2, $3)
             ON CONFLICT (event_id, rater_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                updated_at = NOW()
             RETURNING id, event_id, rater_id, rating, updated_at",
            &[&event_id, &rater_id, &rating],
        )
        .await?;
    Ok(EventRating {
        id: row.get(0),
        event_id: row.get(1),
        rater_id: row.get(2),
        rating: row.get(3),
        updated_at: row.get(4),
    })
}
