//! Evaluation feedback: comments and event ratings
//!
//! Lightweight one-live-record-per-author collectors sharing the ledger's
//! transactional idiom and active-window gate. An existing record is
//! replaced in place, never appended to.

use crate::db::{queries, DbPool};
use crate::error::{LedgerError, Result};
use crate::models::{Comment, EventRating, Role};
use crate::registry::require_participant;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

const MAX_COMMENT_LEN: usize = 4000;

fn validate_rating(rating: i32) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(LedgerError::InvalidInput(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(())
}

/// Create or replace the author's comment on a team (or on the event itself
/// when `team_id` is absent)
pub async fn upsert_comment(
    pool: &DbPool,
    event_id: Uuid,
    team_id: Option<Uuid>,
    author_user_id: &str,
    content: &str,
) -> Result<Comment> {
    if content.trim().is_empty() {
        return Err(LedgerError::InvalidInput("comment must not be empty".into()));
    }
    if content.len() > MAX_COMMENT_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "comment exceeds {MAX_COMMENT_LEN} characters"
        )));
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    if !event.is_active(Utc::now()) {
        return Err(LedgerError::EventNotActive);
    }

    let author = require_participant(&*tx, event_id, author_user_id).await?;
    if let Some(team_id) = team_id {
        queries::get_team(&*tx, event_id, team_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("team", team_id))?;
    }

    let comment = queries::upsert_comment(&*tx, event_id, team_id, author.id, content).await?;
    tx.commit().await?;

    info!(event_id = %event_id, author = %author_user_id, "Comment stored");
    Ok(comment)
}

/// Create or replace the participant's rating of the event
pub async fn upsert_rating(
    pool: &DbPool,
    event_id: Uuid,
    rater_user_id: &str,
    rating: i32,
) -> Result<EventRating> {
    validate_rating(rating)?;

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let event = queries::get_event(&*tx, event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))?;
    if !event.is_active(Utc::now()) {
        return Err(LedgerError::EventNotActive);
    }

    let rater = require_participant(&*tx, event_id, rater_user_id).await?;
    if rater.role == Role::Organizer {
        return Err(LedgerError::Forbidden(
            "organizers cannot rate their own event".into(),
        ));
    }

    let record = queries::upsert_rating(&*tx, event_id, rater.id, rating).await?;
    tx.commit().await?;

    info!(event_id = %event_id, rater = %rater_user_id, rating, "Event rated");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
    }
}
