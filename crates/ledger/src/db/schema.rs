//! Database schema and migrations

use anyhow::Result;
use deadpool_postgres::Object;
use tracing::info;

pub async fn run_migrations(client: &Object) -> Result<()> {
    client.batch_execute(SCHEMA_SQL).await?;
    info!("Database migrations applied");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Podium ledger schema
-- Participation, team and reward state for every event.

CREATE TABLE IF NOT EXISTS events (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name VARCHAR(255) NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'draft',
    start_view TIMESTAMPTZ,
    end_view TIMESTAMPTZ,
    -- Per-role VR budgets handed out at join time
    vr_guest BIGINT NOT NULL DEFAULT 0,
    vr_committee BIGINT NOT NULL DEFAULT 0,
    -- Optional per-team allocation caps (per giver role)
    team_cap_enabled BOOLEAN NOT NULL DEFAULT FALSE,
    team_cap_guest BIGINT,
    team_cap_committee BIGINT,
    max_teams INTEGER,
    max_team_members INTEGER,
    -- Secret that invite tokens / join grants are derived from
    invite_secret TEXT NOT NULL,
    created_by VARCHAR(128) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS teams (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    name VARCHAR(255) NOT NULL,
    description TEXT,
    cover_url TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_teams_event ON teams(event_id);

CREATE TABLE IF NOT EXISTS participants (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    user_id VARCHAR(128) NOT NULL,
    role VARCHAR(16) NOT NULL,
    is_leader BOOLEAN NOT NULL DEFAULT FALSE,
    -- Detach-then-delete cascades clear this explicitly; SET NULL is a backstop
    team_id UUID REFERENCES teams(id) ON DELETE SET NULL,
    virtual_reward BIGINT NOT NULL DEFAULT 0,
    joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(event_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_participants_team ON participants(team_id);

CREATE TABLE IF NOT EXISTS reward_categories (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    name VARCHAR(255) NOT NULL,
    UNIQUE(event_id, name)
);

-- Flat (un-categorized) allocations
CREATE TABLE IF NOT EXISTS team_rewards (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    giver_id UUID NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
    amount BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(event_id, team_id, giver_id)
);

CREATE INDEX IF NOT EXISTS idx_team_rewards_giver ON team_rewards(event_id, giver_id);

-- Categorized allocations; a giver uses either this table or team_rewards
-- for a given team, never both
CREATE TABLE IF NOT EXISTS team_reward_categories (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    giver_id UUID NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
    category_id UUID NOT NULL REFERENCES reward_categories(id) ON DELETE CASCADE,
    amount BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(event_id, team_id, giver_id, category_id)
);

CREATE INDEX IF NOT EXISTS idx_team_reward_categories_giver
    ON team_reward_categories(event_id, giver_id);

CREATE TABLE IF NOT EXISTS special_rewards (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    name VARCHAR(255) NOT NULL,
    UNIQUE(event_id, name)
);

-- One team per (reward, committee member): the UNIQUE constraint is the
-- authoritative guard under concurrent inserts
CREATE TABLE IF NOT EXISTS special_reward_votes (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    reward_id UUID NOT NULL REFERENCES special_rewards(id) ON DELETE CASCADE,
    committee_id UUID NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
    team_id UUID NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    UNIQUE(reward_id, committee_id)
);

CREATE INDEX IF NOT EXISTS idx_votes_team ON special_reward_votes(team_id, committee_id);

CREATE TABLE IF NOT EXISTS comments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    team_id UUID REFERENCES teams(id) ON DELETE CASCADE,
    author_id UUID NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- One live comment per (event, team, author) and per (event, author) when
-- the comment targets the event itself
CREATE UNIQUE INDEX IF NOT EXISTS idx_comments_team_author
    ON comments(event_id, team_id, author_id) WHERE team_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_comments_event_author
    ON comments(event_id, author_id) WHERE team_id IS NULL;

CREATE TABLE IF NOT EXISTS event_ratings (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    event_id UUID NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    rater_id UUID NOT NULL REFERENCES participants(id) ON DELETE CASCADE,
    rating INTEGER NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(event_id, rater_id)
);
"#;
