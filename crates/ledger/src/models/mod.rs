//! Data models for the participation and reward ledger

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// EVENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Published,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Published => "published",
        }
    }
}

impl From<&str> for EventStatus {
    fn from(s: &str) -> Self {
        match s {
            "published" => EventStatus::Published,
            _ => EventStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub status: EventStatus,
    /// Start of the voting/scoring window (unbounded when absent)
    pub start_view: Option<DateTime<Utc>>,
    /// End of the voting/scoring window (unbounded when absent)
    pub end_view: Option<DateTime<Utc>>,
    /// VR budget handed to each guest at join time
    pub vr_guest: i64,
    /// VR budget handed to each committee member at join time
    pub vr_committee: i64,
    pub team_cap_enabled: bool,
    pub team_cap_guest: Option<i64>,
    pub team_cap_committee: Option<i64>,
    pub max_teams: Option<i32>,
    pub max_team_members: Option<i32>,
    /// Secret the invite/grant credentials are derived from
    #[serde(skip_serializing)]
    pub invite_secret: String,
    /// External user id of the creating organizer-leader
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether scoring actions are permitted at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.status != EventStatus::Published {
            return false;
        }
        if let Some(start) = self.start_view {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.end_view {
            if now > end {
                return false;
            }
        }
        true
    }

    /// Per-role VR budget assigned when a participant joins
    pub fn budget_for(&self, role: Role) -> i64 {
        match role {
            Role::Guest => self.vr_guest,
            Role::Committee => self.vr_committee,
            Role::Organizer | Role::Presenter => 0,
        }
    }

    /// Per-team allocation cap for a giver role, when cap enforcement is on
    pub fn team_cap_for(&self, role: Role) -> Option<i64> {
        if !self.team_cap_enabled {
            return None;
        }
        match role {
            Role::Guest => self.team_cap_guest,
            Role::Committee => self.team_cap_committee,
            Role::Organizer | Role::Presenter => None,
        }
    }
}

/// Mutable event settings, applied by the organizer-leader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSettings {
    pub name: Option<String>,
    pub start_view: Option<DateTime<Utc>>,
    pub end_view: Option<DateTime<Utc>>,
    pub vr_guest: Option<i64>,
    pub vr_committee: Option<i64>,
    pub team_cap_enabled: Option<bool>,
    pub team_cap_guest: Option<i64>,
    pub team_cap_committee: Option<i64>,
    pub max_teams: Option<i32>,
    pub max_team_members: Option<i32>,
}

// ============================================================================
// PARTICIPANT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Organizer,
    Presenter,
    Committee,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Presenter => "presenter",
            Role::Committee => "committee",
            Role::Guest => "guest",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "organizer" => Ok(Role::Organizer),
            "presenter" => Ok(Role::Presenter),
            "committee" => Ok(Role::Committee),
            "guest" => Ok(Role::Guest),
            other => Err(LedgerError::InvalidInput(format!("unknown role: {other}"))),
        }
    }

    /// Roles that hold a VR budget and may allocate rewards
    pub fn is_giver(&self) -> bool {
        matches!(self, Role::Guest | Role::Committee)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::parse(s).unwrap_or(Role::Guest)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Opaque external identity resolved by the auth collaborator
    pub user_id: String,
    pub role: Role,
    pub is_leader: bool,
    pub team_id: Option<Uuid>,
    /// Static VR budget ceiling for this participant
    pub virtual_reward: i64,
    pub joined_at: DateTime<Utc>,
}

/// Credential presented on join; which variant is accepted depends on role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCredential {
    /// Shared invite token for guest/committee self-service joins
    InviteToken(String),
    /// Per-user grant signature for organizer/presenter joins
    GrantSignature(String),
}

// ============================================================================
// TEAM
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial profile update for a team; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamProfile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

// ============================================================================
// REWARDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardCategory {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAmount {
    pub category_id: Uuid,
    pub amount: i64,
}

/// One giver's allocation to one team: flat or categorized, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Flat(i64),
    Categorized(Vec<CategoryAmount>),
}

impl Allocation {
    /// Build an allocation from the two optional payload fields, enforcing
    /// exactly-one-mode and non-negative amounts.
    pub fn from_parts(
        amount: Option<i64>,
        categories: Option<Vec<CategoryAmount>>,
    ) -> Result<Self> {
        match (amount, categories) {
            (Some(_), Some(_)) => Err(LedgerError::InvalidInput(
                "flat amount and category amounts are mutually exclusive".into(),
            )),
            (None, None) => Err(LedgerError::InvalidInput(
                "either a flat amount or category amounts must be supplied".into(),
            )),
            (Some(amount), None) => {
                if amount < 0 {
                    return Err(LedgerError::InvalidInput("amount must be non-negative".into()));
                }
                Ok(Allocation::Flat(amount))
            }
            (None, Some(entries)) => {
                if entries.is_empty() {
                    return Err(LedgerError::InvalidInput(
                        "category amounts must not be empty".into(),
                    ));
                }
                let mut seen = std::collections::HashSet::new();
                for entry in &entries {
                    if entry.amount < 0 {
                        return Err(LedgerError::InvalidInput(
                            "category amounts must be non-negative".into(),
                        ));
                    }
                    if !seen.insert(entry.category_id) {
                        return Err(LedgerError::InvalidInput(format!(
                            "duplicate category: {}",
                            entry.category_id
                        )));
                    }
                }
                Ok(Allocation::Categorized(entries))
            }
        }
    }

    /// Total VR this allocation commits to the team. Saturates instead of
    /// wrapping; a saturated total can never pass the budget check.
    pub fn total(&self) -> i64 {
        match self {
            Allocation::Flat(amount) => *amount,
            Allocation::Categorized(entries) => entries
                .iter()
                .fold(0i64, |acc, e| acc.saturating_add(e.amount)),
        }
    }
}

/// Budget snapshot returned by every reward operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub total_limit: i64,
    pub total_used: i64,
}

/// Outcome of a reset; `removed == false` means there was nothing to remove
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResetResult {
    pub snapshot: RewardSnapshot,
    pub removed: bool,
}

// ============================================================================
// SPECIAL REWARDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialReward {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialRewardVote {
    pub id: Uuid,
    pub event_id: Uuid,
    pub reward_id: Uuid,
    pub committee_id: Uuid,
    pub team_id: Uuid,
}

// ============================================================================
// FEEDBACK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub event_id: Uuid,
    pub team_id: Option<Uuid>,
    pub author_id: Uuid,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRating {
    pub id: Uuid,
    pub event_id: Uuid,
    pub rater_id: Uuid,
    pub rating: i32,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_event() -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Demo Day".into(),
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
            invite_secret: "secret".into(),
            created_by: "owner".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Organizer, Role::Presenter, Role::Committee, Role::Guest] {
            assert_eq!(Role::parse(role.as_str()).unwrap(), role);
        }
        assert!(Role::parse("admin").is_err());
    }

    #[test]
    fn test_giver_roles() {
        assert!(Role::Guest.is_giver());
        assert!(Role::Committee.is_giver());
        assert!(!Role::Presenter.is_giver());
        assert!(!Role::Organizer.is_giver());
    }

    #[test]
    fn test_event_window() {
        let now = Utc::now();
        let mut event = test_event();
        assert!(event.is_active(now));

        event.start_view = Some(now + Duration::hours(1));
        assert!(!event.is_active(now));

        event.start_view = Some(now - Duration::hours(2));
        event.end_view = Some(now - Duration::hours(1));
        assert!(!event.is_active(now));

        event.end_view = Some(now + Duration::hours(1));
        assert!(event.is_active(now));

        event.status = EventStatus::Draft;
        assert!(!event.is_active(now));
    }

    #[test]
    fn test_budget_defaults_per_role() {
        let event = test_event();
        assert_eq!(event.budget_for(Role::Guest), 100);
        assert_eq!(event.budget_for(Role::Committee), 200);
        assert_eq!(event.budget_for(Role::Presenter), 0);
        assert_eq!(event.budget_for(Role::Organizer), 0);
    }

    #[test]
    fn test_team_cap_disabled_by_default() {
        let mut event = test_event();
        event.team_cap_guest = Some(30);
        assert_eq!(event.team_cap_for(Role::Guest), None);

        event.team_cap_enabled = true;
        assert_eq!(event.team_cap_for(Role::Guest), Some(30));
        assert_eq!(event.team_cap_for(Role::Committee), None);
    }

    #[test]
    fn test_allocation_exactly_one_mode() {
        assert!(Allocation::from_parts(None, None).is_err());
        assert!(Allocation::from_parts(
            Some(10),
            Some(vec![CategoryAmount {
                category_id: Uuid::new_v4(),
                amount: 5
            }])
        )
        .is_err());
        assert_eq!(
            Allocation::from_parts(Some(10), None).unwrap(),
            Allocation::Flat(10)
        );
    }

    #[test]
    fn test_allocation_rejects_bad_amounts() {
        assert!(Allocation::from_parts(Some(-1), None).is_err());
        assert!(Allocation::from_parts(None, Some(vec![])).is_err());

        let id = Uuid::new_v4();
        let dup = vec![
            CategoryAmount { category_id: id, amount: 3 },
            CategoryAmount { category_id: id, amount: 4 },
        ];
        assert!(Allocation::from_parts(None, Some(dup)).is_err());

        let neg = vec![CategoryAmount { category_id: Uuid::new_v4(), amount: -2 }];
        assert!(Allocation::from_parts(None, Some(neg)).is_err());
    }

    #[test]
    fn test_allocation_total() {
        assert_eq!(Allocation::Flat(42).total(), 42);
        let cats = Allocation::Categorized(vec![
            CategoryAmount { category_id: Uuid::new_v4(), amount: 10 },
            CategoryAmount { category_id: Uuid::new_v4(), amount: 15 },
        ]);
        assert_eq!(cats.total(), 25);

        // huge category amounts saturate instead of wrapping negative
        let huge = Allocation::Categorized(vec![
            CategoryAmount { category_id: Uuid::new_v4(), amount: i64::MAX },
            CategoryAmount { category_id: Uuid::new_v4(), amount: i64::MAX },
        ]);
        assert_eq!(huge.total(), i64::MAX);
    }
}
