//! Podium Ledger - Participation & Reward Ledger
//!
//! This is the SINGLE SOURCE OF TRUTH for participation state on the Podium
//! event platform: who is in an event and under which role, which team they
//! present with, how much of their virtual-reward (VR) budget they have
//! committed to which teams, and which special rewards they voted for.
//!
//! Architecture:
//! - Participant Registry: roles, leadership, VR budgets per event
//! - Team Manager: team lifecycle and the departure/dissolution cascades
//! - Reward Ledger: budget-constrained give/reset of VR, flat or categorized
//! - Special-Reward Vote Manager: exclusive one-team-per-reward votes
//! - Feedback Collector: in-place comment and rating upserts
//!
//! Key invariants:
//! - A giver's flat + categorized totals never exceed their VR budget
//! - At most one vote row per (reward, committee member)
//! - At most one leader per team; dissolution detaches every member and
//!   leaves no reward/vote row pointing at a dead team
//! - Every operation is one transaction: partial state is never visible
//!
//! HTTP routing, authentication and storage of media live in external
//! collaborators; they hand this crate validated identifiers and typed
//! payloads and render its results.

pub mod db;
pub mod error;
pub mod events;
pub mod feedback;
pub mod models;
pub mod registry;
pub mod rewards;
pub mod teams;
pub mod votes;

pub use db::DbPool;
pub use error::{LedgerError, Result};
pub use models::{
    Allocation, CategoryAmount, Event, EventSettings, EventStatus, JoinCredential, Participant,
    ResetResult, RewardSnapshot, Role, Team, TeamProfile,
};
