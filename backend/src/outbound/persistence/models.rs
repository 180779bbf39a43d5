//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    athlete_maps, athlete_processing_states, athlete_tokens, queue_processing_states,
    strava_activities, tile_render_messages,
};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Row struct for reading from the athlete_tokens table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = athlete_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AthleteTokenRow {
    pub athlete_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Insertable struct for athlete credentials.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = athlete_tokens)]
pub(crate) struct NewAthleteTokenRow<'a> {
    pub athlete_id: i64,
    pub access_token: &'a str,
    pub refresh_token: &'a str,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Activities and maps
// ---------------------------------------------------------------------------

/// Insertable struct for imported activity summaries.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = strava_activities)]
pub(crate) struct NewActivityRow<'a> {
    pub activity_id: i64,
    pub athlete_id: i64,
    pub name: &'a str,
    pub sport_type: &'a str,
    pub start_date: DateTime<Utc>,
    pub distance: f64,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for the per-athlete map id.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = athlete_maps)]
pub(crate) struct NewAthleteMapRow {
    pub athlete_id: i64,
    pub map_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Processing state
// ---------------------------------------------------------------------------

/// Insertable struct for the athlete state row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = athlete_processing_states)]
pub(crate) struct AthleteStateRow<'a> {
    pub athlete_id: i64,
    pub state: &'a str,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for one queued message.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = queue_processing_states)]
pub(crate) struct NewQueueStateRow<'a> {
    pub message_id: &'a str,
    pub map_id: Uuid,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated status counts for one batch, read via raw SQL.
#[derive(Debug, Clone, QueryableByName)]
pub(crate) struct QueueSummaryRow {
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub queued: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub complete: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub failed: i64,
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Insertable struct for one outbox envelope.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tile_render_messages)]
pub(crate) struct NewTileRenderMessageRow {
    pub message_id: Uuid,
    pub map_id: Uuid,
    pub athlete_id: i64,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
