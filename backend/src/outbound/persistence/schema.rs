//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `migrations/` exactly. When a migration
//! changes the schema, regenerate this file with `diesel print-schema` or
//! update it by hand.

diesel::table! {
    /// OAuth credentials, one row per athlete.
    athlete_tokens (athlete_id) {
        athlete_id -> Int8,
        access_token -> Text,
        refresh_token -> Text,
        expires_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Activity summaries imported from the remote API.
    ///
    /// `data_ref` is the object-store key of the raw stream, `NULL` until the
    /// stream has been downloaded.
    strava_activities (activity_id) {
        activity_id -> Int8,
        athlete_id -> Int8,
        name -> Text,
        sport_type -> Text,
        start_date -> Timestamptz,
        distance -> Float8,
        data_ref -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Stable heatmap identifier per athlete.
    athlete_maps (athlete_id) {
        athlete_id -> Int8,
        map_id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Latest pipeline stage per athlete (last write wins).
    athlete_processing_states (athlete_id) {
        athlete_id -> Int8,
        state -> Text,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Render status of each queued tile batch message.
    queue_processing_states (message_id) {
        message_id -> Text,
        map_id -> Uuid,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Transactional outbox of tile render envelopes awaiting dispatch.
    tile_render_messages (message_id) {
        message_id -> Uuid,
        map_id -> Uuid,
        athlete_id -> Int8,
        payload -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    athlete_tokens,
    strava_activities,
    athlete_maps,
    athlete_processing_states,
    queue_processing_states,
    tile_render_messages,
);
