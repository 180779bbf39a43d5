//! PostgreSQL-backed `ActivityRepository` implementation.
//!
//! Activity summaries are insert-or-ignore keyed by the remote activity id, so
//! re-importing an athlete's full history only reports the genuinely new
//! activities. The athlete's map id is created lazily on first rebuild.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use uuid::Uuid;

use crate::domain::ports::{ActivityRepository, ActivityRepositoryError};
use crate::domain::{ActivityId, ActivitySummary, AthleteId, MapId};

use super::diesel_helpers::{
    is_connection_error, map_diesel_error_message, map_pool_error_message, rows_per_insert,
};
use super::models::{NewActivityRow, NewAthleteMapRow};
use super::pool::{DbPool, PoolError};
use super::schema::{athlete_maps, strava_activities};

/// Bound values per activity summary row.
const ACTIVITY_COLUMNS: usize = 7;

/// Diesel-backed implementation of the activity repository port.
#[derive(Clone)]
pub struct DieselActivityRepository {
    pool: DbPool,
}

impl DieselActivityRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ActivityRepositoryError {
    ActivityRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(
    operation: &'static str,
) -> impl Fn(diesel::result::Error) -> ActivityRepositoryError {
    move |error| {
        if is_connection_error(&error) {
            return ActivityRepositoryError::connection(error.to_string());
        }
        ActivityRepositoryError::query(map_diesel_error_message(error, operation))
    }
}

#[async_trait]
impl ActivityRepository for DieselActivityRepository {
    async fn insert_activities(
        &self,
        activities: &[ActivitySummary],
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError> {
        if activities.is_empty() {
            return Ok(Vec::new());
        }

        let created_at = Utc::now();
        let rows: Vec<NewActivityRow<'_>> = activities
            .iter()
            .map(|activity| NewActivityRow {
                activity_id: activity.id.get(),
                athlete_id: activity.athlete_id.get(),
                name: &activity.name,
                sport_type: &activity.sport_type,
                start_date: activity.start_date,
                distance: activity.distance,
                created_at,
            })
            .collect();

        let per_insert = rows_per_insert(ACTIVITY_COLUMNS).get();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let inserted: Vec<i64> = conn
            .transaction(|conn| {
                async move {
                    let mut inserted = Vec::new();
                    for chunk in rows.chunks(per_insert) {
                        let ids: Vec<i64> = diesel::insert_into(strava_activities::table)
                            .values(chunk)
                            .on_conflict(strava_activities::activity_id)
                            .do_nothing()
                            .returning(strava_activities::activity_id)
                            .get_results(conn)
                            .await?;
                        inserted.extend(ids);
                    }
                    Ok::<_, diesel::result::Error>(inserted)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error("insert activities"))?;

        Ok(inserted.into_iter().map(ActivityId::new).collect())
    }

    async fn unsynced_activities(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<ActivityId>, ActivityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let ids: Vec<i64> = strava_activities::table
            .filter(strava_activities::athlete_id.eq(athlete_id.get()))
            .filter(strava_activities::data_ref.is_null())
            .select(strava_activities::activity_id)
            .order_by(strava_activities::activity_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list unsynced activities"))?;

        Ok(ids.into_iter().map(ActivityId::new).collect())
    }

    async fn set_data_ref(
        &self,
        athlete_id: AthleteId,
        activity_id: ActivityId,
        data_ref: &str,
    ) -> Result<(), ActivityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(strava_activities::table)
            .filter(strava_activities::athlete_id.eq(athlete_id.get()))
            .filter(strava_activities::activity_id.eq(activity_id.get()))
            .set(strava_activities::data_ref.eq(Some(data_ref)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error("set data ref"))?;

        if updated == 0 {
            return Err(ActivityRepositoryError::query(format!(
                "activity {activity_id} of athlete {athlete_id} is not stored"
            )));
        }
        Ok(())
    }

    async fn data_refs(
        &self,
        athlete_id: AthleteId,
    ) -> Result<Vec<String>, ActivityRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        strava_activities::table
            .filter(strava_activities::athlete_id.eq(athlete_id.get()))
            .filter(strava_activities::data_ref.is_not_null())
            .select(strava_activities::data_ref.assume_not_null())
            .order_by(strava_activities::activity_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("list data refs"))
    }

    async fn get_or_create_map_id(
        &self,
        athlete_id: AthleteId,
    ) -> Result<MapId, ActivityRepositoryError> {
        let candidate = NewAthleteMapRow {
            athlete_id: athlete_id.get(),
            map_id: *MapId::random().as_uuid(),
            created_at: Utc::now(),
        };

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(athlete_maps::table)
            .values(&candidate)
            .on_conflict(athlete_maps::athlete_id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error("create map id"))?;

        let map_id: Uuid = athlete_maps::table
            .filter(athlete_maps::athlete_id.eq(athlete_id.get()))
            .select(athlete_maps::map_id)
            .first(&mut conn)
            .await
            .map_err(map_diesel_error("read map id"))?;

        Ok(MapId::new(map_id))
    }
}
