use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use uuid::Uuid;

use crate::entities::rating;
use crate::entities::ride::RideStatus;
use crate::error::{AppError, AppResult};
use crate::services::booking::find_ride;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

pub struct RatingService<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> RatingService<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// One rating per participant per completed ride. The ratee is the other participant.
    pub async fn rate_ride(
        &self,
        ride_id: Uuid,
        rater_id: Uuid,
        score: i32,
        comment: Option<String>,
    ) -> AppResult<rating::Model> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(AppError::Validation(format!(
                "Score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }

        let ride = find_ride(self.db, ride_id).await?;
        if ride.status != RideStatus::Completed {
            return Err(AppError::Validation(
                "Only completed rides can be rated".to_string(),
            ));
        }

        let ratee_id = if rater_id == ride.rider_id {
            ride.driver_id.ok_or_else(|| {
                AppError::Validation("Ride has no driver to rate".to_string())
            })?
        } else if ride.driver_id == Some(rater_id) {
            ride.rider_id
        } else {
            return Err(AppError::Forbidden(
                "Only ride participants can rate it".to_string(),
            ));
        };

        let existing = rating::Entity::find()
            .filter(rating::Column::RideId.eq(ride_id))
            .filter(rating::Column::RaterId.eq(rater_id))
            .one(self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("You have already rated this ride".to_string()));
        }

        let inserted = rating::ActiveModel {
            id: Set(Uuid::new_v4()),
            ride_id: Set(ride_id),
            rater_id: Set(rater_id),
            ratee_id: Set(ratee_id),
            score: Set(score),
            comment: Set(comment.filter(|c| !c.trim().is_empty())),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(self.db)
        .await;

        match inserted {
            Ok(rating) => {
                tracing::info!(%ride_id, %rater_id, %ratee_id, score, "Ride rated");
                Ok(rating)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(
                AppError::Conflict("You have already rated this ride".to_string()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn ratings_for(&self, ratee_id: Uuid) -> AppResult<Vec<rating::Model>> {
        Ok(rating::Entity::find()
            .filter(rating::Column::RateeId.eq(ratee_id))
            .order_by_desc(rating::Column::CreatedAt)
            .all(self.db)
            .await?)
    }
}
