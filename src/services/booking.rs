//! Booking orchestration and the persisted side of the ride lifecycle.
//!
//! Every multi-row change runs in one database transaction. Contended rows
//! (request assignment, vehicle reservation) are claimed with conditional
//! updates; zero affected rows means another caller got there first.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::ride::RideStatus;
use crate::entities::ride_cancel::CancelledBy;
use crate::entities::ride_request::RideRequestStatus;
use crate::entities::user::UserRole;
use crate::entities::{location, ride, ride_cancel, ride_request, user, vehicle};
use crate::error::{AppError, AppResult};
use crate::services::fare::{round_money, FareQuote, FareTable, TimeBand};
use crate::services::lifecycle::CancelOutcome;
use crate::utils::geo::Coordinates;

/// Placeholder trip length written at booking time; completion overwrites it.
pub const DEFAULT_TRIP_MINUTES: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Place {
    pub address: String,
    #[serde(flatten)]
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub rider_id: Uuid,
    pub vehicle_id: Uuid,
    pub pickup: Place,
    pub dropoff: Place,
    pub scheduled_time: DateTime<Utc>,
    pub time_band: TimeBand,
}

#[derive(Debug, Clone)]
pub struct Booking {
    pub ride: ride::Model,
    pub request: ride_request::Model,
    pub pickup: location::Model,
    pub dropoff: location::Model,
    pub quote: FareQuote,
}

pub struct BookingService<'a> {
    db: &'a DatabaseConnection,
    fare: &'a FareTable,
}

impl<'a> BookingService<'a> {
    pub fn new(db: &'a DatabaseConnection, fare: &'a FareTable) -> Self {
        Self { db, fare }
    }

    /// Price a trip between two points with a vehicle's rate, without persisting anything.
    pub async fn quote(
        &self,
        vehicle_id: Uuid,
        pickup: Coordinates,
        dropoff: Coordinates,
        band: TimeBand,
    ) -> AppResult<(f64, FareQuote)> {
        pickup.validate()?;
        dropoff.validate()?;

        let vehicle = find_vehicle(self.db, vehicle_id).await?;
        let distance_km = pickup.distance_to(&dropoff);
        let quote = self.fare.estimate(distance_km, vehicle.rental_rate_per_km, band)?;

        Ok((distance_km, quote))
    }

    /// Create the two locations, the ride and its request as one booking.
    pub async fn create_booking(&self, request: BookingRequest) -> AppResult<Booking> {
        request.pickup.coordinates.validate()?;
        request.dropoff.coordinates.validate()?;

        let rider = user::Entity::find_by_id(request.rider_id)
            .one(self.db)
            .await?
            .filter(|u| u.role == UserRole::Rider)
            .ok_or_else(|| AppError::NotFound("Rider not found".to_string()))?;

        let vehicle = find_vehicle(self.db, request.vehicle_id).await?;

        let distance_km = request
            .pickup
            .coordinates
            .distance_to(&request.dropoff.coordinates);
        let quote = self
            .fare
            .estimate(distance_km, vehicle.rental_rate_per_km, request.time_band)?;

        let now = Utc::now();
        let start_time = request.scheduled_time;
        let status = if start_time > now {
            RideStatus::Scheduled
        } else {
            RideStatus::Requested
        };

        let txn = self.db.begin().await?;

        let pickup = insert_location(&txn, &request.pickup).await?;
        let dropoff = insert_location(&txn, &request.dropoff).await?;

        let ride = ride::ActiveModel {
            id: Set(Uuid::new_v4()),
            rider_id: Set(rider.id),
            driver_id: Set(None),
            vehicle_id: Set(vehicle.id),
            pickup_location_id: Set(pickup.id),
            dropoff_location_id: Set(dropoff.id),
            status: Set(status),
            fare: Set(round_money(quote.total)),
            distance_km: Set(distance_km),
            start_time: Set(start_time.fixed_offset()),
            end_time: Set(Some(
                (start_time + Duration::minutes(DEFAULT_TRIP_MINUTES)).fixed_offset(),
            )),
            created_at: Set(now.fixed_offset()),
        }
        .insert(&txn)
        .await?;

        let ride_request = ride_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            ride_id: Set(ride.id),
            rider_id: Set(rider.id),
            assigned_driver_id: Set(None),
            assigned_vehicle_id: Set(None),
            pickup_location_id: Set(pickup.id),
            dropoff_location_id: Set(dropoff.id),
            status: Set(RideRequestStatus::Waiting),
            preferred_vehicle_type: Set(vehicle.vehicle_type.clone()),
            requested_at: Set(now.fixed_offset()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(
            ride_id = %ride.id,
            request_id = %ride_request.id,
            rider_id = %rider.id,
            distance_km,
            fare = ride.fare,
            "Booking created"
        );

        Ok(Booking {
            ride,
            request: ride_request,
            pickup,
            dropoff,
            quote,
        })
    }

    /// Move a requested ride to a future start time.
    pub async fn schedule_ride(
        &self,
        ride_id: Uuid,
        rider_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> AppResult<ride::Model> {
        let ride = find_ride(self.db, ride_id).await?;
        if ride.rider_id != rider_id {
            return Err(AppError::Forbidden(
                "You can only schedule your own rides".to_string(),
            ));
        }

        let start = start_time.fixed_offset();
        let next = ride.status.schedule(start, Utc::now().fixed_offset())?;

        let result = ride::Entity::update_many()
            .col_expr(ride::Column::Status, Expr::value(next))
            .col_expr(ride::Column::StartTime, Expr::value(start))
            .col_expr(
                ride::Column::EndTime,
                Expr::value(Some(start + Duration::minutes(DEFAULT_TRIP_MINUTES))),
            )
            .filter(ride::Column::Id.eq(ride_id))
            .filter(ride::Column::Status.eq(RideStatus::Requested))
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride changed while it was being scheduled".to_string(),
            ));
        }

        find_ride(self.db, ride_id).await
    }

    /// Waiting requests, oldest first.
    pub async fn open_requests(&self) -> AppResult<Vec<ride_request::Model>> {
        Ok(ride_request::Entity::find()
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Waiting))
            .order_by_asc(ride_request::Column::RequestedAt)
            .all(self.db)
            .await?)
    }

    /// waiting -> assigned. Reserves the driver's vehicle in the same transaction.
    pub async fn accept_request(
        &self,
        request_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let vehicle = find_vehicle(self.db, vehicle_id).await?;
        if vehicle.driver_id != driver_id {
            return Err(AppError::Forbidden(
                "Vehicle does not belong to this driver".to_string(),
            ));
        }

        let request = find_request(self.db, request_id).await?;
        // Finished requests cannot be accepted. An assigned or in-progress one
        // falls through to the conditional update below, which reports the lost race.
        if request.status.is_terminal() {
            request.status.assign()?;
        }
        let next = RideRequestStatus::Waiting.assign()?;

        let txn = self.db.begin().await?;

        let busy = ride_request::Entity::find()
            .filter(ride_request::Column::AssignedDriverId.eq(driver_id))
            .filter(
                ride_request::Column::Status
                    .is_in([RideRequestStatus::Assigned, RideRequestStatus::InProgress]),
            )
            .count(&txn)
            .await?;

        if busy > 0 {
            return Err(AppError::Conflict(
                "Driver is already on another ride".to_string(),
            ));
        }

        let claimed = ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(next))
            .col_expr(ride_request::Column::AssignedDriverId, Expr::value(Some(driver_id)))
            .col_expr(ride_request::Column::AssignedVehicleId, Expr::value(Some(vehicle_id)))
            .filter(ride_request::Column::Id.eq(request_id))
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Waiting))
            .filter(ride_request::Column::AssignedDriverId.is_null())
            .exec(&txn)
            .await
            .map_err(|err| match err.sql_err() {
                // Partial unique index: one active request per driver
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AppError::Conflict("Driver is already on another ride".to_string())
                }
                _ => AppError::Database(err),
            })?;

        if claimed.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride request has already been accepted".to_string(),
            ));
        }

        let reserved = vehicle::Entity::update_many()
            .col_expr(vehicle::Column::Available, Expr::value(false))
            .filter(vehicle::Column::Id.eq(vehicle_id))
            .filter(vehicle::Column::Available.eq(true))
            .exec(&txn)
            .await?;

        if reserved.rows_affected == 0 {
            return Err(AppError::Conflict("Vehicle is not available".to_string()));
        }

        txn.commit().await?;

        tracing::info!(%request_id, %driver_id, %vehicle_id, "Ride request accepted");

        find_request(self.db, request_id).await
    }

    /// assigned -> waiting. The driver backs out before the trip starts.
    pub async fn release_request(
        &self,
        request_id: Uuid,
        driver_id: Uuid,
    ) -> AppResult<ride_request::Model> {
        let request = find_request(self.db, request_id).await?;
        ensure_assigned_to(&request, driver_id)?;
        let next = request.status.release()?;

        let txn = self.db.begin().await?;

        let released = ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(next))
            .col_expr(ride_request::Column::AssignedDriverId, Expr::value(Option::<Uuid>::None))
            .col_expr(ride_request::Column::AssignedVehicleId, Expr::value(Option::<Uuid>::None))
            .filter(ride_request::Column::Id.eq(request_id))
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Assigned))
            .filter(ride_request::Column::AssignedDriverId.eq(driver_id))
            .exec(&txn)
            .await?;

        if released.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride request changed while it was being released".to_string(),
            ));
        }

        free_vehicle(&txn, request.assigned_vehicle_id).await?;
        txn.commit().await?;

        tracing::info!(%request_id, %driver_id, "Ride request released");

        find_request(self.db, request_id).await
    }

    /// assigned -> in-progress on the request, and the ride starts with this driver.
    pub async fn start_ride(&self, request_id: Uuid, driver_id: Uuid) -> AppResult<ride::Model> {
        let request = find_request(self.db, request_id).await?;
        ensure_assigned_to(&request, driver_id)?;
        let request_next = request.status.start()?;

        let ride = find_ride(self.db, request.ride_id).await?;
        let ride_next = ride.status.start()?;
        if ride.driver_id.is_some_and(|current| current != driver_id) {
            return Err(AppError::Conflict(
                "Ride already has a different driver".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let started = ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(request_next))
            .filter(ride_request::Column::Id.eq(request_id))
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Assigned))
            .filter(ride_request::Column::AssignedDriverId.eq(driver_id))
            .exec(&txn)
            .await?;

        // driver_id is written once per booking, here. The placeholder end
        // time moves with the actual start.
        let now = Utc::now();
        let claimed = ride::Entity::update_many()
            .col_expr(ride::Column::Status, Expr::value(ride_next))
            .col_expr(ride::Column::DriverId, Expr::value(Some(driver_id)))
            .col_expr(ride::Column::StartTime, Expr::value(now.fixed_offset()))
            .col_expr(
                ride::Column::EndTime,
                Expr::value(Some((now + Duration::minutes(DEFAULT_TRIP_MINUTES)).fixed_offset())),
            )
            .filter(ride::Column::Id.eq(ride.id))
            .filter(ride::Column::Status.is_in([RideStatus::Requested, RideStatus::Scheduled]))
            .filter(ride::Column::DriverId.is_null())
            .exec(&txn)
            .await?;

        if started.rows_affected == 0 || claimed.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride changed while it was being started".to_string(),
            ));
        }

        txn.commit().await?;

        tracing::info!(ride_id = %ride.id, %request_id, %driver_id, "Ride started");

        find_ride(self.db, ride.id).await
    }

    /// Finish the trip: ride completed with an end time, request completed, vehicle free again.
    pub async fn complete_ride(&self, request_id: Uuid, driver_id: Uuid) -> AppResult<ride::Model> {
        let request = find_request(self.db, request_id).await?;
        ensure_assigned_to(&request, driver_id)?;
        let request_next = request.status.complete()?;

        let ride = find_ride(self.db, request.ride_id).await?;
        let end_time = Utc::now().fixed_offset();
        let ride_next = ride.status.complete(ride.start_time, end_time)?;

        let txn = self.db.begin().await?;

        let finished = ride::Entity::update_many()
            .col_expr(ride::Column::Status, Expr::value(ride_next))
            .col_expr(ride::Column::EndTime, Expr::value(Some(end_time)))
            .filter(ride::Column::Id.eq(ride.id))
            .filter(ride::Column::Status.is_in([RideStatus::Scheduled, RideStatus::InProgress]))
            .exec(&txn)
            .await?;

        if finished.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride changed while it was being completed".to_string(),
            ));
        }

        ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(request_next))
            .filter(ride_request::Column::Id.eq(request_id))
            .exec(&txn)
            .await?;

        free_vehicle(&txn, request.assigned_vehicle_id).await?;
        txn.commit().await?;

        tracing::info!(ride_id = %ride.id, %request_id, %driver_id, "Ride completed");

        find_ride(self.db, ride.id).await
    }

    /// Cancel a ride. A second cancel returns the ride unchanged.
    ///
    /// `user_id` must be the ride's rider for [`CancelledBy::Rider`] and the
    /// assigned driver for [`CancelledBy::Driver`]; system cancels skip the check.
    pub async fn cancel_ride(
        &self,
        ride_id: Uuid,
        cancelled_by: CancelledBy,
        user_id: Option<Uuid>,
        reason: &str,
    ) -> AppResult<(ride::Model, CancelOutcome)> {
        let ride = find_ride(self.db, ride_id).await?;
        let request = ride_request::Entity::find()
            .filter(ride_request::Column::RideId.eq(ride_id))
            .one(self.db)
            .await?;

        match cancelled_by {
            CancelledBy::Rider if user_id != Some(ride.rider_id) => {
                return Err(AppError::Forbidden(
                    "You can only cancel your own rides".to_string(),
                ));
            }
            CancelledBy::Driver => {
                let assigned = request.as_ref().and_then(|r| r.assigned_driver_id);
                if user_id.is_none() || (user_id != assigned && user_id != ride.driver_id) {
                    return Err(AppError::Forbidden(
                        "You are not assigned to this ride".to_string(),
                    ));
                }
            }
            _ => {}
        }

        if ride.status.cancel()? == CancelOutcome::AlreadyCancelled {
            return Ok((ride, CancelOutcome::AlreadyCancelled));
        }

        let txn = self.db.begin().await?;
        let inserted = cancel_in(&txn, &ride, request.as_ref(), cancelled_by, user_id, reason).await;

        match inserted {
            Ok(()) => txn.commit().await?,
            // Lost a race with another cancel; that one already did the work
            Err(AppError::Database(err))
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                drop(txn);
                return Ok((find_ride(self.db, ride_id).await?, CancelOutcome::AlreadyCancelled));
            }
            Err(err) => return Err(err),
        }

        tracing::info!(%ride_id, cancelled_by = ?cancelled_by, "Ride cancelled");

        Ok((find_ride(self.db, ride_id).await?, CancelOutcome::Cancelled))
    }

    /// waiting/assigned -> timeout. The paired ride is cancelled by the system.
    pub async fn timeout_request(&self, request_id: Uuid) -> AppResult<ride_request::Model> {
        let request = find_request(self.db, request_id).await?;
        let next = request.status.expire()?;
        let ride = find_ride(self.db, request.ride_id).await?;

        let txn = self.db.begin().await?;

        let expired = ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(next))
            .filter(ride_request::Column::Id.eq(request_id))
            .filter(
                ride_request::Column::Status
                    .is_in([RideRequestStatus::Waiting, RideRequestStatus::Assigned]),
            )
            .exec(&txn)
            .await?;

        if expired.rows_affected == 0 {
            return Err(AppError::Conflict(
                "Ride request changed while it was timing out".to_string(),
            ));
        }

        free_vehicle(&txn, request.assigned_vehicle_id).await?;

        if !ride.status.is_terminal() {
            insert_cancel(
                &txn,
                ride.id,
                CancelledBy::System,
                None,
                "No driver accepted the request in time",
            )
            .await
            .map_err(|err| match err {
                // A cancel from a participant landed first
                AppError::Database(db_err)
                    if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    AppError::Conflict("Ride was cancelled while timing out".to_string())
                }
                other => other,
            })?;
            mark_ride_cancelled(&txn, ride.id).await?;
        }

        txn.commit().await?;

        tracing::info!(%request_id, ride_id = %ride.id, "Ride request timed out");

        find_request(self.db, request_id).await
    }

    /// Time out every waiting request that has gone `window` without a driver,
    /// counted from the later of the request time and the ride's start time.
    /// Requests that move concurrently (accepted, cancelled) are skipped.
    pub async fn expire_stale_requests(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> AppResult<Vec<ride_request::Model>> {
        let cutoff = (now - window).fixed_offset();
        let stale = ride_request::Entity::find()
            .inner_join(ride::Entity)
            .filter(ride_request::Column::Status.eq(RideRequestStatus::Waiting))
            .filter(ride_request::Column::RequestedAt.lt(cutoff))
            .filter(ride::Column::StartTime.lt(cutoff))
            .all(self.db)
            .await?;

        let mut expired = Vec::with_capacity(stale.len());
        for request in stale {
            match self.timeout_request(request.id).await {
                Ok(updated) => expired.push(updated),
                Err(AppError::Conflict(_)) | Err(AppError::InvalidTransition(_)) => {
                    tracing::debug!(request_id = %request.id, "Skipped request that moved during expiry");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(expired)
    }
}

async fn find_vehicle<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<vehicle::Model> {
    vehicle::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle not found".to_string()))
}

pub(crate) async fn find_ride<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<ride::Model> {
    ride::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

async fn find_request<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<ride_request::Model> {
    ride_request::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))
}

fn ensure_assigned_to(request: &ride_request::Model, driver_id: Uuid) -> AppResult<()> {
    if request.assigned_driver_id != Some(driver_id) {
        return Err(AppError::Forbidden(
            "You are not assigned to this ride request".to_string(),
        ));
    }
    Ok(())
}

async fn insert_location<C: ConnectionTrait>(conn: &C, place: &Place) -> AppResult<location::Model> {
    Ok(location::ActiveModel {
        id: Set(Uuid::new_v4()),
        address: Set(place.address.clone()),
        latitude: Set(place.coordinates.latitude),
        longitude: Set(place.coordinates.longitude),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(conn)
    .await?)
}

async fn free_vehicle<C: ConnectionTrait>(conn: &C, vehicle_id: Option<Uuid>) -> AppResult<()> {
    if let Some(vehicle_id) = vehicle_id {
        vehicle::Entity::update_many()
            .col_expr(vehicle::Column::Available, Expr::value(true))
            .filter(vehicle::Column::Id.eq(vehicle_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

async fn insert_cancel<C: ConnectionTrait>(
    conn: &C,
    ride_id: Uuid,
    cancelled_by: CancelledBy,
    user_id: Option<Uuid>,
    reason: &str,
) -> AppResult<ride_cancel::Model> {
    Ok(ride_cancel::ActiveModel {
        id: Set(Uuid::new_v4()),
        ride_id: Set(ride_id),
        user_id: Set(user_id),
        cancelled_by: Set(cancelled_by),
        reason: Set(reason.to_string()),
        cancelled_at: Set(Utc::now().fixed_offset()),
    }
    .insert(conn)
    .await?)
}

async fn mark_ride_cancelled<C: ConnectionTrait>(conn: &C, ride_id: Uuid) -> AppResult<()> {
    let result = ride::Entity::update_many()
        .col_expr(ride::Column::Status, Expr::value(RideStatus::Cancelled))
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.is_not_in([RideStatus::Completed, RideStatus::Cancelled]))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::Conflict(
            "Ride changed while it was being cancelled".to_string(),
        ));
    }
    Ok(())
}

async fn cancel_in<C: ConnectionTrait>(
    conn: &C,
    ride: &ride::Model,
    request: Option<&ride_request::Model>,
    cancelled_by: CancelledBy,
    user_id: Option<Uuid>,
    reason: &str,
) -> AppResult<()> {
    insert_cancel(conn, ride.id, cancelled_by, user_id, reason).await?;
    mark_ride_cancelled(conn, ride.id).await?;

    if let Some(request) = request.filter(|r| !r.status.is_terminal()) {
        let next = request.status.abort()?;
        ride_request::Entity::update_many()
            .col_expr(ride_request::Column::Status, Expr::value(next))
            .filter(ride_request::Column::Id.eq(request.id))
            .exec(conn)
            .await?;
        free_vehicle(conn, request.assigned_vehicle_id).await?;
    }

    Ok(())
}
