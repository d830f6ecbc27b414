use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::{Condition, Expr}, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ride::RideStatus;
use crate::entities::ride_cancel::CancelledBy;
use crate::entities::ride_request::RideRequestStatus;
use crate::entities::user::{self, UserRole};
use crate::entities::{location, payment, rating, ride, ride_cancel, ride_request, vehicle};
use crate::error::{AppError, AppResult};
use crate::handlers::rider::{CancelRequest, CancelResponse};
use crate::handlers::{request_views, ride_views, RequestView, RideView};
use crate::services::booking::BookingService;
use crate::services::notify::Notification;
use crate::services::payment::PaymentService;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            phone: u.phone,
            role: u.role,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = user::Entity::find()
        .order_by_asc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Rides this user takes part in that have not finished yet.
async fn open_rides_for(state: &AppState, user_id: Uuid) -> AppResult<u64> {
    let open_requests = ride_request::Entity::find()
        .filter(ride_request::Column::AssignedDriverId.eq(user_id))
        .filter(
            ride_request::Column::Status
                .is_in([RideRequestStatus::Assigned, RideRequestStatus::InProgress]),
        )
        .count(&state.db)
        .await?;

    let open_rides = ride::Entity::find()
        .filter(
            Condition::any()
                .add(ride::Column::RiderId.eq(user_id))
                .add(ride::Column::DriverId.eq(user_id)),
        )
        .filter(ride::Column::Status.is_not_in([RideStatus::Completed, RideStatus::Cancelled]))
        .count(&state.db)
        .await?;

    Ok(open_requests + open_rides)
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.role == payload.role {
        return Ok(Json(user.into()));
    }
    if open_rides_for(&state, user_id).await? > 0 {
        return Err(AppError::Conflict(
            "User has rides in progress; finish or cancel them first".to_string(),
        ));
    }

    let mut active: user::ActiveModel = user.into();
    active.role = Set(payload.role);
    let updated = active.update(&state.db).await?;

    tracing::info!(%user_id, role = ?payload.role, "User role changed");

    Ok(Json(updated.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let user = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if open_rides_for(&state, id).await? > 0 {
        return Err(AppError::Conflict(
            "User has rides in progress; finish or cancel them first".to_string(),
        ));
    }

    if user.role == UserRole::Driver {
        let vehicle_ids: Vec<Uuid> = vehicle::Entity::find()
            .filter(vehicle::Column::DriverId.eq(id))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|v| v.id)
            .collect();

        // Ride history keeps its vehicle rows
        let history = ride::Entity::find()
            .filter(ride::Column::VehicleId.is_in(vehicle_ids))
            .count(&state.db)
            .await?;
        if history > 0 {
            return Err(AppError::Conflict(
                "Driver has ride history and cannot be deleted".to_string(),
            ));
        }
    }

    user::Entity::delete_by_id(id).exec(&state.db).await?;

    tracing::info!(user_id = %id, "User deleted");

    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}

pub async fn list_rides(State(state): State<AppState>) -> AppResult<Json<Vec<RideView>>> {
    let rides = ride::Entity::find()
        .order_by_desc(ride::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(ride_views(&state.db, rides).await?))
}

/// Remove a ride that is not under way, with its request, cancel record, ratings and locations.
/// Payments stay for bookkeeping and lose their ride link.
pub async fn delete_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    let request = ride_request::Entity::find()
        .filter(ride_request::Column::RideId.eq(ride_id))
        .one(&state.db)
        .await?;

    let assigned = request
        .as_ref()
        .is_some_and(|r| matches!(r.status, RideRequestStatus::Assigned | RideRequestStatus::InProgress));
    if ride.status == RideStatus::InProgress || assigned {
        return Err(AppError::Conflict(
            "Ride is under way; cancel it before deleting".to_string(),
        ));
    }

    let txn = state.db.begin().await?;

    payment::Entity::update_many()
        .col_expr(payment::Column::RideId, Expr::value(Option::<Uuid>::None))
        .filter(payment::Column::RideId.eq(ride_id))
        .exec(&txn)
        .await?;
    rating::Entity::delete_many()
        .filter(rating::Column::RideId.eq(ride_id))
        .exec(&txn)
        .await?;
    ride_cancel::Entity::delete_many()
        .filter(ride_cancel::Column::RideId.eq(ride_id))
        .exec(&txn)
        .await?;
    ride_request::Entity::delete_many()
        .filter(ride_request::Column::RideId.eq(ride_id))
        .exec(&txn)
        .await?;
    ride::Entity::delete_by_id(ride_id).exec(&txn).await?;
    location::Entity::delete_many()
        .filter(location::Column::Id.is_in([ride.pickup_location_id, ride.dropoff_location_id]))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(%ride_id, "Ride deleted");

    Ok(Json(serde_json::json!({ "message": "Ride deleted" })))
}

pub async fn cancel_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<CancelResponse>> {
    let reason = payload
        .reason
        .unwrap_or_else(|| "Cancelled by operator".to_string());

    let (ride, outcome) = BookingService::new(&state.db, &state.config.fare)
        .cancel_ride(ride_id, CancelledBy::System, None, &reason)
        .await?;

    Ok(Json(CancelResponse { outcome, ride }))
}

pub async fn list_requests(State(state): State<AppState>) -> AppResult<Json<Vec<RequestView>>> {
    let requests = ride_request::Entity::find()
        .order_by_desc(ride_request::Column::RequestedAt)
        .all(&state.db)
        .await?;

    Ok(Json(request_views(&state.db, requests).await?))
}

pub async fn timeout_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request = BookingService::new(&state.db, &state.config.fare)
        .timeout_request(request_id)
        .await?;

    state
        .notifier
        .notify(Notification::RequestTimedOut {
            ride_id: request.ride_id,
            rider_id: request.rider_id,
        })
        .await;

    Ok(Json(request))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireRequest {
    /// Overrides the configured waiting window.
    pub older_than_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: Vec<ride_request::Model>,
}

/// Time out every request that has waited longer than the window
pub async fn expire_requests(
    State(state): State<AppState>,
    Query(payload): Query<ExpireRequest>,
) -> AppResult<Json<ExpireResponse>> {
    let minutes = payload
        .older_than_minutes
        .unwrap_or(state.config.ride_request_timeout_minutes);
    if minutes < 0 {
        return Err(AppError::Validation(
            "Window must not be negative".to_string(),
        ));
    }

    let expired = BookingService::new(&state.db, &state.config.fare)
        .expire_stale_requests(Utc::now(), Duration::minutes(minutes))
        .await?;

    for request in &expired {
        state
            .notifier
            .notify(Notification::RequestTimedOut {
                ride_id: request.ride_id,
                rider_id: request.rider_id,
            })
            .await;
    }

    Ok(Json(ExpireResponse { expired }))
}

pub async fn list_payments(State(state): State<AppState>) -> AppResult<Json<Vec<payment::Model>>> {
    let payments = PaymentService::new(&state.db, state.payments.as_deref(), &state.config.currency)
        .list_all()
        .await?;

    Ok(Json(payments))
}
