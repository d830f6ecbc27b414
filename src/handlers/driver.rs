use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::ride_cancel::CancelledBy;
use crate::entities::{ride, ride_request, vehicle};
use crate::error::{AppError, AppResult};
use crate::handlers::rider::{CancelRequest, CancelResponse};
use crate::handlers::{request_views, ride_view, ride_views, RequestView, RideView};
use crate::services::booking::BookingService;
use crate::services::lifecycle::CancelOutcome;
use crate::services::notify::Notification;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub plate_number: String,
    pub vehicle_type: String,
    pub rental_rate_per_km: f64,
}

pub async fn add_vehicle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateVehicleRequest>,
) -> AppResult<Json<vehicle::Model>> {
    let plate_number = payload.plate_number.trim().to_uppercase();
    if plate_number.is_empty() || payload.vehicle_type.trim().is_empty() {
        return Err(AppError::Validation(
            "Plate number and vehicle type are required".to_string(),
        ));
    }
    if !payload.rental_rate_per_km.is_finite() || payload.rental_rate_per_km < 0.0 {
        return Err(AppError::Validation(
            "Rate per km must be a non-negative number".to_string(),
        ));
    }

    let taken = vehicle::Entity::find()
        .filter(vehicle::Column::PlateNumber.eq(&plate_number))
        .one(&state.db)
        .await?;
    if taken.is_some() {
        return Err(AppError::Conflict("Plate number already registered".to_string()));
    }

    let vehicle = vehicle::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(claims.sub),
        plate_number: Set(plate_number),
        vehicle_type: Set(payload.vehicle_type.trim().to_lowercase()),
        rental_rate_per_km: Set(payload.rental_rate_per_km),
        available: Set(true),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(&state.db)
    .await?;

    Ok(Json(vehicle))
}

pub async fn my_vehicles(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<vehicle::Model>>> {
    let vehicles = vehicle::Entity::find()
        .filter(vehicle::Column::DriverId.eq(claims.sub))
        .all(&state.db)
        .await?;

    Ok(Json(vehicles))
}

/// Waiting requests, oldest first
pub async fn open_requests(State(state): State<AppState>) -> AppResult<Json<Vec<RequestView>>> {
    let requests = BookingService::new(&state.db, &state.config.fare)
        .open_requests()
        .await?;

    Ok(Json(request_views(&state.db, requests).await?))
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub vehicle_id: Uuid,
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> AppResult<Json<ride_request::Model>> {
    let request = BookingService::new(&state.db, &state.config.fare)
        .accept_request(request_id, claims.sub, payload.vehicle_id)
        .await?;

    state
        .notifier
        .notify(Notification::RequestAccepted {
            ride_id: request.ride_id,
            rider_id: request.rider_id,
            driver_id: claims.sub,
        })
        .await;

    Ok(Json(request))
}

pub async fn release_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<ride_request::Model>> {
    let request = BookingService::new(&state.db, &state.config.fare)
        .release_request(request_id, claims.sub)
        .await?;

    state
        .notifier
        .notify(Notification::RequestReleased {
            ride_id: request.ride_id,
            rider_id: request.rider_id,
        })
        .await;

    Ok(Json(request))
}

pub async fn start_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RideView>> {
    let ride = BookingService::new(&state.db, &state.config.fare)
        .start_ride(request_id, claims.sub)
        .await?;

    state
        .notifier
        .notify(Notification::RideStarted {
            ride_id: ride.id,
            rider_id: ride.rider_id,
        })
        .await;

    Ok(Json(ride_view(&state.db, ride).await?))
}

pub async fn complete_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<Uuid>,
) -> AppResult<Json<RideView>> {
    let ride = BookingService::new(&state.db, &state.config.fare)
        .complete_ride(request_id, claims.sub)
        .await?;

    state
        .notifier
        .notify(Notification::RideCompleted {
            ride_id: ride.id,
            rider_id: ride.rider_id,
            fare: ride.fare,
        })
        .await;

    Ok(Json(ride_view(&state.db, ride).await?))
}

pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<CancelResponse>> {
    let reason = payload
        .reason
        .unwrap_or_else(|| "Cancelled by driver".to_string());

    let (ride, outcome) = BookingService::new(&state.db, &state.config.fare)
        .cancel_ride(ride_id, CancelledBy::Driver, Some(claims.sub), &reason)
        .await?;

    if outcome == CancelOutcome::Cancelled {
        state
            .notifier
            .notify(Notification::RideCancelled {
                ride_id,
                cancelled_by: CancelledBy::Driver,
            })
            .await;
    }

    Ok(Json(CancelResponse { outcome, ride }))
}

/// Rides this driver has started, newest first
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<RideView>>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(claims.sub))
        .order_by_desc(ride::Column::StartTime)
        .all(&state.db)
        .await?;

    Ok(Json(ride_views(&state.db, rides).await?))
}
