use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::vehicle;
use crate::error::{AppError, AppResult};
use crate::services::booking::BookingService;
use crate::services::fare::{FareQuote, TimeBand};
use crate::utils::geo::Coordinates;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    /// Price with this vehicle's rate...
    pub vehicle_id: Option<Uuid>,
    /// ...or with an explicit rate when no vehicle is chosen yet.
    pub rate_per_km: Option<f64>,
    /// Defaults to now. Determines the time band.
    pub pickup_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub distance_km: f64,
    pub currency: String,
    #[serde(flatten)]
    pub quote: FareQuote,
}

/// Price a trip without booking it
pub async fn estimate_fare(
    State(state): State<AppState>,
    Json(payload): Json<EstimateRequest>,
) -> AppResult<Json<EstimateResponse>> {
    let band = TimeBand::for_time(payload.pickup_time.unwrap_or_else(Utc::now));

    let (distance_km, quote) = match (payload.vehicle_id, payload.rate_per_km) {
        (Some(vehicle_id), _) => {
            BookingService::new(&state.db, &state.config.fare)
                .quote(vehicle_id, payload.pickup, payload.dropoff, band)
                .await?
        }
        (None, Some(rate)) => {
            payload.pickup.validate()?;
            payload.dropoff.validate()?;
            let distance_km = payload.pickup.distance_to(&payload.dropoff);
            (distance_km, state.config.fare.estimate(distance_km, rate, band)?)
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "Either vehicle_id or rate_per_km is required".to_string(),
            ));
        }
    };

    Ok(Json(EstimateResponse {
        distance_km: (distance_km * 1000.0).round() / 1000.0,
        currency: state.config.currency.clone(),
        quote: quote.rounded(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VehicleFilter {
    pub vehicle_type: Option<String>,
}

/// Vehicles not currently reserved by an accepted request
pub async fn available_vehicles(
    State(state): State<AppState>,
    Query(filter): Query<VehicleFilter>,
) -> AppResult<Json<Vec<vehicle::Model>>> {
    let mut query = vehicle::Entity::find().filter(vehicle::Column::Available.eq(true));
    if let Some(vehicle_type) = filter.vehicle_type {
        query = query.filter(vehicle::Column::VehicleType.eq(vehicle_type));
    }

    let vehicles = query
        .order_by_asc(vehicle::Column::RentalRatePerKm)
        .all(&state.db)
        .await?;

    Ok(Json(vehicles))
}
