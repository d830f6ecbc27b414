use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::payment::{self, PaymentMethod};
use crate::entities::ride_cancel::CancelledBy;
use crate::entities::{rating, ride, ride_request, wallet, wallet_transaction};
use crate::error::{AppError, AppResult};
use crate::handlers::{ride_view, ride_views, RideView};
use crate::services::booking::{BookingRequest, BookingService, Place};
use crate::services::fare::{FareQuote, TimeBand};
use crate::services::lifecycle::CancelOutcome;
use crate::services::notify::Notification;
use crate::services::payment::PaymentService;
use crate::services::rating::RatingService;
use crate::services::wallet::WalletService;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub vehicle_id: Uuid,
    pub pickup: Place,
    pub dropoff: Place,
    /// Omitted for an immediate ride.
    pub scheduled_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub ride: RideView,
    pub request: ride_request::Model,
    pub quote: FareQuote,
}

/// Book a ride. The fare band comes from the pickup time, not from the client.
pub async fn create_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRideRequest>,
) -> AppResult<Json<BookingResponse>> {
    let scheduled_time = payload.scheduled_time.unwrap_or_else(Utc::now);

    let booking = BookingService::new(&state.db, &state.config.fare)
        .create_booking(BookingRequest {
            rider_id: claims.sub,
            vehicle_id: payload.vehicle_id,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            scheduled_time,
            time_band: TimeBand::for_time(scheduled_time),
        })
        .await?;

    state
        .notifier
        .notify(Notification::RideBooked {
            ride_id: booking.ride.id,
            rider_id: claims.sub,
        })
        .await;

    Ok(Json(BookingResponse {
        ride: RideView {
            ride: booking.ride,
            pickup: Some(booking.pickup),
            dropoff: Some(booking.dropoff),
        },
        request: booking.request,
        quote: booking.quote.rounded(),
    }))
}

pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<RideView>>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::RiderId.eq(claims.sub))
        .order_by_desc(ride::Column::StartTime)
        .all(&state.db)
        .await?;

    Ok(Json(ride_views(&state.db, rides).await?))
}

pub async fn get_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<RideView>> {
    let ride = ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .filter(|r| r.rider_id == claims.sub)
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    Ok(Json(ride_view(&state.db, ride).await?))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub start_time: DateTime<Utc>,
}

pub async fn schedule_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<ScheduleRequest>,
) -> AppResult<Json<RideView>> {
    let ride = BookingService::new(&state.db, &state.config.fare)
        .schedule_ride(ride_id, claims.sub, payload.start_time)
        .await?;

    Ok(Json(ride_view(&state.db, ride).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub outcome: CancelOutcome,
    pub ride: ride::Model,
}

pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<CancelResponse>> {
    let reason = payload
        .reason
        .unwrap_or_else(|| "Cancelled by rider".to_string());

    let (ride, outcome) = BookingService::new(&state.db, &state.config.fare)
        .cancel_ride(ride_id, CancelledBy::Rider, Some(claims.sub), &reason)
        .await?;

    if outcome == CancelOutcome::Cancelled {
        state
            .notifier
            .notify(Notification::RideCancelled {
                ride_id,
                cancelled_by: CancelledBy::Rider,
            })
            .await;
    }

    Ok(Json(CancelResponse { outcome, ride }))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub score: i32,
    pub comment: Option<String>,
}

/// Shared by riders and drivers; the service works out who is being rated.
pub async fn rate_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> AppResult<Json<rating::Model>> {
    let rating = RatingService::new(&state.db)
        .rate_ride(ride_id, claims.sub, payload.score, payload.comment)
        .await?;

    Ok(Json(rating))
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct PayResponse {
    pub payment: payment::Model,
    /// Handed to the client SDK to confirm a card payment.
    pub client_secret: Option<String>,
}

pub async fn pay_for_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<PayRequest>,
) -> AppResult<Json<PayResponse>> {
    let service = PaymentService::new(
        &state.db,
        state.payments.as_deref(),
        &state.config.currency,
    );

    let response = match payload.method {
        PaymentMethod::Card => {
            let card = service.create_card_payment(ride_id, claims.sub).await?;
            PayResponse {
                payment: card.payment,
                client_secret: card.client_secret,
            }
        }
        PaymentMethod::Wallet => PayResponse {
            payment: service.pay_with_wallet(ride_id, claims.sub).await?,
            client_secret: None,
        },
    };

    Ok(Json(response))
}

pub async fn my_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<payment::Model>>> {
    let payments = PaymentService::new(&state.db, state.payments.as_deref(), &state.config.currency)
        .list_for_user(claims.sub)
        .await?;

    Ok(Json(payments))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<payment::Model>> {
    let payment = PaymentService::new(&state.db, state.payments.as_deref(), &state.config.currency)
        .confirm_payment(payment_id, claims.sub)
        .await?;

    Ok(Json(payment))
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet: wallet::Model,
    pub transactions: Vec<wallet_transaction::Model>,
}

pub async fn my_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<WalletResponse>> {
    let service = WalletService::new(&state.db, &state.config.currency);
    let wallet = service.get_or_create_wallet(claims.sub).await?;
    let transactions = service.history(claims.sub).await?;

    Ok(Json(WalletResponse {
        wallet,
        transactions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: f64,
    pub reference: Option<String>,
}

pub async fn top_up_wallet(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<TopUpRequest>,
) -> AppResult<Json<wallet_transaction::Model>> {
    let reference = payload.reference.unwrap_or_else(|| "top-up".to_string());
    let (_, entry) = WalletService::new(&state.db, &state.config.currency)
        .credit(claims.sub, payload.amount, &reference)
        .await?;

    Ok(Json(entry))
}
