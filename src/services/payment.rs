//! Ride payments: card payments through an external gateway, or wallet debits.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::payment::{PaymentMethod, PaymentStatus};
use crate::entities::ride::RideStatus;
use crate::entities::wallet_transaction::TransactionKind;
use crate::entities::{payment, ride};
use crate::error::{AppError, AppResult};
use crate::services::booking::find_ride;
use crate::services::wallet::apply_in;

/// Gateway-side view of a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub client_secret: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl PaymentIntent {
    pub fn local_status(&self) -> PaymentStatus {
        match self.status.as_str() {
            "succeeded" => PaymentStatus::Succeeded,
            "processing" => PaymentStatus::Processing,
            "canceled" => PaymentStatus::Canceled,
            "requires_payment_method" if self.last_payment_error.is_some() => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        ride_id: Uuid,
    ) -> AppResult<PaymentIntent>;

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<PaymentIntent>;
}

/// Stripe PaymentIntents over its REST API.
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    async fn read_intent(response: reqwest::Response) -> AppResult<PaymentIntent> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(AppError::PaymentGateway(format!("{}: {}", status, message)));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Malformed gateway response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        ride_id: Uuid,
    ) -> AppResult<PaymentIntent> {
        let params = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.to_lowercase()),
            ("metadata[ride_id]", ride_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        Self::read_intent(response).await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<PaymentIntent> {
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        Self::read_intent(response).await
    }
}

/// A stored card payment plus the secret the client needs to confirm it.
#[derive(Debug, Clone, Serialize)]
pub struct CardPayment {
    pub payment: payment::Model,
    pub client_secret: Option<String>,
}

pub struct PaymentService<'a> {
    db: &'a DatabaseConnection,
    gateway: Option<&'a dyn PaymentGateway>,
    currency: &'a str,
}

impl<'a> PaymentService<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        gateway: Option<&'a dyn PaymentGateway>,
        currency: &'a str,
    ) -> Self {
        Self { db, gateway, currency }
    }

    fn gateway(&self) -> AppResult<&'a dyn PaymentGateway> {
        self.gateway
            .ok_or_else(|| AppError::PaymentGateway("Card payments are not configured".to_string()))
    }

    pub async fn create_card_payment(&self, ride_id: Uuid, user_id: Uuid) -> AppResult<CardPayment> {
        let gateway = self.gateway()?;
        let ride = payable_ride(self.db, ride_id, user_id).await?;

        let amount_minor = (ride.fare * 100.0).round() as i64;
        let intent = gateway.create_intent(amount_minor, self.currency, ride.id).await?;

        let now = Utc::now().fixed_offset();
        let status = intent.local_status();
        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            ride_id: Set(Some(ride.id)),
            user_id: Set(user_id),
            amount: Set(ride.fare),
            currency: Set(self.currency.to_string()),
            method: Set(PaymentMethod::Card),
            status: Set(status),
            stripe_payment_intent_id: Set(Some(intent.id.clone())),
            paid_at: Set((status == PaymentStatus::Succeeded).then_some(now)),
            created_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(already_paid)?;

        tracing::info!(payment_id = %payment.id, %ride_id, intent_id = %intent.id, "Card payment created");

        Ok(CardPayment {
            payment,
            client_secret: intent.client_secret,
        })
    }

    /// Refresh a card payment from the gateway. Wallet payments are returned as stored.
    pub async fn confirm_payment(&self, payment_id: Uuid, user_id: Uuid) -> AppResult<payment::Model> {
        let existing = payment::Entity::find_by_id(payment_id)
            .one(self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        if existing.user_id != user_id {
            return Err(AppError::Forbidden("Not your payment".to_string()));
        }

        let intent_id = match (&existing.method, &existing.stripe_payment_intent_id) {
            (PaymentMethod::Card, Some(intent_id)) => intent_id.clone(),
            _ => return Ok(existing),
        };

        let intent = self.gateway()?.retrieve_intent(&intent_id).await?;
        let status = intent.local_status();
        if status == existing.status {
            return Ok(existing);
        }

        let paid_at = match (status, existing.paid_at) {
            (PaymentStatus::Succeeded, None) => Some(Utc::now().fixed_offset()),
            (_, paid_at) => paid_at,
        };

        let mut active = existing.into_active_model();
        active.status = Set(status);
        active.paid_at = Set(paid_at);
        let updated = active.update(self.db).await.map_err(already_paid)?;

        tracing::info!(%payment_id, status = ?status, "Payment status refreshed");

        Ok(updated)
    }

    /// Debit the rider's wallet and record the payment as one unit.
    pub async fn pay_with_wallet(&self, ride_id: Uuid, user_id: Uuid) -> AppResult<payment::Model> {
        let txn = self.db.begin().await?;

        // Paid-once check shares the debit transaction
        let ride = payable_ride(&txn, ride_id, user_id).await?;

        apply_in(
            &txn,
            user_id,
            self.currency,
            TransactionKind::Debit,
            ride.fare,
            &format!("ride:{}", ride.id),
        )
        .await?;

        let now = Utc::now().fixed_offset();
        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            ride_id: Set(Some(ride.id)),
            user_id: Set(user_id),
            amount: Set(ride.fare),
            currency: Set(self.currency.to_string()),
            method: Set(PaymentMethod::Wallet),
            status: Set(PaymentStatus::Succeeded),
            stripe_payment_intent_id: Set(None),
            paid_at: Set(Some(now)),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(already_paid)?;

        txn.commit().await?;

        tracing::info!(payment_id = %payment.id, %ride_id, amount = payment.amount, "Wallet payment recorded");

        Ok(payment)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<payment::Model>> {
        Ok(payment::Entity::find()
            .filter(payment::Column::UserId.eq(user_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(self.db)
            .await?)
    }

    pub async fn list_all(&self) -> AppResult<Vec<payment::Model>> {
        Ok(payment::Entity::find()
            .order_by_desc(payment::Column::CreatedAt)
            .all(self.db)
            .await?)
    }
}

async fn payable_ride<C: ConnectionTrait>(conn: &C, ride_id: Uuid, user_id: Uuid) -> AppResult<ride::Model> {
    let ride = find_ride(conn, ride_id).await?;
    if ride.rider_id != user_id {
        return Err(AppError::Forbidden(
            "You can only pay for your own rides".to_string(),
        ));
    }
    if ride.status == RideStatus::Cancelled {
        return Err(AppError::Validation(
            "Cancelled rides cannot be paid".to_string(),
        ));
    }

    let paid = payment::Entity::find()
        .filter(payment::Column::RideId.eq(ride_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Succeeded))
        .one(conn)
        .await?;
    if paid.is_some() {
        return Err(AppError::Conflict("Ride is already paid".to_string()));
    }

    Ok(ride)
}

fn already_paid(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Ride is already paid".to_string())
        }
        _ => AppError::Database(err),
    }
}
