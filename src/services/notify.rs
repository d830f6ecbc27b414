use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::entities::ride_cancel::CancelledBy;

/// Something a rider or driver should hear about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    RideBooked { ride_id: Uuid, rider_id: Uuid },
    RequestAccepted { ride_id: Uuid, rider_id: Uuid, driver_id: Uuid },
    RequestReleased { ride_id: Uuid, rider_id: Uuid },
    RideStarted { ride_id: Uuid, rider_id: Uuid },
    RideCompleted { ride_id: Uuid, rider_id: Uuid, fare: f64 },
    RideCancelled { ride_id: Uuid, cancelled_by: CancelledBy },
    RequestTimedOut { ride_id: Uuid, rider_id: Uuid },
    VerificationCode { destination: String, code: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Writes notifications to the log. Stand-in until a push/SMS provider is wired.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        match &notification {
            Notification::VerificationCode { destination, .. } => {
                tracing::info!(%destination, "Verification code sent");
                tracing::debug!(?notification, "Verification code payload");
            }
            other => tracing::info!(notification = ?other, "Notification"),
        }
    }
}
