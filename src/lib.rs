pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::notify::{LogNotifier, Notifier};
use services::otp::{MemoryOtpStore, OtpStore};
use services::payment::{PaymentGateway, StripeGateway};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    /// `None` when no gateway key is configured; card payments are then refused.
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub otp: Arc<dyn OtpStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        let payments = config.stripe_secret_key.as_ref().map(|key| {
            Arc::new(StripeGateway::new(config.stripe_api_base.clone(), key.clone()))
                as Arc<dyn PaymentGateway>
        });

        Self {
            db,
            config,
            payments,
            otp: Arc::new(MemoryOtpStore::new()),
            notifier: Arc::new(LogNotifier),
        }
    }
}
