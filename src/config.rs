use std::env;
use std::str::FromStr;

use crate::services::fare::FareTable;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    pub admin_email: String,
    pub admin_password: String,
    pub fare: FareTable,
    pub currency: String,
    pub ride_request_timeout_minutes: i64,
    pub otp_ttl_seconds: i64,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = FareTable::default();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: parse_var("JWT_EXPIRATION_HOURS", 24),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 3000),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@ridehail.local".to_string()),
            admin_password: env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
            fare: FareTable {
                normal: parse_var("FARE_MULTIPLIER_NORMAL", defaults.normal),
                rush: parse_var("FARE_MULTIPLIER_RUSH", defaults.rush),
                evening: parse_var("FARE_MULTIPLIER_EVENING", defaults.evening),
                early_morning: parse_var("FARE_MULTIPLIER_EARLY_MORNING", defaults.early_morning),
                service_fee: parse_var("FARE_SERVICE_FEE", defaults.service_fee),
                tip_rate: parse_var("FARE_TIP_RATE", defaults.tip_rate),
            },
            currency: env::var("FARE_CURRENCY")
                .unwrap_or_else(|_| "usd".to_string()),
            ride_request_timeout_minutes: parse_var("RIDE_REQUEST_TIMEOUT_MINUTES", 10),
            otp_ttl_seconds: parse_var("OTP_TTL_SECONDS", 300),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a number", name)),
        Err(_) => default,
    }
}
