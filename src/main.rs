use std::net::SocketAddr;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ride_hailing_backend::{
    config::Config,
    db,
    entities::user::{self, UserRole},
    handlers::auth::hash_password,
    routes,
    services::booking::BookingService,
    AppState,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ride_hailing_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    seed_admin(&db, &config).await;

    let state = AppState::new(db, config.clone());
    if state.payments.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set, card payments are disabled");
    }

    tokio::spawn(expire_requests_periodically(state.clone()));

    let app = routes::create_app(state);

    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

/// Sweep requests nobody accepted within the configured window.
async fn expire_requests_periodically(state: AppState) {
    let window = Duration::minutes(state.config.ride_request_timeout_minutes);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));

    loop {
        ticker.tick().await;

        let result = BookingService::new(&state.db, &state.config.fare)
            .expire_stale_requests(Utc::now(), window)
            .await;

        match result {
            Ok(expired) if !expired.is_empty() => {
                tracing::info!(count = expired.len(), "Timed out stale ride requests");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Ride request sweep failed"),
        }
    }
}

async fn seed_admin(db: &DatabaseConnection, config: &Config) {
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&config.admin_email))
        .one(db)
        .await
        .expect("Failed to check for admin");

    if existing.is_none() {
        let admin = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(config.admin_email.clone()),
            password_hash: Set(
                hash_password(&config.admin_password).expect("Failed to hash admin password"),
            ),
            name: Set("Admin".to_string()),
            phone: Set(None),
            role: Set(UserRole::Admin),
            created_at: Set(Utc::now().fixed_offset()),
        };

        admin.insert(db).await.expect("Failed to create admin");
        tracing::info!("Admin account created: {}", config.admin_email);
    }
}
