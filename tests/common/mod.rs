#![allow(dead_code)]

use chrono::{Duration, Utc};
use ride_hailing_backend::entities::user::UserRole;
use ride_hailing_backend::entities::{
    location, payment, rating, ride, ride_cancel, ride_request, user, vehicle, wallet,
    wallet_transaction,
};
use ride_hailing_backend::services::booking::{Booking, BookingRequest, BookingService, Place};
use ride_hailing_backend::services::fare::{FareTable, TimeBand};
use ride_hailing_backend::utils::geo::Coordinates;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait,
    IntoActiveModel, Schema, Set,
};
use uuid::Uuid;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub struct TestSetup {
    pub db: DatabaseConnection,
    pub fare: FareTable,
}

impl TestSetup {
    /// Fresh in-memory database with every table created from the entities.
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let schema = Schema::new(DbBackend::Sqlite);

        let statements = vec![
            schema.create_table_from_entity(user::Entity),
            schema.create_table_from_entity(location::Entity),
            schema.create_table_from_entity(vehicle::Entity),
            schema.create_table_from_entity(ride::Entity),
            schema.create_table_from_entity(ride_request::Entity),
            schema.create_table_from_entity(ride_cancel::Entity),
            schema.create_table_from_entity(payment::Entity),
            schema.create_table_from_entity(rating::Entity),
            schema.create_table_from_entity(wallet::Entity),
            schema.create_table_from_entity(wallet_transaction::Entity),
        ];

        for statement in statements {
            db.execute(db.get_database_backend().build(&statement))
                .await
                .unwrap();
        }

        Self {
            db,
            fare: FareTable::default(),
        }
    }

    pub fn bookings(&self) -> BookingService<'_> {
        BookingService::new(&self.db, &self.fare)
    }

    pub async fn insert_user(&self, role: UserRole) -> user::Model {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@example.com", id)),
            password_hash: Set("not-a-real-hash".to_string()),
            name: Set(format!("{:?} {}", role, &id.to_string()[..8])),
            phone: Set(None),
            role: Set(role),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    pub async fn insert_vehicle(&self, driver_id: Uuid, rate_per_km: f64) -> vehicle::Model {
        let id = Uuid::new_v4();
        vehicle::ActiveModel {
            id: Set(id),
            driver_id: Set(driver_id),
            plate_number: Set(id.to_string()[..8].to_uppercase()),
            vehicle_type: Set("sedan".to_string()),
            rental_rate_per_km: Set(rate_per_km),
            available: Set(true),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    /// A driver with one vehicle at 10 per km.
    pub async fn insert_driver_with_vehicle(&self) -> (user::Model, vehicle::Model) {
        let driver = self.insert_user(UserRole::Driver).await;
        let vehicle = self.insert_vehicle(driver.id, 10.0).await;
        (driver, vehicle)
    }

    /// One degree of longitude along the equator, picked up now.
    pub async fn book(&self, rider_id: Uuid, vehicle_id: Uuid, band: TimeBand) -> Booking {
        self.bookings()
            .create_booking(booking_request(rider_id, vehicle_id, band))
            .await
            .unwrap()
    }

    pub async fn vehicle(&self, id: Uuid) -> vehicle::Model {
        vehicle::Entity::find_by_id(id).one(&self.db).await.unwrap().unwrap()
    }

    pub async fn ride(&self, id: Uuid) -> ride::Model {
        ride::Entity::find_by_id(id).one(&self.db).await.unwrap().unwrap()
    }

    pub async fn request(&self, id: Uuid) -> ride_request::Model {
        ride_request::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .unwrap()
            .unwrap()
    }

    /// Push a booking's request time and pickup time `by` into the past.
    pub async fn age(&self, booking: &Booking, by: Duration) {
        let mut request = self.request(booking.request.id).await.into_active_model();
        request.requested_at = Set(booking.request.requested_at - by);
        request.update(&self.db).await.unwrap();

        let mut ride = self.ride(booking.ride.id).await.into_active_model();
        ride.start_time = Set(booking.ride.start_time - by);
        ride.update(&self.db).await.unwrap();
    }

    /// Booked, accepted, started and completed by a fresh driver.
    pub async fn completed_ride(&self) -> (user::Model, user::Model, ride::Model) {
        let rider = self.insert_user(UserRole::Rider).await;
        let (driver, vehicle) = self.insert_driver_with_vehicle().await;
        let booking = self.book(rider.id, vehicle.id, TimeBand::Normal).await;

        let service = self.bookings();
        service
            .accept_request(booking.request.id, driver.id, vehicle.id)
            .await
            .unwrap();
        service.start_ride(booking.request.id, driver.id).await.unwrap();
        let ride = service
            .complete_ride(booking.request.id, driver.id)
            .await
            .unwrap();

        (rider, driver, ride)
    }
}

pub fn place(address: &str, latitude: f64, longitude: f64) -> Place {
    Place {
        address: address.to_string(),
        coordinates: Coordinates::new(latitude, longitude),
    }
}

pub fn booking_request(rider_id: Uuid, vehicle_id: Uuid, band: TimeBand) -> BookingRequest {
    BookingRequest {
        rider_id,
        vehicle_id,
        pickup: place("Gulf of Guinea, west buoy", 0.0, 0.0),
        dropoff: place("Gulf of Guinea, east buoy", 0.0, 1.0),
        scheduled_time: Utc::now() - Duration::seconds(1),
        time_band: band,
    }
}
