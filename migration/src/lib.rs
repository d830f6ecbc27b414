pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_users;
mod m20250301_000002_create_locations;
mod m20250301_000003_create_vehicles;
mod m20250301_000004_create_rides;
mod m20250301_000005_create_ride_requests;
mod m20250301_000006_create_ride_cancels;
mod m20250301_000007_create_payments;
mod m20250301_000008_create_ratings;
mod m20250301_000009_create_wallets;
mod m20250315_000010_add_partial_unique_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_users::Migration),
            Box::new(m20250301_000002_create_locations::Migration),
            Box::new(m20250301_000003_create_vehicles::Migration),
            Box::new(m20250301_000004_create_rides::Migration),
            Box::new(m20250301_000005_create_ride_requests::Migration),
            Box::new(m20250301_000006_create_ride_cancels::Migration),
            Box::new(m20250301_000007_create_payments::Migration),
            Box::new(m20250301_000008_create_ratings::Migration),
            Box::new(m20250301_000009_create_wallets::Migration),
            Box::new(m20250315_000010_add_partial_unique_indexes::Migration),
        ]
    }
}
