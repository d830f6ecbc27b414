use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_locations::Location;
use super::m20250301_000003_create_vehicles::Vehicle;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ride::Table)
                    .if_not_exists()
                    .col(uuid(Ride::Id).primary_key())
                    .col(uuid(Ride::RiderId).not_null())
                    .col(uuid_null(Ride::DriverId))
                    .col(uuid(Ride::VehicleId).not_null())
                    .col(uuid(Ride::PickupLocationId).not_null())
                    .col(uuid(Ride::DropoffLocationId).not_null())
                    .col(string_len(Ride::Status, 16).not_null())
                    .col(double(Ride::Fare).not_null())
                    .col(double(Ride::DistanceKm).not_null())
                    .col(timestamp_with_time_zone(Ride::StartTime).not_null())
                    .col(timestamp_with_time_zone_null(Ride::EndTime))
                    .col(
                        timestamp_with_time_zone(Ride::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Ride::Fare).gte(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_rider")
                            .from(Ride::Table, Ride::RiderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_driver")
                            .from(Ride::Table, Ride::DriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_vehicle")
                            .from(Ride::Table, Ride::VehicleId)
                            .to(Vehicle::Table, Vehicle::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_pickup_location")
                            .from(Ride::Table, Ride::PickupLocationId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_dropoff_location")
                            .from(Ride::Table, Ride::DropoffLocationId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ride::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Ride {
    Table,
    Id,
    RiderId,
    DriverId,
    VehicleId,
    PickupLocationId,
    DropoffLocationId,
    Status,
    Fare,
    DistanceKm,
    StartTime,
    EndTime,
    CreatedAt,
}
