use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000002_create_locations::Location;
use super::m20250301_000003_create_vehicles::Vehicle;
use super::m20250301_000004_create_rides::Ride;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RideRequest::Table)
                    .if_not_exists()
                    .col(uuid(RideRequest::Id).primary_key())
                    .col(uuid(RideRequest::RideId).not_null().unique_key())
                    .col(uuid(RideRequest::RiderId).not_null())
                    .col(uuid_null(RideRequest::AssignedDriverId))
                    .col(uuid_null(RideRequest::AssignedVehicleId))
                    .col(uuid(RideRequest::PickupLocationId).not_null())
                    .col(uuid(RideRequest::DropoffLocationId).not_null())
                    .col(string_len(RideRequest::Status, 16).not_null())
                    .col(string_len(RideRequest::PreferredVehicleType, 32).not_null())
                    .col(
                        timestamp_with_time_zone(RideRequest::RequestedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_ride")
                            .from(RideRequest::Table, RideRequest::RideId)
                            .to(Ride::Table, Ride::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_rider")
                            .from(RideRequest::Table, RideRequest::RiderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_driver")
                            .from(RideRequest::Table, RideRequest::AssignedDriverId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_vehicle")
                            .from(RideRequest::Table, RideRequest::AssignedVehicleId)
                            .to(Vehicle::Table, Vehicle::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_pickup_location")
                            .from(RideRequest::Table, RideRequest::PickupLocationId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_request_dropoff_location")
                            .from(RideRequest::Table, RideRequest::DropoffLocationId)
                            .to(Location::Table, Location::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Drivers poll the waiting queue ordered by request time
        manager
            .create_index(
                Index::create()
                    .name("idx_ride_request_status_requested_at")
                    .table(RideRequest::Table)
                    .col(RideRequest::Status)
                    .col(RideRequest::RequestedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideRequest::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideRequest {
    Table,
    Id,
    RideId,
    RiderId,
    AssignedDriverId,
    AssignedVehicleId,
    PickupLocationId,
    DropoffLocationId,
    Status,
    PreferredVehicleType,
    RequestedAt,
}
