use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;
use super::m20250301_000004_create_rides::Ride;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RideCancel::Table)
                    .if_not_exists()
                    .col(uuid(RideCancel::Id).primary_key())
                    .col(uuid(RideCancel::RideId).not_null().unique_key())
                    .col(uuid_null(RideCancel::UserId))
                    .col(string_len(RideCancel::CancelledBy, 16).not_null())
                    .col(text(RideCancel::Reason).not_null())
                    .col(
                        timestamp_with_time_zone(RideCancel::CancelledAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_cancel_ride")
                            .from(RideCancel::Table, RideCancel::RideId)
                            .to(Ride::Table, Ride::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ride_cancel_user")
                            .from(RideCancel::Table, RideCancel::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RideCancel::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum RideCancel {
    Table,
    Id,
    RideId,
    UserId,
    CancelledBy,
    Reason,
    CancelledAt,
}
