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
                    .table(Payment::Table)
                    .if_not_exists()
                    .col(uuid(Payment::Id).primary_key())
                    .col(uuid_null(Payment::RideId))
                    .col(uuid(Payment::UserId).not_null())
                    .col(double(Payment::Amount).not_null())
                    .col(string_len(Payment::Currency, 8).not_null())
                    .col(string_len(Payment::Method, 16).not_null())
                    .col(string_len(Payment::Status, 16).not_null())
                    .col(string_len_null(Payment::StripePaymentIntentId, 255).unique_key())
                    .col(timestamp_with_time_zone_null(Payment::PaidAt))
                    .col(
                        timestamp_with_time_zone(Payment::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_ride")
                            .from(Payment::Table, Payment::RideId)
                            .to(Ride::Table, Ride::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_user")
                            .from(Payment::Table, Payment::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payment::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Payment {
    Table,
    Id,
    RideId,
    UserId,
    Amount,
    Currency,
    Method,
    Status,
    StripePaymentIntentId,
    PaidAt,
    CreatedAt,
}
