use sea_orm_migration::{prelude::*, schema::*};

use super::m20250301_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Wallet::Table)
                    .if_not_exists()
                    .col(uuid(Wallet::Id).primary_key())
                    .col(uuid(Wallet::UserId).not_null().unique_key())
                    .col(double(Wallet::Balance).not_null().default(0.0))
                    .col(string_len(Wallet::Currency, 8).not_null())
                    .col(
                        timestamp_with_time_zone(Wallet::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::col(Wallet::Balance).gte(0.0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_wallet_user")
                            .from(Wallet::Table, Wallet::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WalletTransaction::Table)
                    .if_not_exists()
                    .col(uuid(WalletTransaction::Id).primary_key())
                    .col(uuid(WalletTransaction::WalletId).not_null())
                    .col(string_len(WalletTransaction::Kind, 8).not_null())
                    .col(double(WalletTransaction::Amount).not_null())
                    .col(double(WalletTransaction::BalanceAfter).not_null())
                    .col(string_len(WalletTransaction::Reference, 255).not_null())
                    .col(
                        timestamp_with_time_zone(WalletTransaction::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_wallet_transaction_wallet")
                            .from(WalletTransaction::Table, WalletTransaction::WalletId)
                            .to(Wallet::Table, Wallet::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WalletTransaction::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Wallet::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Wallet {
    Table,
    Id,
    UserId,
    Balance,
    Currency,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum WalletTransaction {
    Table,
    Id,
    WalletId,
    Kind,
    Amount,
    BalanceAfter,
    Reference,
    CreatedAt,
}
