use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::wallet_transaction::TransactionKind;
use crate::entities::{wallet, wallet_transaction};
use crate::error::{AppError, AppResult};
use crate::services::fare::round_money;

pub struct WalletService<'a> {
    db: &'a DatabaseConnection,
    currency: &'a str,
}

impl<'a> WalletService<'a> {
    pub fn new(db: &'a DatabaseConnection, currency: &'a str) -> Self {
        Self { db, currency }
    }

    pub async fn get_or_create_wallet(&self, user_id: Uuid) -> AppResult<wallet::Model> {
        get_or_create_in(self.db, user_id, self.currency).await
    }

    /// Add funds. Balance and ledger row commit together.
    pub async fn credit(
        &self,
        user_id: Uuid,
        amount: f64,
        reference: &str,
    ) -> AppResult<(wallet::Model, wallet_transaction::Model)> {
        let txn = self.db.begin().await?;
        let entry = apply_in(&txn, user_id, self.currency, TransactionKind::Credit, amount, reference).await?;
        txn.commit().await?;

        tracing::info!(%user_id, amount = entry.1.amount, balance = entry.0.balance, "Wallet credited");
        Ok(entry)
    }

    /// Remove funds; fails without side effects when the balance is short.
    pub async fn debit(
        &self,
        user_id: Uuid,
        amount: f64,
        reference: &str,
    ) -> AppResult<(wallet::Model, wallet_transaction::Model)> {
        let txn = self.db.begin().await?;
        let entry = apply_in(&txn, user_id, self.currency, TransactionKind::Debit, amount, reference).await?;
        txn.commit().await?;

        tracing::info!(%user_id, amount = entry.1.amount, balance = entry.0.balance, "Wallet debited");
        Ok(entry)
    }

    /// Newest first.
    pub async fn history(&self, user_id: Uuid) -> AppResult<Vec<wallet_transaction::Model>> {
        let wallet = self.get_or_create_wallet(user_id).await?;

        Ok(wallet_transaction::Entity::find()
            .filter(wallet_transaction::Column::WalletId.eq(wallet.id))
            .order_by_desc(wallet_transaction::Column::CreatedAt)
            .all(self.db)
            .await?)
    }
}

pub(crate) async fn get_or_create_in<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    currency: &str,
) -> AppResult<wallet::Model> {
    if let Some(existing) = find_by_user(conn, user_id).await? {
        return Ok(existing);
    }

    let created = wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(0.0),
        currency: Set(currency.to_string()),
        updated_at: Set(Utc::now().fixed_offset()),
    }
    .insert(conn)
    .await;

    match created {
        Ok(wallet) => Ok(wallet),
        // Someone else created it first
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            find_by_user(conn, user_id)
                .await?
                .ok_or_else(|| AppError::Internal("Wallet vanished after creation".to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Change a balance and append the ledger row on `conn`. The caller owns the transaction.
pub(crate) async fn apply_in<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    currency: &str,
    kind: TransactionKind,
    amount: f64,
    reference: &str,
) -> AppResult<(wallet::Model, wallet_transaction::Model)> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation(
            "Amount must be a positive number".to_string(),
        ));
    }
    let amount = round_money(amount);
    if amount == 0.0 {
        return Err(AppError::Validation(
            "Amount is smaller than the currency unit".to_string(),
        ));
    }

    let wallet = get_or_create_in(conn, user_id, currency).await?;

    let mut update = wallet::Entity::update_many()
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(wallet::Column::Id.eq(wallet.id));

    update = match kind {
        TransactionKind::Credit => {
            update.col_expr(wallet::Column::Balance, Expr::col(wallet::Column::Balance).add(amount))
        }
        TransactionKind::Debit => update
            .col_expr(wallet::Column::Balance, Expr::col(wallet::Column::Balance).sub(amount))
            .filter(wallet::Column::Balance.gte(amount)),
    };

    if update.exec(conn).await?.rows_affected == 0 {
        return Err(AppError::Validation("Insufficient wallet balance".to_string()));
    }

    let wallet = wallet::Entity::find_by_id(wallet.id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Wallet not found".to_string()))?;

    let entry = wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        wallet_id: Set(wallet.id),
        kind: Set(kind),
        amount: Set(amount),
        balance_after: Set(wallet.balance),
        reference: Set(reference.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(conn)
    .await?;

    Ok((wallet, entry))
}

async fn find_by_user<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Option<wallet::Model>> {
    Ok(wallet::Entity::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}
