use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // A driver holds at most one active request
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_ride_request_active_driver \
             ON ride_request (assigned_driver_id) \
             WHERE status IN ('assigned', 'in_progress')",
        )
        .await?;

        // A ride is paid at most once
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_payment_succeeded_ride \
             ON payment (ride_id) \
             WHERE status = 'succeeded'",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP INDEX IF EXISTS uq_payment_succeeded_ride")
            .await?;
        db.execute_unprepared("DROP INDEX IF EXISTS uq_ride_request_active_driver")
            .await?;
        Ok(())
    }
}
