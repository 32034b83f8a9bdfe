use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TYPE device_auth.device_flow_status AS ENUM ('pending', 'approved', 'consumed', 'expired')",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared("ALTER TYPE device_auth.device_flow_status OWNER TO device_auth")
            .await?;

        // Rows are never deleted here; terminal flows stay so their codes keep colliding.
        // access_token is set only between approval and consumption, and may be
        // AES-256-GCM ciphertext written by domain::encryption.
        let create_table_sql = r#"
            CREATE TABLE IF NOT EXISTS device_auth.device_flows (
                id UUID PRIMARY KEY,

                device_code_hash VARCHAR(64) NOT NULL,
                user_code VARCHAR(9) NOT NULL,
                status device_auth.device_flow_status NOT NULL DEFAULT 'pending',

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL,
                interval_seconds INTEGER NOT NULL DEFAULT 5,
                last_polled_at TIMESTAMPTZ,

                approved_at TIMESTAMPTZ,
                approved_by_external_id TEXT,
                consumed_at TIMESTAMPTZ,

                access_token TEXT,
                access_token_expires_at BIGINT
            )
        "#;

        manager
            .get_connection()
            .execute_unprepared(create_table_sql)
            .await?;

        manager
            .get_connection()
            .execute_unprepared("ALTER TABLE device_auth.device_flows OWNER TO device_auth")
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_device_flows_device_code_hash
                 ON device_auth.device_flows(device_code_hash)",
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_device_flows_user_code
                 ON device_auth.device_flows(user_code)",
            )
            .await?;

        // Serves the lapsed-flow sweep
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_device_flows_status_expires_at
                 ON device_auth.device_flows(status, expires_at)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS device_auth.device_flows")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("DROP TYPE IF EXISTS device_auth.device_flow_status")
            .await?;

        Ok(())
    }
}
