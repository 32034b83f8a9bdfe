use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("CREATE SCHEMA IF NOT EXISTS device_auth;")
            .await?;

        manager
            .get_connection()
            .execute_unprepared("SET search_path TO device_auth, public;")
            .await?;

        // The service connects as device_auth and needs full rights inside its schema
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    GRANT ALL PRIVILEGES ON DATABASE device_auth TO device_auth;
                    GRANT ALL ON SCHEMA device_auth TO device_auth;

                    ALTER DEFAULT PRIVILEGES IN SCHEMA device_auth GRANT ALL ON TABLES TO device_auth;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA device_auth GRANT ALL ON SEQUENCES TO device_auth;
                END $$;
            "#)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(r#"
                DO $$ BEGIN
                    ALTER DEFAULT PRIVILEGES IN SCHEMA device_auth REVOKE ALL ON SEQUENCES FROM device_auth;
                    ALTER DEFAULT PRIVILEGES IN SCHEMA device_auth REVOKE ALL ON TABLES FROM device_auth;
                    REVOKE ALL ON SCHEMA device_auth FROM device_auth;
                    REVOKE ALL PRIVILEGES ON DATABASE device_auth FROM device_auth;
                END $$;
            "#)
            .await?;

        // CASCADE removes every object in the schema
        manager
            .get_connection()
            .execute_unprepared("DROP SCHEMA IF EXISTS device_auth CASCADE;")
            .await?;

        Ok(())
    }
}
