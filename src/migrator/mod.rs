use sea_orm::ConnectionTrait;
use sea_orm_migration::{async_trait, prelude::*};

/// Each migration is a plain SQL file executed in one round trip; sea-orm tracks
/// applied names in `seaql_migrations`.
struct SqlMigration {
    name: &'static str,
    sql: &'static str,
}

impl MigrationName for SqlMigration {
    fn name(&self) -> &str {
        self.name
    }
}

#[async_trait::async_trait]
impl MigrationTrait for SqlMigration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(self.sql).await?;
        Ok(())
    }
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(SqlMigration {
                name: "m0001_users_and_catalog",
                sql: include_str!("../../migrations/0001_users_and_catalog.sql"),
            }),
            Box::new(SqlMigration {
                name: "m0002_cart_orders",
                sql: include_str!("../../migrations/0002_cart_orders.sql"),
            }),
            Box::new(SqlMigration {
                name: "m0003_engagement",
                sql: include_str!("../../migrations/0003_engagement.sql"),
            }),
            Box::new(SqlMigration {
                name: "m0004_promotions_content",
                sql: include_str!("../../migrations/0004_promotions_content.sql"),
            }),
        ]
    }
}
