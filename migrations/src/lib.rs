pub use sea_orm_migration::prelude::*;

mod m20240101_000014_create_outbox_table;
mod m20260101_000001_create_bookings_table;
mod m20260101_000002_create_saga_instances_table;
mod m20260101_000003_create_dead_letters_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000014_create_outbox_table::Migration),
            Box::new(m20260101_000001_create_bookings_table::Migration),
            Box::new(m20260101_000002_create_saga_instances_table::Migration),
            Box::new(m20260101_000003_create_dead_letters_table::Migration),
        ]
    }
}
