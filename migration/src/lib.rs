//! Database migrations for the revsync service.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000100_create_connections;
mod m2025_06_01_000200_create_locations;
mod m2025_06_01_000300_create_reviews;
mod m2025_06_01_000400_create_cached_ratings;
mod m2025_06_01_000500_create_venue_grants;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000100_create_connections::Migration),
            Box::new(m2025_06_01_000200_create_locations::Migration),
            Box::new(m2025_06_01_000300_create_reviews::Migration),
            Box::new(m2025_06_01_000400_create_cached_ratings::Migration),
            Box::new(m2025_06_01_000500_create_venue_grants::Migration),
        ]
    }
}
