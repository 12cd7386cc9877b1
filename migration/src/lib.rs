pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_catalogue;
mod m20250102_000001_create_watchlist;
mod m20250103_000001_add_catalogue_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_catalogue::Migration),
            Box::new(m20250102_000001_create_watchlist::Migration),
            Box::new(m20250103_000001_add_catalogue_indexes::Migration),
        ]
    }
}
