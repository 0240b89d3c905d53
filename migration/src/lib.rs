pub use sea_orm_migration::prelude::*;

mod m20250601_000001_initial_schema;
mod m20250605_000001_add_coverage_tables;
mod m20250612_000001_add_claims_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_initial_schema::Migration),
            Box::new(m20250605_000001_add_coverage_tables::Migration),
            Box::new(m20250612_000001_add_claims_tables::Migration),
        ]
    }
}
