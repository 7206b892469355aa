pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_users;
mod m20250101_000002_create_categories;
mod m20250101_000003_create_genres;
mod m20250101_000004_create_titles;
mod m20250101_000005_create_title_genres;
mod m20250101_000006_create_reviews;
mod m20250101_000007_create_comments;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_users::Migration),
            Box::new(m20250101_000002_create_categories::Migration),
            Box::new(m20250101_000003_create_genres::Migration),
            Box::new(m20250101_000004_create_titles::Migration),
            Box::new(m20250101_000005_create_title_genres::Migration),
            Box::new(m20250101_000006_create_reviews::Migration),
            Box::new(m20250101_000007_create_comments::Migration),
        ]
    }
}
