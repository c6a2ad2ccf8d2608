use crate::models::submission::{self, NewSubmission};
use migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

/// Fresh in-memory ledger with the full schema applied.
///
/// Pinned to one connection: every SQLite `:memory:` connection is its own database.
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Ledger entry inserted without an attempt limit, for arranging test state.
pub async fn seed_submission(db: &DatabaseConnection, new: NewSubmission<'_>) -> submission::Model {
    submission::Model::create_within_limit(db, new, i32::MAX)
        .await
        .expect("Failed to insert submission")
        .expect("Unlimited insert was refused")
}
