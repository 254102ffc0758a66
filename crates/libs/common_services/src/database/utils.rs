use app_state::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

/// Connects to Postgres and optionally runs the job queue migrations.
///
/// # Errors
///
/// * `PgPool::connect` can return an error if the database connection fails.
/// * `sqlx::migrate` can return an error if migrations fail.
pub async fn get_db_pool(
    settings: &DatabaseSettings,
    migrate: bool,
) -> color_eyre::Result<Pool<Postgres>> {
    info!("Connecting to database.");
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .max_lifetime(Duration::from_secs(settings.max_lifetime))
        .idle_timeout(Duration::from_secs(settings.idle_timeout))
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .test_before_acquire(true)
        .connect(&settings.url)
        .await?;

    if migrate {
        info!("Running migrations.");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }
    Ok(pool)
}
