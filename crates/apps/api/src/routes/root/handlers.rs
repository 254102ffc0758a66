use axum::extract::State;
use axum::http::StatusCode;
use sqlx::PgPool;
use tracing::error;

pub async fn root() -> &'static str {
    "Face lookup service"
}

/// Healthy when the database answers.
pub async fn health_check(State(pool): State<PgPool>) -> Result<&'static str, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&pool).await {
        Ok(_) => Ok("OK"),
        Err(e) => {
            error!("Health check failed: database connection error: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
