use crate::api_state::ApiContext;
use crate::create_router;
use app_state::AppSettings;
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use common_services::object_store::{ObjectStore, S3ObjectStore};
use common_services::startup::retry_startup;
use common_services::vector_index::{FaceIndex, PgFaceIndex, ensure_ready};
use face_engine::FaceEngine;
use http::{HeaderValue, header};
use listener::listener::start_listening;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Loads the face models and connects the object store and face index.
///
/// # Errors
///
/// Fails when a dependency stays unreachable or the index holds embeddings of
/// another dimension than the models produce.
pub async fn build_context(pool: PgPool, settings: AppSettings) -> Result<ApiContext> {
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&settings.object_store));
    if settings.object_store.create_bucket {
        let bucket = settings.object_store.bucket.clone();
        retry_startup(&settings.startup, "object store", || store.ensure_bucket(&bucket)).await?;
    }

    let index: Arc<dyn FaceIndex> =
        Arc::new(PgFaceIndex::new(pool.clone(), &settings.vector_index)?);

    let face_settings = settings.faces.clone();
    let dimension = settings.vector_index.dimension;
    let engine =
        tokio::task::spawn_blocking(move || FaceEngine::from_settings(&face_settings, dimension))
            .await?
            .wrap_err("Failed to load face models")?;

    assemble_context(pool, settings, Arc::new(engine), index, store).await
}

async fn assemble_context(
    pool: PgPool,
    settings: AppSettings,
    engine: Arc<FaceEngine>,
    index: Arc<dyn FaceIndex>,
    store: Arc<dyn ObjectStore>,
) -> Result<ApiContext> {
    ensure_ready(index.as_ref(), engine.dimension(), &settings.startup).await?;
    Ok(ApiContext {
        pool,
        settings,
        engine,
        index,
        store,
    })
}

pub async fn serve(pool: PgPool, settings: AppSettings) -> Result<()> {
    info!("🚀 Initializing server...");
    let api_state = build_context(pool.clone(), settings.clone()).await?;

    if settings.listener.embedded {
        info!("Starting embedded bucket listener");
        tokio::spawn(start_listening(pool, settings.clone()));
    }

    // --- CORS Configuration ---
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]);
    let cors = if settings.api.allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(cors::Any)
    } else {
        let allowed_origins: Vec<HeaderValue> = settings
            .api
            .allowed_origins
            .iter()
            .filter_map(|s| match s.parse() {
                Ok(hv) => Some(hv),
                Err(e) => {
                    error!("Invalid CORS origin configured: {} - Error: {}", s, e);
                    None
                }
            })
            .collect();
        cors.allow_origin(allowed_origins)
    };

    let app = create_router(api_state)
        .layer(TraceLayer::new_for_http().on_request(()))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.port)
        .parse()
        .map_err(|e| eyre!("Invalid address: {}", e))?;
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;

    info!("🐸 Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
