use app_state::AppSettings;
use axum::extract::FromRef;
use common_services::object_store::ObjectStore;
use common_services::vector_index::FaceIndex;
use face_engine::FaceEngine;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiContext {
    pub pool: PgPool,
    pub settings: AppSettings,
    pub engine: Arc<FaceEngine>,
    pub index: Arc<dyn FaceIndex>,
    pub store: Arc<dyn ObjectStore>,
}

impl FromRef<ApiContext> for PgPool {
    fn from_ref(state: &ApiContext) -> Self {
        state.pool.clone()
    }
}

impl FromRef<ApiContext> for AppSettings {
    fn from_ref(state: &ApiContext) -> Self {
        state.settings.clone()
    }
}
