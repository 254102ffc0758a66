pub mod lookup;
pub mod root;

use crate::api_state::ApiContext;
use crate::lookup::router::lookup_public_router;
use crate::root::router::root_public_router;
use axum::Router;
use axum::extract::DefaultBodyLimit;

// --- Router Construction ---
pub fn create_router(api_state: ApiContext) -> Router {
    let max_upload_bytes = api_state.settings.api.max_upload_bytes;
    Router::new()
        .merge(root_public_router())
        .merge(lookup_public_router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(api_state)
}
