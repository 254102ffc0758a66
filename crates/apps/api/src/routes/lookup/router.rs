use crate::api_state::ApiContext;
use crate::lookup::handlers::lookup_face;
use axum::{Router, routing::post};

pub fn lookup_public_router() -> Router<ApiContext> {
    Router::new().route("/lookup", post(lookup_face))
}
