use crate::api_state::ApiContext;
use axum::Json;
use axum::extract::{Multipart, State};
use common_services::api::lookup::error::LookupError;
use common_services::api::lookup::interfaces::LookupResponse;
use common_services::api::lookup::service::{LookupLimits, lookup_faces};
use tracing::instrument;

/// Finds indexed faces that resemble the faces in an uploaded image.
///
/// Expects a multipart body with the image in the `file` field.
///
/// # Errors
///
/// Returns a `LookupError` if no file was sent, it is not an image, or the index
/// cannot be searched.
#[instrument(skip(context, multipart), err(Debug))]
pub async fn lookup_face(
    State(context): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<LookupResponse>, LookupError> {
    let image_bytes = read_file_field(&mut multipart).await?;
    let response = lookup_faces(
        &context.engine,
        context.index.as_ref(),
        context.store.as_ref(),
        image_bytes,
        LookupLimits {
            limit: context.settings.vector_index.search_limit,
            score_threshold: context.settings.vector_index.score_threshold,
        },
    )
    .await?;
    Ok(Json(response))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, LookupError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(field.bytes().await?.to_vec());
        }
    }
    Err(LookupError::MissingFile)
}
