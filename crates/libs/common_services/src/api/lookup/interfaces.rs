use common_types::{BoundingBox, FacePayload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One indexed face similar to a query face.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LookupMatch {
    pub id: Uuid,
    pub score: f32,
    #[serde(flatten)]
    pub payload: FacePayload,
    /// `data:` URI of the stored media; `null` when it could not be fetched.
    pub image_data_uri: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LookupResponse {
    /// One group per query face, in `face_locations` order, best match first.
    pub matches: Vec<Vec<LookupMatch>>,
    pub faces_found: usize,
    pub face_locations: Vec<BoundingBox>,
}
