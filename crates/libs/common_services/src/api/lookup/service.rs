use crate::alert;
use crate::api::lookup::error::LookupError;
use crate::api::lookup::interfaces::{LookupMatch, LookupResponse};
use crate::object_store::ObjectStore;
use crate::vector_index::FaceIndex;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common_types::ObjectRef;
use face_engine::FaceEngine;
use media_sampler::extract_frame_jpeg;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How many matches each query face gets and how similar they must be.
#[derive(Debug, Clone, Copy)]
pub struct LookupLimits {
    pub limit: usize,
    pub score_threshold: f32,
}

impl Default for LookupLimits {
    fn default() -> Self {
        Self {
            limit: 5,
            score_threshold: 0.5,
        }
    }
}

/// What a match's `data:` URI shows.
#[derive(Debug, PartialEq, Eq)]
enum Preview {
    /// The stored object itself, with this content type.
    Image(String),
    /// The matched frame of a video, as JPEG.
    VideoFrame,
}

fn preview_kind(key: &str) -> Option<Preview> {
    match mime_guess::from_path(key).first() {
        Some(mime) if mime.type_() == mime_guess::mime::IMAGE => {
            Some(Preview::Image(mime.essence_str().to_owned()))
        }
        Some(mime) if mime.type_() == mime_guess::mime::VIDEO => Some(Preview::VideoFrame),
        Some(_) => None,
        None => Some(Preview::Image("image/jpeg".to_owned())),
    }
}

async fn video_frame_jpeg(
    store: &dyn ObjectStore,
    object: &ObjectRef,
    frame_index: u64,
) -> color_eyre::Result<Vec<u8>> {
    let workdir = tempfile::tempdir()?;
    let extension = object.extension().unwrap_or_else(|| "bin".to_owned());
    let path = workdir.path().join(format!("source.{extension}"));
    store.download_to(object, &path).await?;
    extract_frame_jpeg(&path, frame_index).await
}

async fn image_data_uri(
    store: &dyn ObjectStore,
    object: &ObjectRef,
    frame_index: Option<u64>,
) -> Option<String> {
    let (mime, bytes) = match preview_kind(&object.key)? {
        Preview::Image(mime) => (mime, store.get(object).await.map_err(color_eyre::Report::from)),
        Preview::VideoFrame => {
            let frame = frame_index.unwrap_or(0);
            ("image/jpeg".to_owned(), video_frame_jpeg(store, object, frame).await)
        }
    };
    match bytes {
        Ok(bytes) => Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes))),
        Err(e) => {
            alert!("Matched face has no retrievable image {} (frame {:?}): {}", object, frame_index, e);
            None
        }
    }
}

/// Finds indexed faces similar to every face in the uploaded image.
///
/// # Errors
///
/// * [`LookupError::InvalidImage`] if the bytes do not decode as an image.
/// * [`LookupError::Index`] if the vector search fails.
pub async fn lookup_faces(
    engine: &Arc<FaceEngine>,
    index: &dyn FaceIndex,
    store: &dyn ObjectStore,
    image_bytes: Vec<u8>,
    limits: LookupLimits,
) -> Result<LookupResponse, LookupError> {
    let query_engine = Arc::clone(engine);
    let faces = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&image_bytes)
            .map(|img| query_engine.analyze(&img.to_rgb8(), false))
            .map_err(|e| LookupError::InvalidImage(e.to_string()))
    })
    .await??;

    if faces.is_empty() {
        info!("Lookup query contained no faces");
        return Ok(LookupResponse::default());
    }

    let mut images: HashMap<(ObjectRef, Option<u64>), Option<String>> = HashMap::new();
    let mut groups = Vec::with_capacity(faces.len());
    for face in &faces {
        let hits = index
            .search(&face.embedding, limits.limit, limits.score_threshold)
            .await?;
        debug!("Query face {} matched {} record(s)", face.face_index, hits.len());

        let mut group = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().filter(|h| h.score >= limits.score_threshold) {
            let source = (hit.record.payload.owner(), hit.record.payload.frame_index);
            let uri = match images.get(&source) {
                Some(uri) => uri.clone(),
                None => {
                    let uri = image_data_uri(store, &source.0, source.1).await;
                    images.insert(source, uri.clone());
                    uri
                }
            };
            group.push(LookupMatch {
                id: hit.record.id,
                score: hit.score,
                payload: hit.record.payload,
                image_data_uri: uri,
            });
        }
        group.sort_by(|a, b| b.score.total_cmp(&a.score));
        groups.push(group);
    }

    info!(
        "Lookup found {} face(s), {} match(es)",
        faces.len(),
        groups.iter().map(Vec::len).sum::<usize>()
    );

    Ok(LookupResponse {
        matches: groups,
        faces_found: faces.len(),
        face_locations: faces.iter().map(|f| f.bbox).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::tests::{detected, test_engine};
    use crate::indexing::{FaceContext, NoFence, detect_and_embed};
    use crate::object_store::InMemoryObjectStore;
    use crate::vector_index::InMemoryFaceIndex;
    use common_types::ObjectMetadata;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> color_eyre::Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height).write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    async fn seeded_index(
        store: &InMemoryObjectStore,
        keys: &[(&str, bool)],
    ) -> color_eyre::Result<InMemoryFaceIndex> {
        let index = InMemoryFaceIndex::new(4);
        // Index each object with the faces the query will contain, so scores are 1.0.
        let engine = test_engine(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(30.0, 2.0, 40.0, 12.0),
        ]);
        for (key, stored) in keys {
            let object = ObjectRef::new("scraped", *key);
            if *stored {
                store
                    .insert(&object, vec![0xff, 0xd8], ObjectMetadata::default())
                    .await;
            }
            detect_and_embed(
                &engine,
                &index,
                &NoFence,
                RgbImage::new(64, 64),
                &FaceContext::new(object, ObjectMetadata::default()),
            )
            .await?;
        }
        Ok(index)
    }

    #[tokio::test]
    async fn one_sorted_group_per_query_face() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = seeded_index(&store, &[("a.jpg", true), ("b.png", true)]).await?;
        let engine = test_engine(vec![
            detected(1.0, 1.0, 10.0, 10.0),
            detected(30.0, 2.0, 40.0, 12.0),
        ]);

        let response = lookup_faces(
            &engine,
            &index,
            &store,
            png_bytes(64, 64)?,
            LookupLimits::default(),
        )
        .await?;

        assert_eq!(response.faces_found, 2);
        assert_eq!(response.matches.len(), 2);
        assert_eq!(response.face_locations.len(), 2);
        for group in &response.matches {
            assert!(!group.is_empty());
            assert!(group.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(group.iter().all(|m| m.score >= 0.5));
        }
        // The best match of each query face is the same face in a stored image.
        assert_eq!(response.matches[0][0].payload.face_index, 0);
        assert_eq!(response.matches[1][0].payload.face_index, 1);
        Ok(())
    }

    #[tokio::test]
    async fn threshold_excludes_weak_matches() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = seeded_index(&store, &[("a.jpg", true)]).await?;
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);

        let strict = LookupLimits {
            limit: 5,
            score_threshold: 0.999,
        };
        let response = lookup_faces(&engine, &index, &store, png_bytes(64, 64)?, strict).await?;

        assert_eq!(response.matches.len(), 1);
        let group = &response.matches[0];
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].payload.face_index, 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_image_keeps_match_with_null_uri() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = seeded_index(&store, &[("gone.jpg", false)]).await?;
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);

        let response = lookup_faces(
            &engine,
            &index,
            &store,
            png_bytes(64, 64)?,
            LookupLimits::default(),
        )
        .await?;

        let best = &response.matches[0][0];
        assert_eq!(best.payload.object_key, "gone.jpg");
        assert_eq!(best.image_data_uri, None);
        let json = serde_json::to_value(best)?;
        assert!(json.get("image_data_uri").is_some_and(serde_json::Value::is_null));
        Ok(())
    }

    #[tokio::test]
    async fn stored_image_is_inlined() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = seeded_index(&store, &[("here.jpg", true)]).await?;
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);

        let response = lookup_faces(
            &engine,
            &index,
            &store,
            png_bytes(64, 64)?,
            LookupLimits::default(),
        )
        .await?;

        assert_eq!(
            response.matches[0][0].image_data_uri.as_deref(),
            Some("data:image/jpeg;base64,/9g=")
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_faces_is_an_empty_result() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let response = lookup_faces(
            &test_engine(vec![]),
            &index,
            &store,
            png_bytes(8, 8)?,
            LookupLimits::default(),
        )
        .await?;
        assert_eq!(response, LookupResponse::default());
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_upload_is_rejected() {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let result = lookup_faces(
            &test_engine(vec![]),
            &index,
            &store,
            b"not an image".to_vec(),
            LookupLimits::default(),
        )
        .await;
        assert!(matches!(result, Err(LookupError::InvalidImage(_))));
    }

    #[test]
    fn videos_preview_their_matched_frame() {
        assert_eq!(preview_kind("a/b.mp4"), Some(Preview::VideoFrame));
        assert_eq!(preview_kind("a/b.webm"), Some(Preview::VideoFrame));
        assert_eq!(preview_kind("a/b.PNG"), Some(Preview::Image("image/png".to_owned())));
        assert_eq!(preview_kind("a/no_extension"), Some(Preview::Image("image/jpeg".to_owned())));
        assert_eq!(preview_kind("a/notes.txt"), None);
    }

    #[tokio::test]
    async fn undecodable_video_frame_gives_null_uri() -> color_eyre::Result<()> {
        let store = InMemoryObjectStore::new();
        let index = InMemoryFaceIndex::new(4);
        let clip = ObjectRef::new("scraped", "clip.mp4");
        store
            .insert(&clip, b"not a video".to_vec(), ObjectMetadata::default())
            .await;
        let engine = test_engine(vec![detected(1.0, 1.0, 10.0, 10.0)]);
        for frame in [0, 30] {
            detect_and_embed(
                &engine,
                &index,
                &NoFence,
                RgbImage::new(64, 64),
                &FaceContext::new(clip.clone(), ObjectMetadata::default()).with_frame(frame),
            )
            .await?;
        }

        let response = lookup_faces(
            &engine,
            &index,
            &store,
            png_bytes(64, 64)?,
            LookupLimits::default(),
        )
        .await?;

        let group = &response.matches[0];
        assert_eq!(group.len(), 2);
        let mut frames: Vec<_> = group.iter().map(|m| m.payload.frame_index).collect();
        frames.sort_unstable();
        assert_eq!(frames, vec![Some(0), Some(30)]);
        assert!(group.iter().all(|m| m.image_data_uri.is_none()));
        Ok(())
    }
}
