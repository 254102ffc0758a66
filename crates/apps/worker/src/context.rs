use app_state::AppSettings;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use common_services::object_store::{ObjectStore, S3ObjectStore};
use common_services::startup::retry_startup;
use common_services::vector_index::{FaceIndex, PgFaceIndex, ensure_ready};
use face_engine::FaceEngine;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use transcription::{SpeechToText, TranscriptStore, WhisperTranscriber};

/// Everything a job handler needs, built once per worker process.
pub struct WorkerContext {
    pub worker_id: String,
    pub pool: PgPool,
    pub settings: AppSettings,
    pub store: Arc<dyn ObjectStore>,
    pub index: Arc<dyn FaceIndex>,
    pub engine: Arc<FaceEngine>,
    pub transcripts: TranscriptStore,
    speech: OnceCell<Arc<dyn SpeechToText>>,
}

impl WorkerContext {
    /// Creates a new instance of `WorkerContext`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the face models cannot be loaded or
    /// the object store stays unreachable.
    pub async fn new(pool: PgPool, settings: AppSettings, worker_id: String) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&settings.object_store));
        if settings.object_store.create_bucket {
            let bucket = settings.object_store.bucket.clone();
            retry_startup(&settings.startup, "object store", || store.ensure_bucket(&bucket))
                .await?;
        }

        let index: Arc<dyn FaceIndex> =
            Arc::new(PgFaceIndex::new(pool.clone(), &settings.vector_index)?);

        let face_settings = settings.faces.clone();
        let dimension = settings.vector_index.dimension;
        let engine = tokio::task::spawn_blocking(move || {
            FaceEngine::from_settings(&face_settings, dimension)
        })
        .await?
        .wrap_err("Failed to load face models")?;

        let transcripts = TranscriptStore::new(&settings.transcription.output_dir);
        Self::from_parts(worker_id, pool, settings, store, index, Arc::new(engine), transcripts).await
    }

    /// Assembles a context from already built parts, checking that the index
    /// accepts the engine's embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be prepared or was created for a
    /// different embedding dimension.
    pub async fn from_parts(
        worker_id: String,
        pool: PgPool,
        settings: AppSettings,
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn FaceIndex>,
        engine: Arc<FaceEngine>,
        transcripts: TranscriptStore,
    ) -> Result<Self> {
        ensure_ready(index.as_ref(), engine.dimension(), &settings.startup).await?;

        Ok(Self {
            worker_id,
            pool,
            settings,
            store,
            index,
            engine,
            transcripts,
            speech: OnceCell::new(),
        })
    }

    /// The speech model, loaded on first use. Concurrent callers wait for one load.
    pub async fn speech(&self) -> Result<Arc<dyn SpeechToText>> {
        let speech = self
            .speech
            .get_or_try_init(|| async {
                let settings = self.settings.transcription.clone();
                info!("Loading transcription model for worker {}", self.worker_id);
                let model = tokio::task::spawn_blocking(move || {
                    WhisperTranscriber::new(&settings.model, &settings.language, settings.threads)
                })
                .await??;
                Ok::<Arc<dyn SpeechToText>, color_eyre::Report>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(speech))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::engine_with;
    use app_state::load_app_settings_from;
    use common_services::object_store::InMemoryObjectStore;
    use common_services::vector_index::{InMemoryFaceIndex, is_fatal_index_error};
    use sqlx::postgres::PgPoolOptions;
    use std::path::Path;

    async fn context_with_index(index: InMemoryFaceIndex) -> Result<WorkerContext> {
        let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../config/settings.yaml");
        let settings = load_app_settings_from(&config)?;
        let pool = PgPoolOptions::new().connect_lazy(&settings.database.url)?;
        let transcripts = TranscriptStore::new(&settings.transcription.output_dir);
        WorkerContext::from_parts(
            "test".to_owned(),
            pool,
            settings,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(index),
            engine_with(Vec::new()),
            transcripts,
        )
        .await
    }

    #[tokio::test]
    async fn index_with_other_dimension_fails_startup() {
        let result = context_with_index(InMemoryFaceIndex::new(128)).await;

        assert!(result.is_err_and(|e| is_fatal_index_error(&e)));
    }

    #[tokio::test]
    async fn index_matching_the_engine_builds() -> Result<()> {
        let context = context_with_index(InMemoryFaceIndex::new(4)).await?;
        assert_eq!(context.index.dimension(), context.engine.dimension());
        Ok(())
    }
}
