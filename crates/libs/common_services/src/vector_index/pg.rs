use crate::vector_index::{FaceIndex, IndexError, check_dimension};
use app_state::VectorIndexSettings;
use async_trait::async_trait;
use common_types::{FacePayload, FaceRecord, ObjectRef, ScoredFace};
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

/// Face index stored in a pgvector table, created on first use.
pub struct PgFaceIndex {
    pool: PgPool,
    table: String,
    dimension: usize,
    ready: OnceCell<()>,
}

#[derive(FromRow)]
struct ScoredRow {
    id: Uuid,
    embedding: Vector,
    payload: Json<FacePayload>,
    score: f64,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 48
}

impl PgFaceIndex {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] if the table name is not a plain identifier.
    pub fn new(pool: PgPool, settings: &VectorIndexSettings) -> Result<Self, IndexError> {
        if !is_identifier(&settings.table) {
            return Err(IndexError::Config(format!(
                "vector_index.table must be a lower-case identifier, got {:?}",
                settings.table
            )));
        }
        Ok(Self {
            pool,
            table: settings.table.clone(),
            dimension: settings.dimension,
            ready: OnceCell::new(),
        })
    }

    async fn create_collection(&self) -> Result<(), IndexError> {
        let table = &self.table;
        let ddl = format!(
            r"
            SELECT pg_advisory_xact_lock(hashtext('{table}'));
            CREATE EXTENSION IF NOT EXISTS vector;
            CREATE TABLE IF NOT EXISTS {table}
            (
                id         UUID PRIMARY KEY,
                bucket     TEXT        NOT NULL,
                object_key TEXT        NOT NULL,
                embedding  vector({dim}) NOT NULL,
                payload    JSONB       NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS {table}_owner_idx ON {table} (bucket, object_key);
            CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} USING hnsw (embedding vector_cosine_ops);
            ",
            dim = self.dimension,
        );

        let mut tx = self.pool.begin().await?;
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&ddl)).await?;
        tx.commit().await?;

        let existing: Option<i32> = sqlx::query_scalar(
            r"
            SELECT atttypmod FROM pg_attribute
            WHERE attrelid = to_regclass($1) AND attname = 'embedding' AND NOT attisdropped
            ",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(existing) = existing.filter(|d| *d > 0) {
            check_dimension(self.dimension, existing as usize)?;
        }
        info!("Face index table {} ready (dimension {})", table, self.dimension);
        Ok(())
    }
}

#[async_trait]
impl FaceIndex for PgFaceIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<(), IndexError> {
        self.ready
            .get_or_try_init(|| self.create_collection())
            .await
            .map(|_| ())
    }

    async fn upsert(&self, records: &[FaceRecord]) -> Result<usize, IndexError> {
        for record in records {
            check_dimension(self.dimension, record.embedding.len())?;
        }
        if records.is_empty() {
            return Ok(0);
        }
        self.ensure_collection().await?;

        let statement = format!(
            r"
            INSERT INTO {} (id, bucket, object_key, embedding, payload, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (id) DO UPDATE SET
                bucket = EXCLUDED.bucket,
                object_key = EXCLUDED.object_key,
                embedding = EXCLUDED.embedding,
                payload = EXCLUDED.payload,
                updated_at = now()
            ",
            self.table
        );

        // One transaction so a batch lands all at once.
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&statement)
                .bind(record.id)
                .bind(&record.payload.bucket)
                .bind(&record.payload.object_key)
                .bind(Vector::from(record.embedding.clone()))
                .bind(Json(&record.payload))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Upserted {} face record(s) into {}", records.len(), self.table);
        Ok(records.len())
    }

    async fn delete_where(&self, owner: &ObjectRef) -> Result<u64, IndexError> {
        self.ensure_collection().await?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE bucket = $1 AND object_key = $2",
            self.table
        ))
        .bind(&owner.bucket)
        .bind(&owner.key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune(&self, owner: &ObjectRef, keep: &[Uuid]) -> Result<u64, IndexError> {
        self.ensure_collection().await?;
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE bucket = $1 AND object_key = $2 AND NOT (id = ANY($3))",
            self.table
        ))
        .bind(&owner.bucket)
        .bind(&owner.key)
        .bind(keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredFace>, IndexError> {
        check_dimension(self.dimension, query.len())?;
        self.ensure_collection().await?;

        let rows = sqlx::query_as::<_, ScoredRow>(&format!(
            r"
            SELECT id, embedding, payload, 1 - (embedding <=> $1::vector) AS score
            FROM {}
            WHERE 1 - (embedding <=> $1::vector) >= $2
            ORDER BY embedding <=> $1::vector
            LIMIT $3
            ",
            self.table
        ))
        .bind(Vector::from(query.to_vec()))
        .bind(f64::from(score_threshold))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredFace {
                score: row.score as f32,
                record: FaceRecord {
                    id: row.id,
                    embedding: row.embedding.to_vec(),
                    payload: row.payload.0,
                },
            })
            .collect())
    }

    async fn count_for(&self, owner: &ObjectRef) -> Result<u64, IndexError> {
        self.ensure_collection().await?;
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT count(*) FROM {} WHERE bucket = $1 AND object_key = $2",
            self.table
        ))
        .bind(&owner.bucket)
        .bind(&owner.key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
