use crate::vector_index::{FaceIndex, IndexError, check_dimension, cosine_similarity};
use async_trait::async_trait;
use common_types::{FaceRecord, ObjectRef, ScoredFace};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Exact-search index kept in memory. Counts upsert calls so tests can assert on them.
#[derive(Debug)]
pub struct InMemoryFaceIndex {
    dimension: usize,
    records: RwLock<BTreeMap<Uuid, FaceRecord>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryFaceIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(BTreeMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.records.read().await.keys().copied().collect()
    }

    pub async fn get(&self, id: &Uuid) -> Option<FaceRecord> {
        self.records.read().await.get(id).cloned()
    }
}

fn is_owned_by(record: &FaceRecord, owner: &ObjectRef) -> bool {
    record.payload.bucket == owner.bucket && record.payload.object_key == owner.key
}

#[async_trait]
impl FaceIndex for InMemoryFaceIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<(), IndexError> {
        Ok(())
    }

    async fn upsert(&self, records: &[FaceRecord]) -> Result<usize, IndexError> {
        for record in records {
            check_dimension(self.dimension, record.embedding.len())?;
        }
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id, record.clone());
        }
        Ok(records.len())
    }

    async fn delete_where(&self, owner: &ObjectRef) -> Result<u64, IndexError> {
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|_, r| !is_owned_by(r, owner));
        Ok((before - stored.len()) as u64)
    }

    async fn prune(&self, owner: &ObjectRef, keep: &[Uuid]) -> Result<u64, IndexError> {
        let keep: HashSet<&Uuid> = keep.iter().collect();
        let mut stored = self.records.write().await;
        let before = stored.len();
        stored.retain(|id, r| !is_owned_by(r, owner) || keep.contains(id));
        Ok((before - stored.len()) as u64)
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredFace>, IndexError> {
        check_dimension(self.dimension, query.len())?;
        let stored = self.records.read().await;
        let mut hits: Vec<ScoredFace> = stored
            .values()
            .map(|record| ScoredFace {
                score: cosine_similarity(query, &record.embedding),
                record: record.clone(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count_for(&self, owner: &ObjectRef) -> Result<u64, IndexError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| is_owned_by(r, owner))
            .count() as u64)
    }
}
