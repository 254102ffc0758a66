//! Needs Postgres with the pgvector extension:
//! `APP__DATABASE__URL=postgres://... cargo test -p common_services -- --ignored`

use app_state::{DatabaseSettings, VectorIndexSettings};
use chrono::Utc;
use common_services::database::get_db_pool;
use common_services::vector_index::{FaceIndex, IndexError, PgFaceIndex};
use common_types::{BoundingBox, FacePayload, FaceRecord, FacialLandmarks, ObjectRef, face_record_id};

fn database_settings() -> Option<DatabaseSettings> {
    let url = std::env::var("APP__DATABASE__URL").ok()?;
    Some(DatabaseSettings {
        url,
        max_connections: 4,
        min_connections: 1,
        max_lifetime: 300,
        idle_timeout: 60,
        acquire_timeout: 10,
    })
}

fn index_settings(table: &str, dimension: usize) -> VectorIndexSettings {
    VectorIndexSettings {
        table: table.to_owned(),
        dimension,
        search_limit: 5,
        score_threshold: 0.5,
    }
}

fn record(bucket: &str, key: &str, face_index: u32, embedding: Vec<f32>) -> FaceRecord {
    FaceRecord {
        id: face_record_id(bucket, key, None, face_index),
        embedding,
        payload: FacePayload {
            bucket: bucket.to_owned(),
            object_key: key.to_owned(),
            source_url: Some("https://example.com".to_owned()),
            media_url: None,
            frame_index: None,
            bbox: BoundingBox::new(1, 2, 3, 4),
            confidence: 0.9,
            landmarks: FacialLandmarks::default(),
            face_index,
            processed_at: Utc::now(),
        },
    }
}

#[tokio::test]
#[ignore = "needs Postgres with pgvector"]
async fn upsert_search_and_delete_where() -> color_eyre::Result<()> {
    let Some(db) = database_settings() else {
        return Ok(());
    };
    let pool = get_db_pool(&db, true).await?;
    let bucket = format!("test-{}", common_services::utils::nice_id(8));
    let index = PgFaceIndex::new(pool, &index_settings("face_records_test", 3))?;

    index
        .upsert(&[
            record(&bucket, "a.jpg", 0, vec![1.0, 0.0, 0.0]),
            record(&bucket, "a.jpg", 1, vec![0.0, 1.0, 0.0]),
            record(&bucket, "b.jpg", 0, vec![0.9, 0.1, 0.0]),
        ])
        .await?;
    // Same ids again must overwrite.
    index
        .upsert(&[record(&bucket, "a.jpg", 0, vec![1.0, 0.0, 0.0])])
        .await?;

    let a = ObjectRef::new(&bucket, "a.jpg");
    assert_eq!(index.count_for(&a).await?, 2);

    let hits = index.search(&[1.0, 0.0, 0.0], 5, 0.5).await?;
    let own: Vec<_> = hits
        .iter()
        .filter(|h| h.record.payload.bucket == bucket)
        .collect();
    assert_eq!(own.len(), 2);
    assert!(own[0].score >= own[1].score);
    assert_eq!(own[0].record.payload.object_key, "a.jpg");

    let kept = vec![face_record_id(&bucket, "a.jpg", None, 0)];
    assert_eq!(index.prune(&a, &kept).await?, 1);
    assert_eq!(index.delete_where(&a).await?, 1);
    assert_eq!(index.count_for(&a).await?, 0);
    index.delete_where(&ObjectRef::new(&bucket, "b.jpg")).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "needs Postgres with pgvector"]
async fn existing_table_with_other_dimension_is_fatal() -> color_eyre::Result<()> {
    let Some(db) = database_settings() else {
        return Ok(());
    };
    let pool = get_db_pool(&db, true).await?;
    let three = PgFaceIndex::new(pool.clone(), &index_settings("face_records_dim_test", 3))?;
    three.count_for(&ObjectRef::new("x", "y")).await?;

    let five = PgFaceIndex::new(pool, &index_settings("face_records_dim_test", 5))?;
    let result = five.count_for(&ObjectRef::new("x", "y")).await;
    assert!(matches!(
        result,
        Err(IndexError::DimensionMismatch {
            expected: 5,
            actual: 3
        })
    ));
    Ok(())
}
