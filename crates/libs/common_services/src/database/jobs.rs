use common_types::{EventKind, ObjectRef};
use serde_json::Value;
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, FromRow)]
#[allow(clippy::struct_field_names)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub bucket: String,
    pub object_key: String,
    pub event_kind: EventKind,
    pub payload: Option<Value>,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
}

impl Job {
    #[must_use]
    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(&self.bucket, &self.object_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
pub enum JobType {
    /// A bucket notification, routed by media type.
    MediaEvent,
    Transcribe,
}

impl JobType {
    /// Lower runs first. Removals jump the queue so cleanup is not starved by ingest.
    #[must_use]
    pub const fn get_priority(&self, event_kind: EventKind, is_video: bool) -> i32 {
        match (self, event_kind) {
            (Self::MediaEvent, EventKind::Removed) => 0,
            (Self::MediaEvent, EventKind::Created) => {
                if is_video {
                    60
                } else {
                    50
                }
            }
            (Self::Transcribe, _) => 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Failed,
    Done,
    Cancelled,
}
