use crate::ObjectRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pixel rectangle of a detected face, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// A box is usable when its corners are ordered (`x1 <= x2`, `y1 <= y2`).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2
    }

    #[must_use]
    pub const fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    #[must_use]
    pub const fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Restricts the box to an image of the given size.
    #[must_use]
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);
        Self {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        }
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Five facial keypoints as `[x, y]` pixel pairs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FacialLandmarks {
    pub left_eye: [f32; 2],
    pub right_eye: [f32; 2],
    pub nose: [f32; 2],
    pub mouth_left: [f32; 2],
    pub mouth_right: [f32; 2],
}

impl FacialLandmarks {
    /// Builds landmarks from points in detector order: left eye, right eye, nose,
    /// left mouth corner, right mouth corner.
    #[must_use]
    pub const fn from_points(points: [[f32; 2]; 5]) -> Self {
        Self {
            left_eye: points[0],
            right_eye: points[1],
            nose: points[2],
            mouth_left: points[3],
            mouth_right: points[4],
        }
    }

    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        let s = |p: [f32; 2]| [p[0] * factor, p[1] * factor];
        Self {
            left_eye: s(self.left_eye),
            right_eye: s(self.right_eye),
            nose: s(self.nose),
            mouth_left: s(self.mouth_left),
            mouth_right: s(self.mouth_right),
        }
    }
}

/// Metadata stored next to each embedding in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePayload {
    pub bucket: String,
    pub object_key: String,
    pub source_url: Option<String>,
    pub media_url: Option<String>,
    /// Present only for faces sampled from a video.
    pub frame_index: Option<u64>,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub landmarks: FacialLandmarks,
    pub face_index: u32,
    pub processed_at: DateTime<Utc>,
}

impl FacePayload {
    #[must_use]
    pub fn owner(&self) -> ObjectRef {
        ObjectRef::new(&self.bucket, &self.object_key)
    }
}

/// One indexed face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub payload: FacePayload,
}

/// A face record together with its cosine similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFace {
    pub record: FaceRecord,
    pub score: f32,
}
