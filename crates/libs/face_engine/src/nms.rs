use crate::DetectedFace;

/// Greedy non-maximum suppression; output is sorted by descending confidence.
pub fn non_max_suppression(mut faces: Vec<DetectedFace>, iou_threshold: f32) -> Vec<DetectedFace> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<DetectedFace> = Vec::with_capacity(faces.len());
    for face in faces {
        if kept.iter().all(|k| k.bbox.iou(&face.bbox) <= iou_threshold) {
            kept.push(face);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FaceBox;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> DetectedFace {
        DetectedFace {
            bbox: FaceBox { x1, y1, x2, y2 },
            landmarks: [[0.0; 2]; 5],
            confidence,
        }
    }

    #[test]
    fn suppresses_overlapping_lower_scores() {
        let faces = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.8),
            face(1.0, 1.0, 11.0, 11.0, 0.95),
            face(50.0, 50.0, 60.0, 60.0, 0.9),
        ];
        let kept = non_max_suppression(faces, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.95).abs() < f32::EPSILON);
        assert!((kept[1].confidence - 0.9).abs() < f32::EPSILON);
    }
}
