use uuid::Uuid;

/// Deterministic identifier of a face record.
///
/// Stability contract, reproducible in any language:
///
/// 1. Build the byte string `bucket 0x00 object_key 0x00 frame 0x00 face`, where
///    `bucket` and `object_key` are UTF-8, `frame` is the frame index (0 for still
///    images) and `face` the face index, both as base-10 ASCII without padding.
/// 2. Hash it with BLAKE3 and keep the first 16 bytes of the digest.
/// 3. Set the UUID version nibble to 8 and the variant bits to `10` (RFC 9562
///    custom UUID), and render the result as a hyphenated lower-case UUID.
///
/// Changing any step invalidates every stored identifier.
#[must_use]
pub fn face_record_id(
    bucket: &str,
    object_key: &str,
    frame_index: Option<u64>,
    face_index: u32,
) -> Uuid {
    let frame = frame_index.unwrap_or(0).to_string();
    let face = face_index.to_string();

    let mut hasher = blake3::Hasher::new();
    hasher.update(bucket.as_bytes());
    hasher.update(&[0]);
    hasher.update(object_key.as_bytes());
    hasher.update(&[0]);
    hasher.update(frame.as_bytes());
    hasher.update(&[0]);
    hasher.update(face.as_bytes());

    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Uuid::new_v8(bytes)
}
