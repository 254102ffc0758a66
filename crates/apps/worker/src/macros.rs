// simple exponential backoff: 2^attempt * 10 seconds
#[must_use]
pub fn backoff_seconds(attempts: i32) -> i64 {
    #[allow(clippy::cast_sign_loss)]
    let exponent = attempts.clamp(0, 16) as u32;
    let secs = 10 * 2_i64.pow(exponent);
    secs.min(3600) // cap at 1h
}
