/// Current wall-clock time in Unix epoch milliseconds.
///
/// Expiry checks compare against this at evaluation time, never against the
/// time an event arrived.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
