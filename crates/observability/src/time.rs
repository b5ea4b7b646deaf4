/// `"1h 2m 3s 4ms"`-style rendering of a millisecond duration.
///
/// Zero-valued hour/minute/second parts are omitted; the millisecond part
/// is shown when non-zero or when nothing else would be.
pub fn readable_duration(ms: f64) -> String {
    let ms = if ms.is_finite() && ms > 0.0 { ms } else { 0.0 };

    let total_secs = (ms / 1000.0).floor() as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = ms % 1000.0;

    let mut parts = Vec::with_capacity(4);
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    if millis > 0.0 || parts.is_empty() {
        parts.push(format!("{millis:.0}ms"));
    }
    parts.join(" ")
}
