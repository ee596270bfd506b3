/// Rounds to `places` decimals.
///
/// Rounds the exact binary value, so `1.15` (stored as `1.1499...`) becomes
/// `1.1`, and true midpoints such as `6.25` go to the even digit.
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}

/// Mean of an exact sum over `count` items, rounded to one decimal.
/// Returns 0.0 when `count` is zero.
pub fn avg_duration(duration_sum: f64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round_to(duration_sum / count as f64, 1)
}

/// `part / total` as a percentage rounded to one decimal. Returns 0.0 for an empty total.
pub fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(part as f64 / total as f64 * 100.0, 1)
}
