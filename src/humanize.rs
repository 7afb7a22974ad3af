use chrono::{DateTime, Utc};

const PERIODS: [&str; 8] = ["sec", "min", "h", "day", "week", "month", "year", "decade"];
const LENGTHS: [f64; 7] = [60.0, 60.0, 24.0, 7.0, 4.35, 12.0, 10.0];

/// "5 sec ago", "3 h ago", "2 days ago". Units from "day" upward take a
/// plural "s" unless the value is exactly 1. Future instants read as "0 sec ago".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mut diff = (now - then).num_seconds().max(0) as f64;

    let mut i = 0;
    while i < LENGTHS.len() && diff >= LENGTHS[i] {
        diff /= LENGTHS[i];
        i += 1;
    }

    let value = diff.floor() as i64;
    let plural = if i > 2 && value != 1 { "s" } else { "" };
    format!("{} {}{} ago", value, PERIODS[i], plural)
}
