//! Human-readable byte counts.

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Render a byte count with 1024-based units and two decimals, e.g. `2.00 KB`.
pub fn readable_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut index = 0;
    let mut divisor: u128 = 1;
    while index + 1 < UNITS.len() && u128::from(bytes) >= divisor * 1024 {
        divisor *= 1024;
        index += 1;
    }

    format!("{:.2} {}", bytes as f64 / divisor as f64, UNITS[index])
}
