use chrono::Utc;

/// Generate a timestamp string in YYYYMMDD_HHMMSS format
pub fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Generate an artifact filename, e.g. `settings_fail_20240101_120000.png`
pub fn artifact_filename(prefix: &str, timestamp: &str, extension: &str) -> String {
    format!("{}_{}.{}", sanitize_prefix(prefix), timestamp, extension)
}

/// Replace anything but alphanumerics, `-` and `_` so a prefix is always a
/// single path component
pub fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "capture".to_string()
    } else {
        cleaned
    }
}
