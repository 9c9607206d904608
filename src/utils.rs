//! # Utility Functions Module
//!
//! This module provides utility functions that improve code readability
//! and reduce boilerplate across the application: argument vectors for
//! external tools, decoding of subprocess output and size formatting.

/// Builds a `Vec<String>` from items of any `ToString` type.
///
/// # Example
/// ```rust,ignore
/// let args = media_compressor::args!["-hide_banner", "-i", path.display()];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        <Vec<String>>::from([$(::std::string::ToString::to_string(&$item)),*])
    };
}

/// Decode raw subprocess output.
///
/// Invalid UTF-8 is replaced rather than rejected, since ffmpeg echoes file
/// names and tags in whatever encoding they were written with. Windows line
/// endings become `\n` and the ideographic space (U+3000) becomes an ASCII space.
pub fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .replace("\r\n", "\n")
        .replace('\u{3000}', " ")
}

/// Format a byte count with the best-fitting SI (power of 1000) prefix.
pub fn format_si_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB", "TB", "PB"];
    let mut value = size as f64;
    let mut unit_index = 0;

    while value >= 1000.0 && unit_index < UNITS.len() - 1 {
        value /= 1000.0;
        unit_index += 1;
    }

    format!("{:.1} {}", value, UNITS[unit_index])
}

/// Current time as unix seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
