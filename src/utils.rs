//! Small formatting helpers.

/// Format a byte slice as a spaced hex string for frame-level logs
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
