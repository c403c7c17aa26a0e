use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a copied payload, stored alongside the backup.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Turns an arbitrary file name into a safe object-key segment.
pub fn sanitize_key_segment(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
