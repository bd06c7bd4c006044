//! SHA-256 checksum utilities
//!
//! Release hosts publish a `<archive>.zip.sha256` companion file next to each
//! package. Its content is either a bare hex digest or the `sha256sum` output
//! format (`<hex>  <filename>`).

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the lowercase hex SHA-256 digest of a file's contents.
///
/// The file is streamed in chunks so large archives are not held in memory.
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the lowercase hex SHA-256 digest of in-memory bytes.
pub fn compute_bytes_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Extract the digest from the content of a checksum file.
///
/// Returns `None` when the first token is not a 64-character hex string.
pub fn parse_checksum_file(content: &str) -> Option<String> {
    let token = content.split_whitespace().next()?;
    let token = token.strip_prefix("sha256:").unwrap_or(token);
    if token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}
