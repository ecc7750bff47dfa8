//! Content and field hashing (spec §4.1). Pure, no BOM, no extra framing.

use crate::error::CoreResult;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// SHA-256 over the trimmed parts joined by a single `\n`, lowercase hex.
/// Whitespace-only parts are treated as empty.
pub fn hash_text<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 over a byte slice already in memory, lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads `path` sequentially (no seeking, no mutation) and returns
/// (lowercase-hex SHA-256, byte length).
pub fn hash_file(path: impl AsRef<Path>) -> CoreResult<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_text_joins_trimmed_parts_with_lf() {
        let a = hash_text(["  foo  ", "bar"]);
        let b = hash_text(["foo", "bar"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_text_empty_part_becomes_empty_string() {
        let a = hash_text(["foo", "   ", "bar"]);
        let b = hash_text(["foo", "", "bar"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_text_is_order_sensitive() {
        let a = hash_text(["foo", "bar"]);
        let b = hash_text(["bar", "foo"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_file_reports_content_digest_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);
        let (digest, len) = hash_file(&path).unwrap();
        assert_eq!(len, 11);
        let expected = {
            let mut h = Sha256::new();
            h.update(b"hello world");
            hex::encode(h.finalize())
        };
        assert_eq!(digest, expected);
    }
}
