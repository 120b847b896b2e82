//! BLAKE3 content hashing.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use blake3::Hasher;

use codepulse_core::ContentHash;

/// Files above this size are hashed through a memory map.
const MMAP_THRESHOLD: u64 = 128 * 1024;

/// Compute the BLAKE3 hash of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut hasher = Hasher::new();

    if file_size > MMAP_THRESHOLD {
        hasher.update_mmap(path)?;
    } else {
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
    }

    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Compute the BLAKE3 hash of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.py");
        fs::write(&path, "def f():\n    return 1\n").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            hash_bytes(b"def f():\n    return 1\n")
        );
    }

    #[test]
    fn test_large_file_uses_same_hash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.c");
        let content = vec![b'x'; (MMAP_THRESHOLD as usize) * 2];
        fs::write(&path, &content).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&content));
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(hash_file(&temp.path().join("gone.rs")).is_err());
    }
}
