//! Fast structural file fingerprinting for change detection.
//!
//! Hashes the first 64 KiB and, for files large enough, the last 64 KiB.
//! This is explicitly NOT a content-integrity hash: equality is a fast
//! "probably unchanged" hint, never a security claim.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::SystemTime;

const CHUNK_SIZE: u64 = 64 * 1024;

/// `(size, mtime)` for a path, as seconds since the epoch with fractional
/// precision. Used by the Catalogue Store's cache-freshness comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: f64,
}

/// Stat a path without touching the catalogue. Returns `None` if the
/// path does not exist; other IO errors propagate so genuine faults are
/// distinguishable from "file doesn't exist" at call sites that care.
pub fn stat(path: &Path) -> std::io::Result<Option<FileStat>> {
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mtime = metadata
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH)
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            Ok(Some(FileStat {
                size: metadata.len(),
                mtime,
            }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Compute a fast structural fingerprint: SHA-256 over the file size
/// followed by the first 64 KiB and, for files larger than 128 KiB, the
/// last 64 KiB. Falls back to hashing the canonicalized path string on
/// stat failure so the function never panics on an unreadable path.
pub fn compute(path: &Path) -> Vec<u8> {
    match compute_inner(path) {
        Ok(digest) => digest,
        Err(_) => fallback_path_hash(path),
    }
}

fn compute_inner(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut hasher = Sha256::new();
    hasher.update(file_size.to_le_bytes());

    if file_size <= CHUNK_SIZE * 2 {
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        hasher.update(&buffer);
    } else {
        let mut buffer = vec![0u8; CHUNK_SIZE as usize];

        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);

        file.seek(SeekFrom::End(-(CHUNK_SIZE as i64)))?;
        file.read_exact(&mut buffer)?;
        hasher.update(&buffer);
    }

    Ok(hasher.finalize().to_vec())
}

fn fallback_path_hash(path: &Path) -> Vec<u8> {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_fingerprint_small_file_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.mp3");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"some audio bytes").unwrap();
        drop(file);

        let a = compute(&path);
        let b = compute(&path);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_fingerprint_differs_on_content_change() {
        let dir = tempdir().unwrap();
        let p1 = dir.path().join("a.mp3");
        let p2 = dir.path().join("b.mp3");
        std::fs::write(&p1, b"content A").unwrap();
        std::fs::write(&p2, b"content B").unwrap();

        assert_ne!(compute(&p1), compute(&p2));
    }

    #[test]
    fn test_fingerprint_large_file_samples_head_and_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.wav");
        let mut data = vec![0u8; (CHUNK_SIZE as usize) * 3];
        data[0] = 1;
        *data.last_mut().unwrap() = 2;
        std::fs::write(&path, &data).unwrap();

        let fp1 = compute(&path);

        // Mutate a byte in the untouched middle region; fingerprint should
        // be unaffected since only head/tail chunks (plus size) are hashed.
        let mid = data.len() / 2;
        data[mid] = 99;
        std::fs::write(&path, &data).unwrap();
        let fp2 = compute(&path);

        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_fingerprint_falls_back_on_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.mp3");
        // Must not panic; falls back to a path-based hash.
        let fp = compute(&path);
        assert_eq!(fp.len(), 32);
    }

    #[test]
    fn test_stat_missing_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.mp3");
        assert!(stat(&path).unwrap().is_none());
    }

    #[test]
    fn test_stat_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.mp3");
        std::fs::write(&path, b"data").unwrap();
        let stat = stat(&path).unwrap().unwrap();
        assert_eq!(stat.size, 4);
        assert!(stat.mtime > 0.0);
    }
}
