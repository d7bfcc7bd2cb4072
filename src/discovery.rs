//! Lazy recursive discovery of candidate audio paths.
//!
//! The Discovery Generator is a finite, non-restartable iterator over a
//! root directory: symlinks are not followed, hidden
//! directories and files are skipped, and only configured extensions are
//! emitted. Unreadable entries are logged and skipped rather than
//! failing the whole walk. Memory use is bounded by traversal depth, not
//! by library size, because `walkdir::WalkDir` holds one entry per depth
//! level rather than the full result set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Case-insensitive set of supported extensions, defaulting to
/// `{mp3, flac, wav, m4a, aac, ogg}`.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: HashSet<String>,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(["mp3", "flac", "wav", "m4a", "aac", "ogg"])
    }
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Produce a lazy, in-process iterator of absolute canonical audio file
/// paths under `root`. The returned iterator borrows nothing beyond
/// `root` and `filter`; it is not restartable - consumers that need to
/// walk the tree again must call this function again.
pub fn discover(root: &Path, filter: ExtensionFilter) -> impl Iterator<Item = PathBuf> + 'static {
    let root = root.to_path_buf();
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(move |path| filter.matches(path))
        .filter_map(|path| match path.canonicalize() {
            Ok(canonical) => Some(canonical),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                None
            }
        })
}

/// Validate that `root` exists, is a directory, and is readable. This is
/// the fail-fast check the Scanner Orchestrator runs before opening a
/// [`crate::model::ScanSession`].
pub fn validate_root(root: &Path) -> std::io::Result<()> {
    let metadata = std::fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }
    std::fs::read_dir(root)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_audio_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("music.flac")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("image.png")).unwrap();
        File::create(root.join("UPPERCASE.OGG")).unwrap();

        let subdir = root.join("subdir");
        fs::create_dir(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();
        File::create(subdir.join("ignore.doc")).unwrap();

        let paths: Vec<PathBuf> = discover(root, ExtensionFilter::default()).collect();
        assert_eq!(paths.len(), 4);

        let file_names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();

        assert!(file_names.contains(&"song.mp3".to_string()));
        assert!(file_names.contains(&"music.flac".to_string()));
        assert!(file_names.contains(&"track.wav".to_string()));
        assert!(file_names.contains(&"UPPERCASE.OGG".to_string()));
        assert!(!file_names.contains(&"notes.txt".to_string()));
        assert!(!file_names.contains(&"image.png".to_string()));
    }

    #[test]
    fn test_discover_skips_hidden_directories_and_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        let hidden_dir = root.join(".cache");
        fs::create_dir(&hidden_dir).unwrap();
        File::create(hidden_dir.join("cached.mp3")).unwrap();
        File::create(root.join(".hidden.mp3")).unwrap();
        File::create(root.join("visible.mp3")).unwrap();

        let paths: Vec<PathBuf> = discover(root, ExtensionFilter::default()).collect();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("visible.mp3"));
    }

    #[test]
    fn test_discover_does_not_follow_symlinks() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let target_dir = tempdir().unwrap();
        File::create(target_dir.path().join("outside.mp3")).unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target_dir.path(), root.join("link")).unwrap();
            let paths: Vec<PathBuf> = discover(root, ExtensionFilter::default()).collect();
            assert!(paths.is_empty());
        }
    }

    #[test]
    fn test_validate_root_rejects_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir.mp3");
        File::create(&file_path).unwrap();
        assert!(validate_root(&file_path).is_err());
    }

    #[test]
    fn test_validate_root_accepts_directory() {
        let dir = tempdir().unwrap();
        assert!(validate_root(dir.path()).is_ok());
    }
}
