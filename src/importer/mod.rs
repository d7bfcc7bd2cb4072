//! `ExternalCatalogueImporter`: parses sidecar DJ-software catalogues
//! and yields `(path, DJMeta)` pairs for the Catalogue Store to merge
//! in. The core never emits these formats, only reads
//! them.

pub mod mik_csv;
pub mod rekordbox_xml;
pub mod traktor_nml;

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::model::DjMeta;

/// One parsed sidecar entry plus the row index it came from, so callers
/// can report malformed-row counts against a stable line number.
#[derive(Debug, Clone)]
pub struct ImportedEntry {
    pub path: String,
    pub meta: DjMeta,
}

/// Outcome of a sidecar parse: the successfully parsed entries plus a
/// count of rows skipped as malformed.
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub entries: Vec<ImportedEntry>,
    pub skipped: usize,
}

/// Capability boundary for sidecar catalogue parsing.
pub trait ExternalCatalogueImporter {
    fn import(&self, source: &Path, root: Option<&Path>) -> Result<ImportOutcome>;
}

/// Resolve a possibly-relative sidecar path against an optional
/// configured root, matching the MixedInKey/Rekordbox/Traktor "relative
/// paths may be prefixed with a configured root" contract.
fn resolve_path(raw: &str, root: Option<&Path>) -> String {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return raw.to_string();
    }
    match root {
        Some(root) => root.join(candidate).to_string_lossy().to_string(),
        None => raw.to_string(),
    }
}

fn join_dir_file(dir: &str, file: &str) -> PathBuf {
    let dir = dir.trim_end_matches(['/', '\\']);
    PathBuf::from(format!("{dir}/{file}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_absolute_unchanged() {
        assert_eq!(resolve_path("/music/a.mp3", Some(Path::new("/root"))), "/music/a.mp3");
    }

    #[test]
    fn test_resolve_path_relative_prefixed_with_root() {
        let resolved = resolve_path("a.mp3", Some(Path::new("/music")));
        assert_eq!(resolved, "/music/a.mp3");
    }

    #[test]
    fn test_resolve_path_relative_without_root_unchanged() {
        assert_eq!(resolve_path("a.mp3", None), "a.mp3");
    }

    #[test]
    fn test_join_dir_file_strips_trailing_separator() {
        assert_eq!(join_dir_file("/music/", "a.mp3"), PathBuf::from("/music/a.mp3"));
    }
}
