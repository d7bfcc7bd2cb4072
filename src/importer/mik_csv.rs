//! MixedInKey-style CSV importer: UTF-8, header row, flexible
//! case-insensitive column names.

use std::path::Path;

use super::{resolve_path, ExternalCatalogueImporter, ImportOutcome, ImportedEntry};
use crate::error::{Error, Result};
use crate::model::DjMeta;

const PATH_COLUMNS: &[&str] = &["path", "file", "filename", "location"];
const BPM_COLUMNS: &[&str] = &["bpm", "tempo"];
const KEY_COLUMNS: &[&str] = &["initial key", "initialkey", "key"];
const CAMELOT_COLUMNS: &[&str] = &["camelot", "camelot key"];
const ENERGY_COLUMNS: &[&str] = &["energy", "energy level"];
const COMMENT_COLUMNS: &[&str] = &["comment", "comments"];

pub struct MikCsvImporter;

impl ExternalCatalogueImporter for MikCsvImporter {
    fn import(&self, source: &Path, root: Option<&Path>) -> Result<ImportOutcome> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(source)
            .map_err(|e| Error::validation(format!("could not open MixedInKey CSV: {e}")))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::validation(format!("could not read CSV header: {e}")))?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let path_idx = find_column(&headers, PATH_COLUMNS);
        let bpm_idx = find_column(&headers, BPM_COLUMNS);
        let key_idx = find_column(&headers, KEY_COLUMNS);
        let camelot_idx = find_column(&headers, CAMELOT_COLUMNS);
        let energy_idx = find_column(&headers, ENERGY_COLUMNS);
        let comment_idx = find_column(&headers, COMMENT_COLUMNS);

        let Some(path_idx) = path_idx else {
            return Err(Error::validation(
                "MixedInKey CSV missing a path/file/filename/location column".to_string(),
            ));
        };

        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for record in reader.records() {
            let Ok(record) = record else {
                skipped += 1;
                continue;
            };

            let Some(raw_path) = record.get(path_idx).map(str::trim).filter(|s| !s.is_empty()) else {
                skipped += 1;
                continue;
            };

            let bpm = bpm_idx.and_then(|i| record.get(i)).and_then(|s| s.trim().parse().ok());
            let initial_key = key_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let camelot_key = camelot_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let energy_level = energy_idx
                .and_then(|i| record.get(i))
                .and_then(|s| s.trim().parse::<i32>().ok());
            let comment = comment_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            entries.push(ImportedEntry {
                path: resolve_path(raw_path, root),
                meta: DjMeta {
                    bpm,
                    initial_key,
                    camelot_key,
                    energy_level,
                    comment,
                },
            });
        }

        Ok(ImportOutcome { entries, skipped })
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|candidate| headers.iter().position(|h| h == candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_import_parses_standard_columns() {
        let csv = "Path,BPM,Key,Energy,Comment\n/music/a.mp3,128,8A,7,great track\n";
        let file = write_csv(csv);
        let outcome = MikCsvImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].path, "/music/a.mp3");
        assert_eq!(outcome.entries[0].meta.bpm, Some(128.0));
        assert_eq!(outcome.entries[0].meta.energy_level, Some(7));
    }

    #[test]
    fn test_import_resolves_relative_path_against_root() {
        let csv = "File,Tempo\na.mp3,130\n";
        let file = write_csv(csv);
        let outcome = MikCsvImporter
            .import(file.path(), Some(Path::new("/music/root")))
            .unwrap();
        assert_eq!(outcome.entries[0].path, "/music/root/a.mp3");
    }

    #[test]
    fn test_import_skips_row_with_empty_path() {
        let csv = "Path,BPM\n,128\n/music/b.mp3,130\n";
        let file = write_csv(csv);
        let outcome = MikCsvImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_import_missing_path_column_is_an_error() {
        let csv = "BPM,Key\n128,8A\n";
        let file = write_csv(csv);
        assert!(MikCsvImporter.import(file.path(), None).is_err());
    }

    #[test]
    fn test_import_ignores_unknown_columns() {
        let csv = "Path,Rating,BPM\n/music/c.mp3,5,140\n";
        let file = write_csv(csv);
        let outcome = MikCsvImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries[0].meta.bpm, Some(140.0));
    }
}
