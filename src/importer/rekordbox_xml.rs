//! Rekordbox collection XML importer. Per `<TRACK>` element, extracts
//! `Location|Path|Name`, `AverageBpm|Tempo`, `Tonality|InitialKey|Key`,
//! and `Comments` attributes.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

use super::{resolve_path, ExternalCatalogueImporter, ImportOutcome, ImportedEntry};
use crate::error::{Error, Result};
use crate::model::DjMeta;

pub struct RekordboxXmlImporter;

impl ExternalCatalogueImporter for RekordboxXmlImporter {
    fn import(&self, source: &Path, root: Option<&Path>) -> Result<ImportOutcome> {
        let contents = std::fs::read_to_string(source).map_err(Error::Io)?;
        let mut reader = Reader::from_str(&contents);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"TRACK" => {
                    match parse_track(e) {
                        Some((raw_path, meta)) => entries.push(ImportedEntry {
                            path: resolve_path(&raw_path, root),
                            meta,
                        }),
                        None => skipped += 1,
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::validation(format!("malformed Rekordbox XML: {e}")));
                }
            }
            buf.clear();
        }

        Ok(ImportOutcome { entries, skipped })
    }
}

fn parse_track(e: &quick_xml::events::BytesStart) -> Option<(String, DjMeta)> {
    let mut location = None;
    let mut path_attr = None;
    let mut name = None;
    let mut bpm = None;
    let mut tonality = None;
    let mut comments = None;

    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match key {
            b"Location" => location = Some(value.to_string()),
            b"Path" => path_attr = Some(value.to_string()),
            b"Name" => name = Some(value.to_string()),
            b"AverageBpm" | b"Tempo" => bpm = value.parse::<f64>().ok(),
            b"Tonality" | b"InitialKey" | b"Key" => tonality = Some(value.to_string()),
            b"Comments" => comments = Some(value.to_string()),
            _ => {}
        }
    }

    let raw_path = location.or(path_attr).or(name)?;

    Some((
        raw_path,
        DjMeta {
            bpm,
            initial_key: tonality.clone(),
            camelot_key: tonality.filter(|k| crate::model::is_valid_camelot(k)),
            energy_level: None,
            comment: comments,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_xml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_import_parses_track_attributes() {
        let xml = r#"<DJ_PLAYLISTS><COLLECTION>
            <TRACK Location="/music/a.mp3" AverageBpm="128.00" Tonality="8A" Comments="nice"/>
        </COLLECTION></DJ_PLAYLISTS>"#;
        let file = write_xml(xml);
        let outcome = RekordboxXmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].path, "/music/a.mp3");
        assert_eq!(outcome.entries[0].meta.bpm, Some(128.0));
        assert_eq!(outcome.entries[0].meta.comment.as_deref(), Some("nice"));
    }

    #[test]
    fn test_import_skips_track_without_location_attribute() {
        let xml = r#"<COLLECTION><TRACK AverageBpm="120"/></COLLECTION>"#;
        let file = write_xml(xml);
        let outcome = RekordboxXmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_import_falls_back_to_key_attribute_alias() {
        let xml = r#"<COLLECTION><TRACK Location="/music/b.mp3" InitialKey="5B"/></COLLECTION>"#;
        let file = write_xml(xml);
        let outcome = RekordboxXmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries[0].meta.camelot_key.as_deref(), Some("5B"));
    }
}
