//! Traktor collection NML importer. Per `<ENTRY>` inside `<COLLECTION>`,
//! extracts the location from `LOCATION` (composing `DIR`+`FILE` when
//! there's no single path attribute), the key from `INFO/@KEY` or
//! `INFO/@INITIALKEY`, the tempo from `INFO/@BPM` or `TEMPO/@BPM`, and
//! the comment from `INFO/@COMMENT`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

use super::{join_dir_file, resolve_path, ExternalCatalogueImporter, ImportOutcome, ImportedEntry};
use crate::error::{Error, Result};
use crate::model::DjMeta;

pub struct TraktorNmlImporter;

impl ExternalCatalogueImporter for TraktorNmlImporter {
    fn import(&self, source: &Path, root: Option<&Path>) -> Result<ImportOutcome> {
        let contents = std::fs::read_to_string(source).map_err(Error::Io)?;
        let mut reader = Reader::from_str(&contents);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        let mut buf = Vec::new();

        let mut in_entry = false;
        let mut location: Option<String> = None;
        let mut bpm: Option<f64> = None;
        let mut key: Option<String> = None;
        let mut comment: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"ENTRY" => {
                    in_entry = true;
                    location = None;
                    bpm = None;
                    key = None;
                    comment = None;
                }
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if in_entry && e.name().as_ref() == b"LOCATION" => {
                    location = parse_location(e);
                }
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if in_entry && e.name().as_ref() == b"INFO" => {
                    for attr in e.attributes().flatten() {
                        let Ok(value) = attr.unescape_value() else { continue };
                        match attr.key.as_ref() {
                            b"KEY" | b"INITIALKEY" if key.is_none() => key = Some(value.to_string()),
                            b"BPM" if bpm.is_none() => bpm = value.parse().ok(),
                            b"COMMENT" => comment = Some(value.to_string()),
                            _ => {}
                        }
                    }
                }
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if in_entry && e.name().as_ref() == b"TEMPO" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"BPM" {
                            if let Ok(value) = attr.unescape_value() {
                                bpm = bpm.or_else(|| value.parse().ok());
                            }
                        }
                    }
                }
                Ok(Event::End(ref e)) if e.name().as_ref() == b"ENTRY" => {
                    in_entry = false;
                    match location.take() {
                        Some(raw_path) => entries.push(ImportedEntry {
                            path: resolve_path(&raw_path, root),
                            meta: DjMeta {
                                bpm,
                                initial_key: key.clone(),
                                camelot_key: key.clone().filter(|k| crate::model::is_valid_camelot(k)),
                                energy_level: None,
                                comment: comment.clone(),
                            },
                        }),
                        None => skipped += 1,
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::validation(format!("malformed Traktor NML: {e}"))),
            }
            buf.clear();
        }

        Ok(ImportOutcome { entries, skipped })
    }
}

fn parse_location(e: &BytesStart) -> Option<String> {
    let mut dir = None;
    let mut file = None;
    let mut single = None;

    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else { continue };
        match attr.key.as_ref() {
            b"DIR" => dir = Some(value.to_string()),
            b"FILE" => file = Some(value.to_string()),
            b"VOLUME" => {}
            b"PATH" => single = Some(value.to_string()),
            _ => {}
        }
    }

    match (dir, file) {
        (Some(dir), Some(file)) => Some(join_dir_file(&dir, &file).to_string_lossy().to_string()),
        _ => single,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_nml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_import_composes_dir_and_file() {
        let nml = r#"<NML><COLLECTION>
            <ENTRY>
                <LOCATION DIR="/:music/" FILE="a.mp3" VOLUME="C:"/>
                <INFO BPM="128.0" KEY="8A" COMMENT="club"/>
            </ENTRY>
        </COLLECTION></NML>"#;
        let file = write_nml(nml);
        let outcome = TraktorNmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].path, "/:music/a.mp3");
        assert_eq!(outcome.entries[0].meta.bpm, Some(128.0));
        assert_eq!(outcome.entries[0].meta.comment.as_deref(), Some("club"));
    }

    #[test]
    fn test_import_falls_back_to_tempo_element_bpm() {
        let nml = r#"<COLLECTION>
            <ENTRY>
                <LOCATION DIR="/music/" FILE="b.mp3"/>
                <TEMPO BPM="140.0"/>
            </ENTRY>
        </COLLECTION>"#;
        let file = write_nml(nml);
        let outcome = TraktorNmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries[0].meta.bpm, Some(140.0));
    }

    #[test]
    fn test_import_skips_entry_without_location() {
        let nml = r#"<COLLECTION><ENTRY><INFO BPM="120.0"/></ENTRY></COLLECTION>"#;
        let file = write_nml(nml);
        let outcome = TraktorNmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries.len(), 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_import_uses_initialkey_alias() {
        let nml = r#"<COLLECTION>
            <ENTRY>
                <LOCATION DIR="/music/" FILE="c.mp3"/>
                <INFO INITIALKEY="5B"/>
            </ENTRY>
        </COLLECTION>"#;
        let file = write_nml(nml);
        let outcome = TraktorNmlImporter.import(file.path(), None).unwrap();
        assert_eq!(outcome.entries[0].meta.camelot_key.as_deref(), Some("5B"));
    }
}
