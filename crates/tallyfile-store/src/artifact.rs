//! Inventory artifacts and atomic file replacement.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use tallyfile_core::{Entry, InventoryArtifact};

use crate::error::CheckpointError;

/// Column order of the flat CSV projection.
pub const CSV_COLUMNS: [&str; 10] = [
    "kind",
    "name",
    "path",
    "extension",
    "sizeBytes",
    "sizeMb",
    "modified",
    "contentHash",
    "parentPath",
    "depth",
];

const UTF8_BOM: &str = "\u{feff}";

/// Replace `path` with whatever `write` produces.
///
/// The content goes to a temporary file in the same directory, is flushed
/// and synced, then renamed over the target. Readers see either the old
/// file or the new one, never a partial write.
pub(crate) fn replace_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&mut File>) -> Result<(), CheckpointError>,
) -> Result<(), CheckpointError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| CheckpointError::io(dir, e))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(|e| CheckpointError::io(path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| CheckpointError::io(path, e))?;
    temp.persist(path)
        .map_err(|e| CheckpointError::io(path, e.error))?;
    Ok(())
}

/// Atomically write `value` as pretty-printed JSON.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<(), CheckpointError> {
    replace_atomic(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, value)
            .map_err(|source| CheckpointError::Serialize { what, source })
    })
}

/// Atomically write the flat CSV projection of `entries`.
///
/// UTF-8 with a byte-order mark so spreadsheet tools detect the encoding,
/// CRLF row endings, and RFC 4180 quoting.
pub fn write_csv<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = &'a Entry>,
) -> Result<(), CheckpointError> {
    replace_atomic(path, |writer| {
        let csv_err = |source| CheckpointError::Csv {
            path: path.to_path_buf(),
            source,
        };
        writer
            .write_all(UTF8_BOM.as_bytes())
            .map_err(|e| CheckpointError::io(path, e))?;

        let mut csv = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(&mut *writer);
        csv.write_record(CSV_COLUMNS).map_err(csv_err)?;
        for entry in entries {
            csv.write_record(&csv_fields(entry)).map_err(csv_err)?;
        }
        csv.flush().map_err(|e| CheckpointError::io(path, e))
    })
}

fn csv_fields(entry: &Entry) -> [String; 10] {
    [
        entry.kind.to_string(),
        entry.name.to_string(),
        entry.path.clone(),
        entry.extension().unwrap_or_default(),
        entry.size_bytes.to_string(),
        entry.size_mb().to_string(),
        entry
            .modified_at
            .map(|m| m.to_rfc3339())
            .unwrap_or_default(),
        entry.content_hash.clone().unwrap_or_default(),
        entry.parent_path.clone(),
        entry.depth.to_string(),
    ]
}

/// Read an inventory artifact.
pub fn read_inventory(path: &Path) -> Result<InventoryArtifact, CheckpointError> {
    let file = File::open(path).map_err(|e| CheckpointError::InventoryUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        CheckpointError::InventoryUnreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyfile_core::{InventorySnapshot, RunStatus};
    use tempfile::TempDir;

    #[test]
    fn test_csv_escapes_quotes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.csv");
        let entries = vec![Entry::new_file("/say \"hi\".txt", 1)];

        write_csv(&path, &entries).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let row = raw.split("\r\n").nth(1).unwrap();

        assert!(row.starts_with("file,\"say \"\"hi\"\".txt\",\"/say \"\"hi\"\".txt\",.txt,1,"));
    }

    #[test]
    fn test_csv_has_bom_header_and_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.csv");
        let entries = vec![
            Entry::new_folder("/A"),
            Entry::new_file("/A/report, final.PDF", 1_572_864),
        ];

        write_csv(&path, &entries).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let body = raw.strip_prefix(UTF8_BOM).unwrap();
        let lines: Vec<_> = body.split("\r\n").collect();

        assert_eq!(
            lines[0],
            "kind,name,path,extension,sizeBytes,sizeMb,modified,contentHash,parentPath,depth"
        );
        assert_eq!(lines[1], "folder,A,/A,,0,0,,,/,1");
        assert_eq!(
            lines[2],
            "file,\"report, final.PDF\",\"/A/report, final.PDF\",.pdf,1572864,1.5,,,/A,2"
        );
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_json_round_trip_through_reader() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.json");
        let entries = vec![Entry::new_folder("/A"), Entry::new_file("/A/f.txt", 1024)];
        let snapshot = InventorySnapshot::new(entries.iter().collect(), RunStatus::Complete, 2);

        write_json_atomic(&path, "inventory", &snapshot).unwrap();
        let artifact = read_inventory(&path).unwrap();

        assert_eq!(artifact.entries, entries);
        assert!(artifact.summary.is_complete());
        assert_eq!(artifact.recompute().total_size_bytes, 1024);
    }

    #[test]
    fn test_unreadable_inventory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("inventory.json");
        std::fs::write(&path, "{\"summary\": 1").unwrap();

        let err = read_inventory(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::InventoryUnreadable { .. }));
    }
}
