//! Versioned, compressed snapshot files
//!
//! Layout: one gzip member whose header names its single entry `data`. The
//! decompressed stream is bincode-encoded:
//!
//! ```text
//! format_version: u32
//! count:          u64
//! record * count
//! ```
//!
//! A file carrying any other `format_version` is rejected outright; there is
//! no migration path.

use crate::graph::{GraphError, GraphResult};
use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version written into every snapshot
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Name of the single archive entry
pub const SNAPSHOT_ENTRY: &str = "data";

/// Upper bound on the capacity reserved up front from an untrusted count
const MAX_PREALLOCATED_RECORDS: usize = 1 << 16;

pub fn write_snapshot<T: Serialize>(
    path: &Path,
    records: &[T],
    compression_level: u32,
) -> GraphResult<()> {
    let tmp = staging_path(path);
    if let Err(e) = write_records(&tmp, records, compression_level) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    // The previous snapshot stays intact until the new one is complete
    fs::rename(&tmp, path)?;

    debug!(path = ?path, count = records.len(), "snapshot written");
    Ok(())
}

/// Sibling file a snapshot is written to before it replaces `path`
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_records<T: Serialize>(path: &Path, records: &[T], compression_level: u32) -> GraphResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut encoder = GzBuilder::new()
        .filename(SNAPSHOT_ENTRY)
        .write(BufWriter::new(file), Compression::new(compression_level.min(9)));

    bincode::serialize_into(&mut encoder, &SNAPSHOT_FORMAT_VERSION)?;
    bincode::serialize_into(&mut encoder, &(records.len() as u64))?;
    for record in records {
        bincode::serialize_into(&mut encoder, record)?;
    }

    let mut writer = encoder.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> GraphResult<Vec<T>> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));

    let found: u32 = bincode::deserialize_from(&mut decoder)?;

    // The gzip header has been parsed once the first bytes are decoded
    let entry = decoder.header().and_then(|h| h.filename());
    if entry != Some(SNAPSHOT_ENTRY.as_bytes()) {
        return Err(GraphError::CorruptSnapshot(format!(
            "{}: expected a single '{}' entry",
            path.display(),
            SNAPSHOT_ENTRY
        )));
    }

    if found != SNAPSHOT_FORMAT_VERSION {
        return Err(GraphError::FormatMismatch {
            expected: SNAPSHOT_FORMAT_VERSION,
            found,
        });
    }

    let count: u64 = bincode::deserialize_from(&mut decoder)?;
    let capacity = usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATED_RECORDS);
    let mut records = Vec::with_capacity(capacity);
    for _ in 0..count {
        records.push(bincode::deserialize_from(&mut decoder)?);
    }

    debug!(path = ?path, count, "snapshot read");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        let records = vec!["alpha".to_string(), "beta".to_string()];

        write_snapshot(&path, &records, 6).unwrap();
        let loaded: Vec<String> = read_snapshot(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_overwrite_replaces_previous_and_leaves_no_staging_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");

        write_snapshot(&path, &["old".to_string()], 6).unwrap();
        write_snapshot(&path, &["new".to_string(), "newer".to_string()], 6).unwrap();

        let loaded: Vec<String> = read_snapshot(&path).unwrap();
        assert_eq!(loaded, vec!["new".to_string(), "newer".to_string()]);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.dat");
        write_snapshot(&path, &["kept".to_string()], 6).unwrap();

        // A directory squatting on the staging path makes the write fail
        fs::create_dir(staging_path(&path)).unwrap();
        assert!(write_snapshot(&path, &["lost".to_string()], 6).is_err());

        let loaded: Vec<String> = read_snapshot(&path).unwrap();
        assert_eq!(loaded, vec!["kept".to_string()]);
    }

    #[test]
    fn test_staging_path_is_sibling() {
        let path = Path::new("/data/graph/nodes.dat");
        assert_eq!(staging_path(path), PathBuf::from("/data/graph/nodes.dat.tmp"));
    }

    #[test]
    fn test_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.dat");
        write_snapshot::<u64>(&path, &[], 1).unwrap();
        let loaded: Vec<u64> = read_snapshot(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future.dat");

        let file = File::create(&path).unwrap();
        let mut encoder = GzBuilder::new()
            .filename(SNAPSHOT_ENTRY)
            .write(file, Compression::default());
        bincode::serialize_into(&mut encoder, &(SNAPSHOT_FORMAT_VERSION + 1)).unwrap();
        bincode::serialize_into(&mut encoder, &0u64).unwrap();
        encoder.finish().unwrap();

        let result = read_snapshot::<String>(&path);
        match result {
            Err(GraphError::FormatMismatch { expected, found }) => {
                assert_eq!(expected, SNAPSHOT_FORMAT_VERSION);
                assert_eq!(found, SNAPSHOT_FORMAT_VERSION + 1);
            }
            other => panic!("expected format mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unnamed_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anonymous.dat");

        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        bincode::serialize_into(&mut encoder, &SNAPSHOT_FORMAT_VERSION).unwrap();
        bincode::serialize_into(&mut encoder, &0u64).unwrap();
        encoder.finish().unwrap();

        assert!(matches!(
            read_snapshot::<String>(&path),
            Err(GraphError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_truncated_snapshot_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.dat");

        let file = File::create(&path).unwrap();
        let mut encoder = GzBuilder::new()
            .filename(SNAPSHOT_ENTRY)
            .write(file, Compression::default());
        bincode::serialize_into(&mut encoder, &SNAPSHOT_FORMAT_VERSION).unwrap();
        bincode::serialize_into(&mut encoder, &3u64).unwrap();
        bincode::serialize_into(&mut encoder, &"only one".to_string()).unwrap();
        encoder.finish().unwrap();

        assert!(read_snapshot::<String>(&path).is_err());
    }
}
