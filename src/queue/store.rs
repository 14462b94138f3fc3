//! Durable record queue backed by a single text file
//!
//! Layout:
//! ```text
//! MeasureId,ProbeID,Temperature,PH,Turbidity,Zposition,XPosition,YPosition,Date
//! 0,0,21.5,7.02,312.4,0,0,0,2024-06-01 14:03:22
//! 1,0,21.4,-1,310.9,0,0,0,2024-06-01 14:04:22
//! ```
//!
//! Appends go straight to the end of the file and are fsynced before
//! returning. Replacing the contents writes a temp file and renames it over
//! the store, so a reader only ever sees the old or the new queue.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use probe_shared::codec::{self, SCHEMA_HEADER};
use probe_shared::Record;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the storage medium
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Header state of the file on disk
#[derive(Debug, PartialEq)]
enum HeaderState {
    Missing,
    Stale(String),
    Current,
}

/// Crash-tolerant queue of records awaiting delivery
#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
}

impl DurableQueue {
    /// Open the queue at `path`, creating it or resetting a stale schema
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let mut queue = Self { path: path.into() };
        queue.ensure_header()?;
        Ok(queue)
    }

    /// Append one record and fsync it
    pub fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        self.ensure_header()?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;

        let mut line = String::new();
        // A store rewritten without a final terminator must not glue lines together
        if !ends_with_newline(&mut file).map_err(|e| StorageError::io(&self.path, e))? {
            line.push('\n');
        }
        codec::encode_into(record, &mut line);

        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::io(&self.path, e))?;

        debug!(measure_id = record.measure_id, "[QUEUE] Appended record");
        Ok(())
    }

    /// Read and decode every pending record, in append order
    ///
    /// Lines that do not decode are dropped with a warning. A stale or
    /// missing header resets the store and yields an empty queue.
    pub fn drain_all(&mut self) -> Result<Vec<Record>, StorageError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "[QUEUE] Store missing, recreating");
                self.reset()?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if content.is_empty() {
            self.reset()?;
            return Ok(Vec::new());
        }

        // Split on raw bytes so one corrupt line cannot fail the whole read
        let mut lines = content.split(|b| *b == b'\n');
        let header = lines.next().map(String::from_utf8_lossy).unwrap_or_default();
        if let Err(e) = codec::check_header(&header) {
            warn!("[QUEUE] {}, discarding stale store", e);
            self.reset()?;
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (index, raw) in lines.enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let line_no = index + 2;
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = line_no, "[QUEUE] Dropping line with invalid UTF-8: {}", e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match codec::decode(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = line_no, "[QUEUE] Dropping malformed line: {}", e),
            }
        }

        Ok(records)
    }

    /// Atomically rewrite the store with exactly `records`
    pub fn replace(&mut self, records: &[Record]) -> Result<(), StorageError> {
        let mut content = String::with_capacity(SCHEMA_HEADER.len() + 1 + records.len() * 64);
        content.push_str(SCHEMA_HEADER);
        content.push('\n');
        for record in records {
            codec::encode_into(record, &mut content);
        }

        // Write atomically via a temp file + rename
        let tmp = self.path.with_extension("tmp");
        write_synced(&tmp, content.as_bytes()).map_err(|e| StorageError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        sync_parent_dir(&self.path);

        debug!(count = records.len(), "[QUEUE] Replaced store contents");
        Ok(())
    }

    /// Discard everything and leave only the header
    fn reset(&mut self) -> Result<(), StorageError> {
        self.replace(&[])?;
        info!(path = %self.path.display(), "[QUEUE] Store initialized with fresh header");
        Ok(())
    }

    fn ensure_header(&mut self) -> Result<(), StorageError> {
        match self.header_state()? {
            HeaderState::Current => Ok(()),
            HeaderState::Missing => self.reset(),
            HeaderState::Stale(found) => {
                warn!(found = %found, "[QUEUE] Schema header mismatch, discarding stale store");
                self.reset()
            }
        }
    }

    fn header_state(&self) -> Result<HeaderState, StorageError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HeaderState::Missing),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        let mut first = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut first)
            .map_err(|e| StorageError::io(&self.path, e))?;

        if first.is_empty() {
            return Ok(HeaderState::Missing);
        }
        let first = String::from_utf8_lossy(&first);
        Ok(match codec::check_header(&first) {
            Ok(()) => HeaderState::Current,
            Err(_) => HeaderState::Stale(first.trim_end().to_string()),
        })
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

pub(super) fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Persist the rename itself
#[cfg(unix)]
pub(super) fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            debug!("[QUEUE] Directory sync skipped: {}", e);
        }
    }
}

#[cfg(not(unix))]
pub(super) fn sync_parent_dir(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use probe_shared::record::{Position, SENTINEL, TIMESTAMP_FORMAT};

    fn record(measure_id: u64) -> Record {
        Record {
            measure_id,
            probe_id: 0,
            temperature: 20.0 + measure_id as f64 / 10.0,
            ph: 7.25,
            turbidity: 300.5,
            position: Position::default(),
            timestamp: NaiveDateTime::parse_from_str("2024-06-01 14:03:22", TIMESTAMP_FORMAT)
                .unwrap(),
        }
    }

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("data_to_send.csv")
    }

    #[test]
    fn test_open_creates_store_with_header() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);

        let mut queue = DurableQueue::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{SCHEMA_HEADER}\n"));
        assert!(queue.drain_all().unwrap().is_empty());
    }

    fn extreme_record(measure_id: u64) -> Record {
        Record {
            measure_id,
            probe_id: u32::MAX,
            temperature: -0.1 + 0.2,
            ph: std::f64::consts::PI,
            turbidity: 1e-300,
            position: Position {
                x: -123456.789012345,
                y: f64::MAX,
                z: -f64::MIN_POSITIVE,
            },
            timestamp: NaiveDateTime::parse_from_str("1999-12-31 23:59:59", TIMESTAMP_FORMAT)
                .unwrap(),
        }
    }

    #[test]
    fn test_append_drain_roundtrip_preserves_order() {
        for n in [0u64, 1, 2, 5, 40] {
            let dir = tempfile::tempdir().expect("tmp dir");
            let mut queue = DurableQueue::open(store_path(&dir)).unwrap();

            let originals: Vec<Record> = (0..n)
                .map(|id| match id % 3 {
                    0 => record(id),
                    1 => extreme_record(id),
                    _ => Record {
                        ph: SENTINEL,
                        ..record(id)
                    },
                })
                .collect();
            for r in &originals {
                queue.append(r).unwrap();
            }

            assert_eq!(queue.drain_all().unwrap(), originals, "n = {n}");
        }
    }

    #[test]
    fn test_extreme_values_roundtrip_exactly() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut queue = DurableQueue::open(store_path(&dir)).unwrap();
        let original = extreme_record(u64::MAX);

        queue.append(&original).unwrap();

        let drained = queue.drain_all().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].temperature.to_bits(), original.temperature.to_bits());
        assert_eq!(drained[0].position.y.to_bits(), f64::MAX.to_bits());
        assert_eq!(drained[0], original);
    }

    #[test]
    fn test_drain_does_not_consume() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut queue = DurableQueue::open(store_path(&dir)).unwrap();
        queue.append(&record(1)).unwrap();

        assert_eq!(queue.drain_all().unwrap().len(), 1);
        assert_eq!(queue.drain_all().unwrap().len(), 1);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        {
            let mut queue = DurableQueue::open(&path).unwrap();
            queue.append(&record(1)).unwrap();
            queue.append(&record(2)).unwrap();
        }

        let mut reopened = DurableQueue::open(&path).unwrap();
        let ids: Vec<u64> = reopened.drain_all().unwrap().iter().map(|r| r.measure_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_replace_keeps_only_given_records() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let mut queue = DurableQueue::open(&path).unwrap();
        for id in 1..=3 {
            queue.append(&record(id)).unwrap();
        }

        queue.replace(&[record(2)]).unwrap();
        assert_eq!(queue.drain_all().unwrap(), vec![record(2)]);

        queue.replace(&[]).unwrap();
        assert!(queue.drain_all().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{SCHEMA_HEADER}\n"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_stale_header_resets_store() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        fs::write(
            &path,
            "MeasureId,ProbeID,Temperature,PH,Date\n1,0,20,7,2024-01-01 00:00:00\n",
        )
        .unwrap();

        let mut queue = DurableQueue::open(&path).unwrap();
        assert!(queue.drain_all().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{SCHEMA_HEADER}\n"));

        queue.append(&record(7)).unwrap();
        assert_eq!(queue.drain_all().unwrap(), vec![record(7)]);
    }

    #[test]
    fn test_header_lost_after_open_resets_on_drain() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let mut queue = DurableQueue::open(&path).unwrap();
        queue.append(&record(1)).unwrap();

        fs::write(&path, "garbage\n1,0,20,7,300,0,0,0,2024-01-01 00:00:00\n").unwrap();

        assert!(queue.drain_all().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{SCHEMA_HEADER}\n"));
    }

    #[test]
    fn test_append_recreates_deleted_store() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let mut queue = DurableQueue::open(&path).unwrap();
        fs::remove_file(&path).unwrap();

        queue.append(&record(3)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(SCHEMA_HEADER));
        assert_eq!(queue.drain_all().unwrap(), vec![record(3)]);
    }

    #[test]
    fn test_malformed_line_is_dropped() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let good_a = codec::encode(&record(1));
        let good_b = codec::encode(&record(3));
        fs::write(
            &path,
            format!("{SCHEMA_HEADER}\n{good_a}2,0,20.1,7\n\n{good_b}"),
        )
        .unwrap();

        let mut queue = DurableQueue::open(&path).unwrap();
        assert_eq!(queue.drain_all().unwrap(), vec![record(1), record(3)]);
    }

    #[test]
    fn test_invalid_utf8_line_is_dropped() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let mut queue = DurableQueue::open(&path).unwrap();
        queue.append(&record(1)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"2,0,\xff\xfe,7,300,0,0,0,2024-06-01 14:03:22\n")
                .unwrap();
        }
        queue.append(&record(3)).unwrap();

        assert_eq!(queue.drain_all().unwrap(), vec![record(1), record(3)]);
    }

    #[test]
    fn test_invalid_utf8_header_resets_store() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        fs::write(&path, b"Measure\xffId\n1,0,20,7,300,0,0,0,2024-01-01 00:00:00\n").unwrap();

        let mut queue = DurableQueue::open(&path).unwrap();
        assert!(queue.drain_all().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{SCHEMA_HEADER}\n"));
    }

    #[test]
    fn test_append_after_unterminated_last_line() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let line = codec::encode(&record(1));
        fs::write(&path, format!("{SCHEMA_HEADER}\n{}", line.trim_end())).unwrap();

        let mut queue = DurableQueue::open(&path).unwrap();
        queue.append(&record(2)).unwrap();

        assert_eq!(queue.drain_all().unwrap(), vec![record(1), record(2)]);
    }

    #[test]
    fn test_replace_failure_leaves_store_untouched() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = store_path(&dir);
        let mut queue = DurableQueue::open(&path).unwrap();
        queue.append(&record(1)).unwrap();
        queue.append(&record(2)).unwrap();

        // A directory squatting on the temp path makes the rewrite fail
        fs::create_dir(path.with_extension("tmp")).unwrap();

        let result = queue.replace(&[]);
        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(queue.drain_all().unwrap(), vec![record(1), record(2)]);
    }
}
