//! Persistent measure id counter
//!
//! Keeps measure ids monotonic across reboots, including after the queue has
//! drained empty. File format is a single decimal number: the next id.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::store::{sync_parent_dir, write_synced, DurableQueue, StorageError};

/// Source of monotonic measure ids
#[derive(Debug)]
pub struct MeasureSequence {
    path: PathBuf,
    next: u64,
}

impl MeasureSequence {
    /// Load the counter, never going below the highest id still pending
    pub fn open(path: impl Into<PathBuf>, queue: &mut DurableQueue) -> Result<Self, StorageError> {
        let path = path.into();
        let stored = read_counter(&path);
        let pending = queue
            .drain_all()?
            .iter()
            .map(|r| r.measure_id.saturating_add(1))
            .max()
            .unwrap_or(0);

        let next = stored.unwrap_or(0).max(pending);
        debug!(next, ?stored, "[SAMPLER] Measure sequence loaded");
        Ok(Self { path, next })
    }

    /// Id the next reading will get
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Hand out the next id and persist the counter
    ///
    /// A failed write only costs monotonicity across a reboot, so it is
    /// logged and the in-memory counter keeps advancing.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        if id == u64::MAX {
            warn!("[SAMPLER] Measure sequence exhausted, repeating the last id");
        }
        self.next = id.saturating_add(1);
        if let Err(e) = write_counter(&self.path, self.next) {
            warn!("[SAMPLER] Could not persist measure sequence: {}", e);
        }
        id
    }
}

fn read_counter(path: &Path) -> Option<u64> {
    match fs::read_to_string(path) {
        Ok(content) => match content.trim().parse() {
            Ok(next) => Some(next),
            Err(_) => {
                warn!(path = %path.display(), "[SAMPLER] Corrupt sequence file, recovering from queue");
                None
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("[SAMPLER] Could not read sequence file: {}", e);
            None
        }
    }
}

fn write_counter(path: &Path, next: u64) -> io::Result<()> {
    let tmp = path.with_extension("seq.tmp");
    write_synced(&tmp, format!("{next}\n").as_bytes())?;
    fs::rename(&tmp, path)?;
    sync_parent_dir(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_shared::{Position, Record};

    fn open_queue(dir: &tempfile::TempDir) -> DurableQueue {
        DurableQueue::open(dir.path().join("data_to_send.csv")).unwrap()
    }

    #[test]
    fn test_fresh_sequence_starts_at_zero() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut queue = open_queue(&dir);

        let mut seq = MeasureSequence::open(dir.path().join("data_to_send.seq"), &mut queue).unwrap();
        assert_eq!(seq.next_id(), 0);
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.peek(), 2);
    }

    #[test]
    fn test_sequence_survives_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("data_to_send.seq");
        let mut queue = open_queue(&dir);
        {
            let mut seq = MeasureSequence::open(&path, &mut queue).unwrap();
            seq.next_id();
            seq.next_id();
        }

        let mut seq = MeasureSequence::open(&path, &mut queue).unwrap();
        assert_eq!(seq.next_id(), 2);
    }

    #[test]
    fn test_counter_file_holds_next_id() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("data_to_send.seq");
        let mut queue = open_queue(&dir);

        let mut seq = MeasureSequence::open(&path, &mut queue).unwrap();
        seq.next_id();
        seq.next_id();

        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n");
        assert!(!path.with_extension("seq.tmp").exists());
    }

    #[test]
    fn test_max_pending_id_saturates() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("data_to_send.seq");
        let mut queue = open_queue(&dir);
        queue
            .append(&Record::new(u64::MAX, 0, 20.0, 7.0, 300.0, Position::default()))
            .unwrap();

        let mut seq = MeasureSequence::open(&path, &mut queue).unwrap();
        assert_eq!(seq.peek(), u64::MAX);
        assert_eq!(seq.next_id(), u64::MAX);
        assert_eq!(seq.next_id(), u64::MAX);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", u64::MAX));
    }

    #[test]
    fn test_open_survives_corrupt_queue_bytes() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut queue = open_queue(&dir);
        queue
            .append(&Record::new(4, 0, 20.0, 7.0, 300.0, Position::default()))
            .unwrap();
        {
            use std::io::Write;
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(dir.path().join("data_to_send.csv"))
                .unwrap();
            file.write_all(b"\xff\xff\xff\n").unwrap();
        }

        let mut seq = MeasureSequence::open(dir.path().join("data_to_send.seq"), &mut queue).unwrap();
        assert_eq!(seq.next_id(), 5);
    }

    #[test]
    fn test_corrupt_counter_recovers_from_queue() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("data_to_send.seq");
        let mut queue = open_queue(&dir);
        queue
            .append(&Record::new(41, 0, 20.0, 7.0, 300.0, Position::default()))
            .unwrap();
        fs::write(&path, "not a number").unwrap();

        let mut seq = MeasureSequence::open(&path, &mut queue).unwrap();
        assert_eq!(seq.next_id(), 42);
    }
}
