//! Store-and-forward queue for readings awaiting delivery
//!
//! This module handles:
//! - Crash-tolerant append of one record per sampling tick
//! - Full drain-read with recovery from stale schemas and corrupt lines
//! - Atomic rewrite with the records that failed delivery
//! - Persistent measure id sequence

mod sequence;
mod store;

pub use sequence::MeasureSequence;
pub use store::{DurableQueue, StorageError};

use std::sync::Arc;
use tokio::sync::Mutex;

/// Queue shared between the sampling and delivery tasks
///
/// The lock is the single-writer discipline: append, drain and replace never
/// interleave.
pub type SharedQueue = Arc<Mutex<DurableQueue>>;
