//! Store-and-forward delivery
//!
//! Each cycle connects, drains the queue, posts every record and rewrites the
//! queue with whatever was not acknowledged. Network failures never lose a
//! record; at worst a cycle makes no progress.

mod driver;

pub use driver::{CycleEnd, CycleReport, DeliveryDriver};
