//! Scheduled purging.
//!
//! This module hosts the background worker that triggers the incoming and
//! outgoing purge operations on independent intervals. Each operation is
//! single-flight: a tick that finds the previous run of the same operation
//! still active is skipped.
//!
//! What gets deleted, and how far back, is decided by [`crate::purge`]; the
//! worker only decides when.

mod worker;

pub use worker::{SingleFlight, start_purge_worker};
