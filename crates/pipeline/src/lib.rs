//! Trickplay generation and serving.
//!
//! Everything here orchestrates: it owns the extraction process lifecycle,
//! the per-key locks, the background jobs and the job logs. Formats and
//! path rules come from `trickplay-core`.

pub mod bulk;
pub mod extraction;
pub mod generator;
pub mod job_log;
pub mod library;
pub mod locks;
pub mod monitor;
pub mod serving;

#[cfg(test)]
pub(crate) mod test_support;
