//! Error taxonomy for the sampling engine.
//!
//! Only [`Error::EmptyHistory`] and [`Error::NotConnected`] ever reach callers of
//! the tracker directly. Malformed records and failed fetches are recoverable:
//! the background tasks log them, count them in
//! [`TrackerStats`](crate::tracker::TrackerStats), and keep going.

use thiserror::Error;

/// Errors produced by heapwatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A raw per-generation heap record lacked a required field or carried a
    /// value that is not a non-negative integer byte count.
    #[error("malformed heap record: field '{field}' {problem}")]
    MalformedSnapshot {
        /// The field that could not be read.
        field: &'static str,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// The data source could not deliver a process snapshot.
    #[error("data source fetch failed: {reason}")]
    DataSourceFetch {
        /// Whatever the data source reported.
        reason: String,
    },

    /// A reader asked for the latest sample before any sample existed.
    #[error("no heap samples have been recorded yet")]
    EmptyHistory,

    /// The tracker no longer holds a data-source connection.
    #[error("tracker has no data source connection")]
    NotConnected,
}

impl Error {
    /// Convenience constructor for data sources reporting a failed fetch.
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::DataSourceFetch {
            reason: reason.into(),
        }
    }
}

/// A specialized `Result` type returning the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
