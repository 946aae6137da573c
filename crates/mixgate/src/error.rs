//! Engine error taxonomy.
//!
//! Every failure the engine reports falls into one of three buckets:
//! `EMPTY` (expected absence), `FAIL` (caller-fixable) or `FATAL`
//! (environment/protocol). Decoding and value-parsing errors have their own
//! types and are folded into this one at the operation boundary.

use thiserror::Error;

use crate::envelope::Status;
use crate::value::ValueParseError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing found: unknown device, no stored sessions.
    #[error("{0}")]
    Empty(String),

    /// Caller-fixable: bad numid, malformed value, bad session name.
    #[error("{0}")]
    Fail(String),

    /// The target control cannot be written.
    #[error("control numid={numid} is read-only")]
    ReadOnly { numid: u32 },

    /// Device or protocol condition the caller cannot fix by retrying.
    #[error("{0}")]
    Fatal(String),

    /// A batch entry failed; carries the identifier that stopped the batch.
    #[error("numid={numid}: {source}")]
    Entry {
        numid: u32,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Status label used in the response envelope.
    pub fn status(&self) -> Status {
        match self {
            Self::Empty(_) => Status::Empty,
            Self::Fail(_) | Self::ReadOnly { .. } => Status::Fail,
            Self::Fatal(_) => Status::Fatal,
            Self::Entry { source, .. } => source.status(),
        }
    }

    /// Numid of the batch entry that failed, if this error came from a batch.
    pub fn failed_numid(&self) -> Option<u32> {
        match self {
            Self::Entry { numid, .. } => Some(*numid),
            Self::ReadOnly { numid } => Some(*numid),
            _ => None,
        }
    }

    pub(crate) fn entry(numid: u32, source: EngineError) -> Self {
        Self::Entry {
            numid,
            source: Box::new(source),
        }
    }
}

impl From<ValueParseError> for EngineError {
    fn from(err: ValueParseError) -> Self {
        Self::Fail(err.to_string())
    }
}
