//! Domain failures that callers may want to match on. Everything else is
//! reported through `anyhow` with context attached at the I/O boundary.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("Codebook line {line}: invalid column range {start}-{end} for variable '{variable}'")]
    InvalidColumnRange {
        line: usize,
        variable: String,
        start: usize,
        end: usize,
    },

    #[error("Bucket '{bucket}' has a malformed range at position {position}: {reason}")]
    InvalidBucketRange {
        bucket: String,
        position: usize,
        reason: String,
    },

    #[error("Geography key '{key}' on input line {line} is not present in the geography table")]
    MissingGeography { key: String, line: usize },

    #[error("Buffer size must be at least 1 record")]
    ZeroBuffer,
}
