use crate::domain::transaction::TransactionRecord;
use crate::error::{BridgeError, Result};
use std::io::BufRead;

/// Reads transaction records from JSON lines, one object per line.
///
/// Lines are read lazily, so a large feed is never held in memory at once.
/// Blank lines are ignored.
pub struct RecordReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Yields one result per non-blank line, in order. A line that does not
    /// hold a valid record yields an error and reading carries on with the
    /// next line.
    pub fn records(self) -> impl Iterator<Item = Result<TransactionRecord>> {
        self.source.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str::<TransactionRecord>(&line).map_err(BridgeError::from)),
            Err(e) => Some(Err(BridgeError::from(e))),
        })
    }
}
