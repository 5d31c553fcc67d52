use crate::domain::workflow::{WorkflowResult, WorkflowStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct ResultRow<'a> {
    transaction_id: &'a str,
    kind: &'a str,
    status: WorkflowStatus,
    duplicate: bool,
    policy_number: &'a str,
    message: &'a str,
    errors: String,
}

impl<'a> From<&'a WorkflowResult> for ResultRow<'a> {
    fn from(result: &'a WorkflowResult) -> Self {
        Self {
            transaction_id: &result.transaction_id,
            kind: result.transaction_kind.as_str(),
            status: result.status,
            duplicate: result.duplicate,
            policy_number: result.policy_number().unwrap_or_default(),
            message: &result.message,
            errors: result.errors.join("; "),
        }
    }
}

/// Writes one CSV row per workflow result.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_result(&mut self, result: &WorkflowResult) -> Result<()> {
        self.writer.serialize(ResultRow::from(result))?;
        Ok(())
    }

    pub fn write_results<'a>(&mut self, results: impl IntoIterator<Item = &'a WorkflowResult>) -> Result<()> {
        for result in results {
            self.write_result(result)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
