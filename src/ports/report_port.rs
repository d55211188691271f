//! Result output port.

use std::path::Path;

use crate::domain::driver::RunResult;
use crate::domain::error::LivermoreError;

/// Port for persisting the ordered equity curve and trade ledger of a run.
pub trait ReportPort {
    fn write(&self, result: &RunResult, output_dir: &Path) -> Result<(), LivermoreError>;
}
