//! Market data access port.

use crate::domain::error::LivermoreError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

/// Supplier of complete, date-ordered daily series.
///
/// An empty result is not an error; callers skip the symbol. Implementations
/// must be shareable across the fetch pool.
pub trait DataPort: Sync {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, LivermoreError>;

    fn list_symbols(&self) -> Result<Vec<String>, LivermoreError> {
        Ok(Vec::new())
    }
}
