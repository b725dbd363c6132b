use crate::error::Result;
use crate::models::{
    CaseRecord, DailyStatistics, DateRange, HotspotRecord, OutbreakSignal, TestResult,
};

/// The storage contract the analysis layer reads from and audits into.
///
/// Implementations must return cases ordered by case id ascending; the
/// hotspot pass picks seeds in that order.
#[allow(async_fn_in_trait)]
pub trait CaseRepository {
    async fn query_cases(
        &self,
        disease_type: &str,
        result: Option<TestResult>,
        range: Option<DateRange>,
    ) -> Result<Vec<CaseRecord>>;

    async fn query_case_count(
        &self,
        disease_type: &str,
        result: TestResult,
        range: DateRange,
    ) -> Result<i64>;

    /// Replaces any summary already stored for the same disease and date.
    async fn upsert_daily_summary(&self, summary: &DailyStatistics) -> Result<()>;

    async fn insert_hotspot_record(&self, record: &HotspotRecord) -> Result<()>;

    async fn insert_outbreak_alert(&self, signal: &OutbreakSignal) -> Result<()>;
}
