//! In-memory `CaseRepository` used by the analysis tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{
    CaseRecord, Coordinates, DailyStatistics, DateRange, HotspotRecord, OutbreakSignal,
    TestResult,
};
use crate::repository::CaseRepository;

#[derive(Default)]
pub struct MemoryRepository {
    cases: Vec<CaseRecord>,
    daily: Mutex<BTreeMap<(String, NaiveDate), DailyStatistics>>,
    hotspots: Mutex<Vec<HotspotRecord>>,
    alerts: Mutex<Vec<OutbreakSignal>>,
}

impl MemoryRepository {
    pub fn new(mut cases: Vec<CaseRecord>) -> Self {
        cases.sort_by_key(|case| case.id);
        Self {
            cases,
            ..Self::default()
        }
    }

    pub fn daily_summaries(&self) -> Vec<DailyStatistics> {
        self.daily.lock().unwrap().values().cloned().collect()
    }

    pub fn hotspot_records(&self) -> Vec<HotspotRecord> {
        self.hotspots.lock().unwrap().clone()
    }

    pub fn outbreak_alerts(&self) -> Vec<OutbreakSignal> {
        self.alerts.lock().unwrap().clone()
    }

    fn matching<'a>(
        &'a self,
        disease_type: &'a str,
        result: Option<TestResult>,
        range: Option<DateRange>,
    ) -> impl Iterator<Item = &'a CaseRecord> + 'a {
        self.cases.iter().filter(move |case| {
            case.disease_type == disease_type
                && result.map_or(true, |wanted| case.test_result == wanted)
                && range.map_or(true, |range| range.contains(case.test_date))
        })
    }
}

impl CaseRepository for MemoryRepository {
    async fn query_cases(
        &self,
        disease_type: &str,
        result: Option<TestResult>,
        range: Option<DateRange>,
    ) -> Result<Vec<CaseRecord>> {
        Ok(self.matching(disease_type, result, range).cloned().collect())
    }

    async fn query_case_count(
        &self,
        disease_type: &str,
        result: TestResult,
        range: DateRange,
    ) -> Result<i64> {
        Ok(self.matching(disease_type, Some(result), Some(range)).count() as i64)
    }

    async fn upsert_daily_summary(&self, summary: &DailyStatistics) -> Result<()> {
        self.daily.lock().unwrap().insert(
            (summary.disease_type.clone(), summary.date),
            summary.clone(),
        );
        Ok(())
    }

    async fn insert_hotspot_record(&self, record: &HotspotRecord) -> Result<()> {
        self.hotspots.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn insert_outbreak_alert(&self, signal: &OutbreakSignal) -> Result<()> {
        self.alerts.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

/// Builds a case with sensible defaults for tests.
pub fn case(
    id: i64,
    disease_type: &str,
    test_result: TestResult,
    test_date: NaiveDate,
    coordinates: Option<(f64, f64)>,
) -> CaseRecord {
    CaseRecord {
        id,
        disease_type: disease_type.to_string(),
        test_result,
        test_date,
        severity: None,
        patient_id: id,
        age: Some(30),
        gender: Some("Female".to_string()),
        address: Some(format!("Address {id}")),
        coordinates: coordinates.map(|(lat, lon)| Coordinates::new(lat, lon)),
        hospital_id: 1,
        hospital_name: "National Hospital Abuja".to_string(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
