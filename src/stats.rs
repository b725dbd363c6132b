use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{
    CaseRecord, DailyBreakdown, DailyStatistics, DateRange, LocationBreakdown, MonthlyStatistics,
    MonthlySummary, TestResult,
};
use crate::repository::CaseRepository;

/// Summarises one day of cases for a disease and stores the summary.
pub async fn daily_statistics<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    date: NaiveDate,
) -> Result<DailyStatistics> {
    let cases = repo
        .query_cases(disease_type, None, Some(DateRange::single(date)))
        .await?;
    let stats = summarize_day(disease_type, date, &cases);

    repo.upsert_daily_summary(&stats).await?;
    info!(
        disease = disease_type,
        %date,
        total = stats.total_tests,
        positive = stats.positive_cases,
        "Daily statistics stored"
    );

    Ok(stats)
}

pub fn summarize_day(disease_type: &str, date: NaiveDate, cases: &[CaseRecord]) -> DailyStatistics {
    let mut positive = 0;
    let mut negative = 0;
    let mut positions = HashSet::new();
    let mut by_address: BTreeMap<Option<String>, (i64, i64)> = BTreeMap::new();

    for case in cases {
        let is_positive = case.test_result == TestResult::Positive;
        match case.test_result {
            TestResult::Positive => positive += 1,
            TestResult::Negative => negative += 1,
            TestResult::Pending => {}
        }

        if let Some(coordinates) = case.coordinates {
            positions.insert((
                coordinates.latitude.to_bits(),
                coordinates.longitude.to_bits(),
            ));
        }

        let entry = by_address.entry(case.address.clone()).or_insert((0, 0));
        entry.0 += 1;
        if is_positive {
            entry.1 += 1;
        }
    }

    let mut locations: Vec<LocationBreakdown> = by_address
        .into_iter()
        .map(|(address, (case_count, positive_count))| LocationBreakdown {
            address,
            case_count,
            positive_count,
        })
        .collect();
    locations.sort_by(|a, b| b.positive_count.cmp(&a.positive_count));

    DailyStatistics {
        disease_type: disease_type.to_string(),
        date,
        total_tests: cases.len() as i64,
        positive_cases: positive,
        negative_cases: negative,
        unique_locations: positions.len() as i64,
        locations,
    }
}

pub async fn monthly_statistics<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    month: u32,
    year: i32,
) -> Result<MonthlyStatistics> {
    let Some(range) = DateRange::month(month, year) else {
        debug!(month, year, "Month does not name a calendar month");
        return Ok(MonthlyStatistics::NoData {
            disease_type: disease_type.to_string(),
            month,
            year,
        });
    };

    let cases = repo.query_cases(disease_type, None, Some(range)).await?;
    Ok(summarize_month(disease_type, month, year, &cases))
}

/// Every case of a disease in a calendar month, ordered by test date. Cases
/// sharing a date keep id order. An invalid month yields no cases.
pub async fn monthly_cases<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    month: u32,
    year: i32,
) -> Result<Vec<CaseRecord>> {
    let Some(range) = DateRange::month(month, year) else {
        return Ok(Vec::new());
    };

    let mut cases = repo.query_cases(disease_type, None, Some(range)).await?;
    cases.sort_by_key(|case| (case.test_date, case.id));
    Ok(cases)
}

pub fn summarize_month(
    disease_type: &str,
    month: u32,
    year: i32,
    cases: &[CaseRecord],
) -> MonthlyStatistics {
    let daily_breakdown = daily_breakdown(cases);

    // Strictly greater keeps the earliest day on ties.
    let Some(peak) = daily_breakdown
        .iter()
        .fold(None, |best: Option<&DailyBreakdown>, day| match best {
            Some(best) if best.positive_cases >= day.positive_cases => Some(best),
            _ => Some(day),
        })
    else {
        return MonthlyStatistics::NoData {
            disease_type: disease_type.to_string(),
            month,
            year,
        };
    };

    let (peak_day, peak_day_cases) = (peak.date, peak.positive_cases);
    let total_tests: i64 = daily_breakdown.iter().map(|day| day.total_tests).sum();
    let total_positive: i64 = daily_breakdown.iter().map(|day| day.positive_cases).sum();
    let total_negative: i64 = daily_breakdown.iter().map(|day| day.negative_cases).sum();

    MonthlyStatistics::Summary(MonthlySummary {
        disease_type: disease_type.to_string(),
        month,
        year,
        total_tests,
        total_positive,
        total_negative,
        avg_daily_cases: total_positive as f64 / daily_breakdown.len() as f64,
        peak_day,
        peak_day_cases,
        daily_breakdown,
    })
}

/// Per-day counts in date order, covering only days that have cases.
pub fn daily_breakdown(cases: &[CaseRecord]) -> Vec<DailyBreakdown> {
    let mut days: BTreeMap<NaiveDate, DailyBreakdown> = BTreeMap::new();

    for case in cases {
        let day = days.entry(case.test_date).or_insert_with(|| DailyBreakdown {
            date: case.test_date,
            total_tests: 0,
            positive_cases: 0,
            negative_cases: 0,
        });
        day.total_tests += 1;
        match case.test_result {
            TestResult::Positive => day.positive_cases += 1,
            TestResult::Negative => day.negative_cases += 1,
            TestResult::Pending => {}
        }
    }

    days.into_values().collect()
}
