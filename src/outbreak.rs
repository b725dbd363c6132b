use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::{
    BASELINE_LOOKBACK_DAYS, DEFAULT_THRESHOLD, DEFAULT_WINDOW_DAYS, OUTBREAK_MIN_RECENT_CASES,
};
use crate::error::{Result, SurveillanceError};
use crate::models::{days_before, AlertLevel, DateRange, OutbreakSignal, TestResult};
use crate::repository::CaseRepository;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutbreakParams {
    pub window_days: i64,
    pub threshold: f64,
}

impl Default for OutbreakParams {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Compares positives in `[today - window, today]` against the weekly rate
/// over `[today - 30, today - window]`.
pub async fn detect_outbreak<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    today: NaiveDate,
    params: OutbreakParams,
) -> Result<OutbreakSignal> {
    let window_start = |days: i64| {
        days_before(today, days).ok_or_else(|| {
            SurveillanceError::InvalidRecord(format!(
                "a {days}-day window before {today} is outside the calendar"
            ))
        })
    };
    let recent_start = window_start(params.window_days)?;
    let baseline_start = window_start(BASELINE_LOOKBACK_DAYS)?;

    let recent = repo
        .query_case_count(
            disease_type,
            TestResult::Positive,
            DateRange::new(recent_start, today),
        )
        .await?;
    let historical = repo
        .query_case_count(
            disease_type,
            TestResult::Positive,
            DateRange::new(baseline_start, recent_start),
        )
        .await?;

    let signal = evaluate(disease_type, today, params, recent, historical);
    if signal.is_outbreak {
        warn!(
            disease = disease_type,
            recent = signal.recent_cases,
            factor = signal.increase_factor,
            "Outbreak threshold crossed"
        );
    } else {
        info!(disease = disease_type, recent = signal.recent_cases, "No outbreak");
    }

    Ok(signal)
}

pub fn evaluate(
    disease_type: &str,
    today: NaiveDate,
    params: OutbreakParams,
    recent: i64,
    historical: i64,
) -> OutbreakSignal {
    let avg_per_week = if historical > 0 {
        historical as f64 / (BASELINE_LOOKBACK_DAYS as f64 / 7.0)
    } else {
        0.0
    };

    let is_outbreak = recent as f64 >= avg_per_week * params.threshold
        && recent >= OUTBREAK_MIN_RECENT_CASES;

    // Display only: a zero factor is not a "no signal" marker.
    let increase_factor = if avg_per_week > 0.0 {
        round2(recent as f64 / avg_per_week)
    } else {
        0.0
    };

    OutbreakSignal {
        disease_type: disease_type.to_string(),
        is_outbreak,
        recent_cases: recent,
        historical_cases: historical,
        historical_avg: round2(avg_per_week),
        increase_factor,
        window_days: params.window_days,
        threshold: params.threshold,
        analysis_date: today,
        alert_level: if is_outbreak {
            AlertLevel::High
        } else {
            AlertLevel::Normal
        },
    }
}

/// Stores an alert row when the signal fired. Returns whether a row was written.
pub async fn record_alert<R: CaseRepository>(repo: &R, signal: &OutbreakSignal) -> Result<bool> {
    if !signal.is_outbreak {
        return Ok(false);
    }
    repo.insert_outbreak_alert(signal).await?;
    info!(disease = %signal.disease_type, date = %signal.analysis_date, "Outbreak alert recorded");
    Ok(true)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::memory::{case, date, MemoryRepository};

    fn today() -> NaiveDate {
        date(2024, 11, 30)
    }

    fn signal(recent: i64, historical: i64, threshold: f64) -> OutbreakSignal {
        let params = OutbreakParams {
            window_days: 7,
            threshold,
        };
        evaluate("Malaria", today(), params, recent, historical)
    }

    #[test]
    fn four_recent_cases_never_trigger() {
        for threshold in [0.0, 0.5, 1.0, 2.0] {
            assert!(!signal(4, 0, threshold).is_outbreak);
            assert!(!signal(4, 1, threshold).is_outbreak);
        }
    }

    #[test]
    fn empty_baseline_reports_zero_factor() {
        let result = signal(3, 0, 2.0);
        assert!(!result.is_outbreak);
        assert_eq!(result.historical_avg, 0.0);
        assert_eq!(result.increase_factor, 0.0);
        assert_eq!(result.alert_level, AlertLevel::Normal);
    }

    #[test]
    fn empty_baseline_with_enough_recent_cases_triggers() {
        let result = signal(5, 0, 2.0);
        assert!(result.is_outbreak);
        assert_eq!(result.increase_factor, 0.0);
        assert_eq!(result.alert_level, AlertLevel::High);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // 30 historical cases over 30 days is 7 per week; 2x is 14.
        let at_threshold = signal(14, 30, 2.0);
        assert!(at_threshold.is_outbreak);
        assert_eq!(at_threshold.historical_avg, 7.0);
        assert_eq!(at_threshold.increase_factor, 2.0);

        let below = signal(13, 30, 2.0);
        assert!(!below.is_outbreak);
        assert_eq!(below.increase_factor, 1.86);
    }

    #[test]
    fn averages_are_rounded_to_two_decimals() {
        let result = signal(6, 10, 2.0);
        assert_eq!(result.historical_avg, 2.33);
        assert_eq!(result.increase_factor, 2.57);
        assert!(result.is_outbreak);
    }

    #[tokio::test]
    async fn counts_recent_and_baseline_windows() {
        let mut cases = Vec::new();
        let mut id = 0;
        let mut add = |days_ago: i64, result: TestResult, disease: &str| {
            id += 1;
            cases.push(case(id, disease, result, today() - Duration::days(days_ago), None));
        };

        for days_ago in [0, 1, 2, 3, 5, 7] {
            add(days_ago, TestResult::Positive, "Malaria");
        }
        add(2, TestResult::Negative, "Malaria");
        add(2, TestResult::Positive, "Typhoid");
        for days_ago in [10, 20, 30] {
            add(days_ago, TestResult::Positive, "Malaria");
        }
        add(31, TestResult::Positive, "Malaria");

        let repo = MemoryRepository::new(cases);
        let result = detect_outbreak(&repo, "Malaria", today(), OutbreakParams::default())
            .await
            .unwrap();

        // Day 7 sits on the shared boundary and is counted by both windows.
        assert_eq!(result.recent_cases, 6);
        assert_eq!(result.historical_cases, 4);
        assert_eq!(result.historical_avg, 0.93);
        assert!(result.is_outbreak);
        assert_eq!(result.analysis_date, today());
    }

    #[tokio::test]
    async fn oversized_window_is_an_error() {
        let repo = MemoryRepository::new(vec![case(
            1,
            "Malaria",
            TestResult::Positive,
            today(),
            None,
        )]);
        let params = OutbreakParams {
            window_days: 1_000_000_000,
            threshold: 2.0,
        };

        let result = detect_outbreak(&repo, "Malaria", today(), params).await;
        assert!(matches!(result, Err(SurveillanceError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn window_longer_than_baseline_leaves_history_empty() {
        let repo = MemoryRepository::new(vec![
            case(1, "Malaria", TestResult::Positive, today() - Duration::days(40), None),
            case(2, "Malaria", TestResult::Positive, today(), None),
        ]);
        let params = OutbreakParams {
            window_days: 60,
            threshold: 2.0,
        };

        let result = detect_outbreak(&repo, "Malaria", today(), params).await.unwrap();
        assert_eq!(result.recent_cases, 2);
        assert_eq!(result.historical_cases, 0);
        assert!(!result.is_outbreak);
    }

    #[tokio::test]
    async fn alert_is_recorded_only_when_signal_fires() {
        let repo = MemoryRepository::default();

        let quiet = signal(3, 0, 2.0);
        assert!(!record_alert(&repo, &quiet).await.unwrap());
        assert!(repo.outbreak_alerts().is_empty());

        let loud = signal(20, 7, 2.0);
        assert!(record_alert(&repo, &loud).await.unwrap());
        assert_eq!(repo.outbreak_alerts(), vec![loud]);
    }
}
