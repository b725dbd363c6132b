use std::fmt::Write;

use crate::models::{DailyBreakdown, DateRange, Hotspot, OutbreakSignal};

/// Fills the days without cases so the trend table has one row per day.
pub fn fill_trend(range: DateRange, breakdown: &[DailyBreakdown]) -> Vec<DailyBreakdown> {
    range
        .days()
        .map(|date| {
            breakdown
                .iter()
                .find(|day| day.date == date)
                .cloned()
                .unwrap_or(DailyBreakdown {
                    date,
                    total_tests: 0,
                    positive_cases: 0,
                    negative_cases: 0,
                })
        })
        .collect()
}

pub fn build_report(
    disease_type: &str,
    range: DateRange,
    outbreak: &OutbreakSignal,
    hotspots: &[Hotspot],
    trend: &[DailyBreakdown],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Surveillance Report", disease_type);
    let _ = writeln!(output, "Generated for {}", range);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outbreak Status");
    let _ = writeln!(
        output,
        "- Alert level: {}{}",
        outbreak.alert_level,
        if outbreak.is_outbreak { " (outbreak)" } else { "" }
    );
    let _ = writeln!(
        output,
        "- {} positive cases in the last {} days",
        outbreak.recent_cases, outbreak.window_days
    );
    let _ = writeln!(
        output,
        "- Weekly baseline {:.2}, increase factor {:.2}",
        outbreak.historical_avg, outbreak.increase_factor
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Hotspots");

    if hotspots.is_empty() {
        let _ = writeln!(output, "No hotspots detected for this window.");
    } else {
        for hotspot in hotspots.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({:.4}, {:.4}): {} cases within {:.1} km, risk {}",
                hotspot.location,
                hotspot.latitude,
                hotspot.longitude,
                hotspot.case_count,
                hotspot.radius_km,
                hotspot.risk_level
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Trend");

    if trend.iter().all(|day| day.total_tests == 0) {
        let _ = writeln!(output, "No tests recorded for this window.");
    } else {
        let _ = writeln!(output, "| Date | Tests | Positive | Negative |");
        let _ = writeln!(output, "|---|---|---|---|");
        for day in trend {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                day.date, day.total_tests, day.positive_cases, day.negative_cases
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::date;
    use crate::models::{AlertLevel, RiskTier};

    fn quiet_signal() -> OutbreakSignal {
        OutbreakSignal {
            disease_type: "Malaria".to_string(),
            is_outbreak: false,
            recent_cases: 2,
            historical_cases: 0,
            historical_avg: 0.0,
            increase_factor: 0.0,
            window_days: 7,
            threshold: 2.0,
            analysis_date: date(2024, 11, 30),
            alert_level: AlertLevel::Normal,
        }
    }

    #[test]
    fn trend_fills_missing_days() {
        let range = DateRange::new(date(2024, 11, 1), date(2024, 11, 3));
        let breakdown = vec![DailyBreakdown {
            date: date(2024, 11, 2),
            total_tests: 4,
            positive_cases: 3,
            negative_cases: 1,
        }];

        let trend = fill_trend(range, &breakdown);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[0].total_tests, 0);
        assert_eq!(trend[1].positive_cases, 3);
        assert_eq!(trend[2].date, date(2024, 11, 3));
    }

    #[test]
    fn empty_report_says_so() {
        let range = DateRange::new(date(2024, 11, 1), date(2024, 11, 30));
        let trend = fill_trend(range, &[]);
        let report = build_report("Malaria", range, &quiet_signal(), &[], &trend);

        assert!(report.starts_with("# Malaria Surveillance Report"));
        assert!(report.contains("Alert level: Normal"));
        assert!(report.contains("No hotspots detected"));
        assert!(report.contains("No tests recorded"));
    }

    #[test]
    fn outbreak_alert_level_is_spelled_out() {
        let range = DateRange::new(date(2024, 11, 1), date(2024, 11, 30));
        let signal = OutbreakSignal {
            is_outbreak: true,
            recent_cases: 12,
            alert_level: AlertLevel::High,
            ..quiet_signal()
        };

        let report = build_report("Malaria", range, &signal, &[], &[]);
        assert!(report.contains("- Alert level: High (outbreak)"));
    }

    #[test]
    fn report_lists_hotspots_and_trend_rows() {
        let range = DateRange::new(date(2024, 11, 1), date(2024, 11, 2));
        let hotspot = Hotspot {
            location: "Wuse 2, Abuja".to_string(),
            latitude: 9.0795,
            longitude: 7.47,
            case_count: 6,
            risk_level: RiskTier::High,
            radius_km: 5.0,
            seed_case_id: 1,
            cases: Vec::new(),
        };
        let trend = vec![DailyBreakdown {
            date: date(2024, 11, 2),
            total_tests: 6,
            positive_cases: 6,
            negative_cases: 0,
        }];

        let report = build_report("Malaria", range, &quiet_signal(), &[hotspot], &trend);
        assert!(report.contains("- Wuse 2, Abuja (9.0795, 7.4700): 6 cases within 5.0 km, risk High"));
        assert!(report.contains("| 2024-11-02 | 6 | 6 | 0 |"));
    }
}
