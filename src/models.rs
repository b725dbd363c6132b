use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::SurveillanceError;

/// A WGS84 position in degrees. Absent positions are modelled as
/// `Option<Coordinates>`, never as a zero pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Pairs two nullable columns; a missing half drops the whole position.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self::new(latitude, longitude)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestResult {
    Positive,
    Negative,
    Pending,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Positive => "Positive",
            TestResult::Negative => "Negative",
            TestResult::Pending => "Pending",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = SurveillanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Positive" => Ok(TestResult::Positive),
            "Negative" => Ok(TestResult::Negative),
            "Pending" => Ok(TestResult::Pending),
            other => Err(SurveillanceError::InvalidRecord(format!(
                "unknown test result {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }
}

impl FromStr for Severity {
    type Err = SurveillanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Mild" => Ok(Severity::Mild),
            "Moderate" => Ok(Severity::Moderate),
            "Severe" => Ok(Severity::Severe),
            other => Err(SurveillanceError::InvalidRecord(format!(
                "unknown severity {other:?}"
            ))),
        }
    }
}

/// `days` calendar days before `date`, or `None` when the result leaves the
/// representable calendar.
pub fn days_before(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::try_days(days)?)
}

/// Inclusive calendar range. A range whose start is after its end matches
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// The whole calendar month, or `None` when month/year do not name one.
    pub fn month(month: u32, year: i32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self::new(start, next - Duration::days(1)))
    }

    /// The `days` days ending at (and including) `end`, or `None` when the
    /// start falls outside the representable calendar.
    pub fn trailing(end: NaiveDate, days: i64) -> Option<Self> {
        Some(Self::new(days_before(end, days.max(1) - 1)?, end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// One test result joined with its patient and hospital.
#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord {
    pub id: i64,
    pub disease_type: String,
    pub test_result: TestResult,
    pub test_date: NaiveDate,
    pub severity: Option<Severity>,
    pub patient_id: i64,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub hospital_id: i64,
    pub hospital_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub contact_email: Option<String>,
    pub api_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewHospital {
    pub name: String,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub contact_email: Option<String>,
    pub api_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPatient {
    pub hospital_id: i64,
    pub external_patient_id: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub hospital_id: i64,
    pub disease_type: String,
    pub test_result: TestResult,
    pub test_date: NaiveDate,
    pub severity: Option<Severity>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub source_key: Option<String>,
    pub patient: NewPatient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationBreakdown {
    pub address: Option<String>,
    pub case_count: i64,
    pub positive_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStatistics {
    pub disease_type: String,
    pub date: NaiveDate,
    pub total_tests: i64,
    pub positive_cases: i64,
    pub negative_cases: i64,
    pub unique_locations: i64,
    pub locations: Vec<LocationBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBreakdown {
    pub date: NaiveDate,
    pub total_tests: i64,
    pub positive_cases: i64,
    pub negative_cases: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub disease_type: String,
    pub month: u32,
    pub year: i32,
    pub total_tests: i64,
    pub total_positive: i64,
    pub total_negative: i64,
    pub avg_daily_cases: f64,
    pub peak_day: NaiveDate,
    pub peak_day_cases: i64,
    pub daily_breakdown: Vec<DailyBreakdown>,
}

/// Callers must branch on `NoData`; its numeric fields do not exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MonthlyStatistics {
    Summary(MonthlySummary),
    NoData {
        disease_type: String,
        month: u32,
        year: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskTier {
    Moderate,
    High,
    Critical,
}

impl RiskTier {
    pub fn for_size(case_count: usize) -> Self {
        match case_count {
            n if n >= 10 => RiskTier::Critical,
            n if n >= 5 => RiskTier::High,
            _ => RiskTier::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Moderate => "Moderate",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotMember {
    pub case_id: i64,
    pub test_date: NaiveDate,
    pub address: Option<String>,
    pub hospital_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    /// Address of the seed case.
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub case_count: usize,
    pub risk_level: RiskTier,
    pub radius_km: f64,
    pub seed_case_id: i64,
    pub cases: Vec<HotspotMember>,
}

impl Hotspot {
    pub fn case_ids(&self) -> Vec<i64> {
        self.cases.iter().map(|member| member.case_id).collect()
    }
}

/// Audit row for one accepted cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotRecord {
    pub disease_type: String,
    pub analysis_date: NaiveDate,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub case_count: i32,
    pub risk_level: RiskTier,
    pub radius_km: f64,
    pub case_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertLevel {
    Normal,
    High,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "Normal",
            AlertLevel::High => "High",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutbreakSignal {
    pub disease_type: String,
    pub is_outbreak: bool,
    pub recent_cases: i64,
    pub historical_cases: i64,
    pub historical_avg: f64,
    pub increase_factor: f64,
    pub window_days: i64,
    pub threshold: f64,
    pub analysis_date: NaiveDate,
    pub alert_level: AlertLevel,
}

impl OutbreakSignal {
    pub fn alert_message(&self) -> String {
        format!(
            "{} positive {} cases in the last {} days, {:.2}x the weekly baseline of {:.2}",
            self.recent_cases,
            self.disease_type,
            self.window_days,
            self.increase_factor,
            self.historical_avg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_results_round_trip_through_their_names() {
        for result in [TestResult::Positive, TestResult::Negative, TestResult::Pending] {
            assert_eq!(result.as_str().parse::<TestResult>().unwrap(), result);
        }
    }

    #[test]
    fn unknown_test_result_is_rejected() {
        let error = "positive".parse::<TestResult>().unwrap_err();
        assert!(matches!(error, SurveillanceError::InvalidRecord(_)));
        assert!("Inconclusive".parse::<TestResult>().is_err());
    }

    #[test]
    fn severities_round_trip_and_reject_unknown() {
        for severity in [Severity::Mild, Severity::Moderate, Severity::Severe] {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
        assert!(matches!(
            "Critical".parse::<Severity>(),
            Err(SurveillanceError::InvalidRecord(_))
        ));
    }

    #[test]
    fn half_a_coordinate_pair_is_no_position() {
        assert_eq!(
            Coordinates::from_parts(Some(9.05), Some(7.49)),
            Some(Coordinates::new(9.05, 7.49))
        );
        assert_eq!(Coordinates::from_parts(Some(9.05), None), None);
        assert_eq!(Coordinates::from_parts(None, Some(7.49)), None);
    }

    #[test]
    fn trailing_range_counts_the_end_day() {
        let range = DateRange::trailing(date(2024, 11, 30), 7).unwrap();
        assert_eq!(range.start, date(2024, 11, 24));
        assert_eq!(range.days().count(), 7);
    }

    #[test]
    fn oversized_offsets_are_none_instead_of_panicking() {
        let today = date(2024, 11, 30);
        assert_eq!(days_before(today, 1_000_000_000), None);
        assert_eq!(days_before(today, i64::MAX), None);
        assert!(DateRange::trailing(today, 1_000_000_000).is_none());
        assert_eq!(days_before(today, 30), Some(date(2024, 10, 31)));
    }

    #[test]
    fn alert_level_displays_its_name() {
        assert_eq!(AlertLevel::High.to_string(), "High");
        assert_eq!(AlertLevel::Normal.to_string(), "Normal");
    }
}
