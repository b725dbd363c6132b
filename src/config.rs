//! Defaults shared by the CLI and the analysis layer.

pub const DEFAULT_LOG_FILTER: &str = "disease_surveillance=info,sqlx=warn";

pub const DEFAULT_RADIUS_KM: f64 = 5.0;
pub const DEFAULT_MIN_CASES: usize = 3;

pub const DEFAULT_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Historical lookback for the outbreak baseline, independent of the window.
pub const BASELINE_LOOKBACK_DAYS: i64 = 30;

/// Recent positive counts below this never raise an outbreak.
pub const OUTBREAK_MIN_RECENT_CASES: i64 = 5;

pub const DEFAULT_REPORT_DAYS: i64 = 30;
