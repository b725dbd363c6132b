use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod error;
mod geo;
mod hotspot;
#[cfg(test)]
mod memory;
mod models;
mod outbreak;
mod report;
mod repository;
mod stats;

use db::PgRepository;
use hotspot::HotspotParams;
use models::{
    days_before, Coordinates, DateRange, MonthlyStatistics, NewCase, NewHospital, NewPatient, Severity,
    TestResult,
};
use outbreak::OutbreakParams;
use repository::CaseRepository;

#[derive(Parser)]
#[command(name = "disease-surveillance")]
#[command(about = "Disease surveillance aggregator: case ingestion, statistics, hotspots and outbreak checks", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load deterministic sample data around Abuja
    Seed,
    /// Import test results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Register or update a hospital
    AddHospital {
        #[arg(long)]
        name: String,
        #[arg(long)]
        location: String,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        #[arg(long)]
        contact_email: Option<String>,
        #[arg(long)]
        api_endpoint: Option<String>,
    },
    /// List registered hospitals
    Hospitals,
    /// Record a single test result, upserting its patient
    Ingest {
        #[arg(long)]
        hospital_id: i64,
        #[arg(long)]
        patient_id: String,
        #[arg(long)]
        disease: String,
        /// Positive, Negative or Pending
        #[arg(long)]
        result: TestResult,
        #[arg(long)]
        date: NaiveDate,
        /// Mild, Moderate or Severe
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
        #[arg(long)]
        age: Option<i32>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        symptoms: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        source_key: Option<String>,
    },
    /// List every case of a disease in a month
    Cases {
        #[arg(long)]
        disease: String,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
    },
    /// Daily counts for a disease; stores the summary
    Daily {
        #[arg(long)]
        disease: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Monthly breakdown for a disease
    Monthly {
        #[arg(long)]
        disease: String,
        #[arg(long)]
        month: u32,
        #[arg(long)]
        year: i32,
    },
    /// Cluster positive cases into hotspots
    Hotspots {
        #[arg(long)]
        disease: String,
        /// Defaults to 30 days before the end date
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Defaults to today
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long, default_value_t = config::DEFAULT_RADIUS_KM)]
        radius_km: f64,
        #[arg(long, default_value_t = config::DEFAULT_MIN_CASES)]
        min_cases: usize,
        /// Skip writing the audit rows
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare recent positives against the 30-day baseline
    Outbreak {
        #[arg(long)]
        disease: String,
        #[arg(long, default_value_t = config::DEFAULT_WINDOW_DAYS)]
        window_days: i64,
        #[arg(long, default_value_t = config::DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Store an alert row when the threshold is crossed
        #[arg(long)]
        record: bool,
    },
    /// Generate a markdown surveillance report
    Report {
        #[arg(long)]
        disease: String,
        #[arg(long, default_value_t = config::DEFAULT_REPORT_DAYS)]
        since_days: i64,
        #[arg(long, default_value_t = config::DEFAULT_RADIUS_KM)]
        radius_km: f64,
        #[arg(long, default_value_t = config::DEFAULT_MIN_CASES)]
        min_cases: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a Postgres instance")?;
    let repo = PgRepository::new(database_url);
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            repo.init_db().await.context("failed to apply migrations")?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = repo.seed(today).await?;
            println!("Seed data inserted ({inserted} new cases).");
        }
        Commands::Import { csv } => {
            let inserted = repo
                .import_csv(&csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Inserted {inserted} cases from {}.", csv.display());
        }
        Commands::AddHospital {
            name,
            location,
            latitude,
            longitude,
            contact_email,
            api_endpoint,
        } => {
            let hospital = NewHospital {
                name,
                location,
                coordinates: Coordinates::from_parts(latitude, longitude),
                contact_email,
                api_endpoint,
            };
            let id = repo.add_hospital(&hospital).await?;
            println!("Hospital {} saved with id {id}.", hospital.name);
        }
        Commands::Hospitals => {
            let hospitals = repo.list_hospitals().await?;
            if cli.json {
                return print_json(&hospitals);
            }
            if hospitals.is_empty() {
                println!("No hospitals registered.");
            }
            for hospital in hospitals {
                println!("- [{}] {} ({})", hospital.id, hospital.name, hospital.location);
            }
        }
        Commands::Ingest {
            hospital_id,
            patient_id,
            disease,
            result,
            date,
            severity,
            address,
            latitude,
            longitude,
            age,
            gender,
            phone,
            symptoms,
            notes,
            source_key,
        } => {
            let case = NewCase {
                hospital_id,
                disease_type: disease,
                test_result: result,
                test_date: date,
                severity,
                symptoms,
                notes,
                source_key,
                patient: NewPatient {
                    hospital_id,
                    external_patient_id: patient_id,
                    age,
                    gender,
                    address,
                    coordinates: Coordinates::from_parts(latitude, longitude),
                    phone,
                },
            };
            match repo.ingest_case(&case).await? {
                Some(id) => println!("Test result recorded with id {id}."),
                None => println!("Test result already recorded for this source key."),
            }
        }
        Commands::Cases {
            disease,
            month,
            year,
        } => {
            if DateRange::month(month, year).is_none() {
                anyhow::bail!("{month}/{year} is not a calendar month");
            }
            let cases = stats::monthly_cases(&repo, &disease, month, year).await?;
            if cli.json {
                return print_json(&cases);
            }
            println!("{} {} cases in {:02}/{}:", cases.len(), disease, month, year);
            for case in cases {
                println!(
                    "- #{} {} {} at {} ({})",
                    case.id,
                    case.test_date,
                    case.test_result,
                    case.address.as_deref().unwrap_or("unknown address"),
                    case.hospital_name
                );
            }
        }
        Commands::Daily { disease, date } => {
            let date = date.unwrap_or(today);
            let summary = stats::daily_statistics(&repo, &disease, date).await?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "{} on {}: {} tests, {} positive, {} negative across {} locations",
                disease,
                date,
                summary.total_tests,
                summary.positive_cases,
                summary.negative_cases,
                summary.unique_locations
            );
            for location in summary.locations.iter().take(10) {
                println!(
                    "- {}: {} cases, {} positive",
                    location.address.as_deref().unwrap_or("unknown address"),
                    location.case_count,
                    location.positive_count
                );
            }
        }
        Commands::Monthly {
            disease,
            month,
            year,
        } => {
            let monthly = stats::monthly_statistics(&repo, &disease, month, year).await?;
            if cli.json {
                return print_json(&monthly);
            }
            match monthly {
                MonthlyStatistics::NoData { .. } => {
                    println!("No data found for {disease} in {month:02}/{year}.");
                }
                MonthlyStatistics::Summary(summary) => {
                    println!(
                        "{} in {:02}/{}: {} tests, {} positive, {} negative",
                        disease,
                        month,
                        year,
                        summary.total_tests,
                        summary.total_positive,
                        summary.total_negative
                    );
                    println!(
                        "Average {:.2} positive per reporting day; peak {} with {}",
                        summary.avg_daily_cases, summary.peak_day, summary.peak_day_cases
                    );
                }
            }
        }
        Commands::Hotspots {
            disease,
            start,
            end,
            radius_km,
            min_cases,
            dry_run,
        } => {
            let end = end.unwrap_or(today);
            let start = match start {
                Some(start) => start,
                None => days_before(end, 30)
                    .context("--end is too close to the start of the calendar")?,
            };
            let range = DateRange::new(start, end);
            let params = HotspotParams {
                radius_km,
                min_cases,
            };

            let hotspots = hotspot::detect_hotspots(&repo, &disease, range, params).await?;
            if !dry_run {
                hotspot::persist_hotspots(&repo, &disease, end, &hotspots).await?;
            }

            if cli.json {
                return print_json(&hotspots);
            }
            if hotspots.is_empty() {
                println!("No hotspots found for {disease} from {range}.");
                return Ok(());
            }
            println!("Hotspots for {disease} ({range}):");
            for spot in &hotspots {
                println!(
                    "- {} ({:.4}, {:.4}): {} cases, risk {}",
                    spot.location, spot.latitude, spot.longitude, spot.case_count, spot.risk_level
                );
            }
        }
        Commands::Outbreak {
            disease,
            window_days,
            threshold,
            record,
        } => {
            let params = OutbreakParams {
                window_days,
                threshold,
            };
            let signal = outbreak::detect_outbreak(&repo, &disease, today, params).await?;
            if record {
                outbreak::record_alert(&repo, &signal).await?;
            }

            if cli.json {
                return print_json(&signal);
            }
            println!(
                "{}: alert level {} ({} recent cases, baseline {:.2}/week, factor {:.2})",
                disease,
                signal.alert_level,
                signal.recent_cases,
                signal.historical_avg,
                signal.increase_factor
            );
        }
        Commands::Report {
            disease,
            since_days,
            radius_km,
            min_cases,
            out,
        } => {
            let Some(range) = DateRange::trailing(today, since_days) else {
                anyhow::bail!("--since-days {since_days} reaches outside the calendar");
            };
            let signal =
                outbreak::detect_outbreak(&repo, &disease, today, OutbreakParams::default())
                    .await?;
            let hotspots = hotspot::detect_hotspots(
                &repo,
                &disease,
                range,
                HotspotParams {
                    radius_km,
                    min_cases,
                },
            )
            .await?;
            let cases = repo.query_cases(&disease, None, Some(range)).await?;
            let trend = report::fill_trend(range, &stats::daily_breakdown(&cases));

            let report = report::build_report(&disease, range, &signal, &hotspots, &trend);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
