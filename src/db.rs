use std::collections::HashSet;
use std::io;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde_json::json;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, FromRow};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SurveillanceError};
use crate::models::{
    CaseRecord, Coordinates, DailyStatistics, DateRange, Hospital, HotspotRecord, NewCase,
    NewHospital, NewPatient, OutbreakSignal, Severity, TestResult,
};
use crate::repository::CaseRepository;

/// Postgres-backed repository. Every operation opens its own connection and
/// closes it before returning.
#[derive(Debug, Clone)]
pub struct PgRepository {
    database_url: String,
}

#[derive(FromRow)]
struct CaseRow {
    id: i64,
    disease_type: String,
    test_result: String,
    test_date: NaiveDate,
    severity: Option<String>,
    patient_id: i64,
    age: Option<i32>,
    gender: Option<String>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    hospital_id: i64,
    hospital_name: String,
}

impl TryFrom<CaseRow> for CaseRecord {
    type Error = SurveillanceError;

    fn try_from(row: CaseRow) -> Result<Self> {
        Ok(CaseRecord {
            id: row.id,
            disease_type: row.disease_type,
            test_result: row.test_result.parse()?,
            test_date: row.test_date,
            severity: row.severity.as_deref().map(str::parse::<Severity>).transpose()?,
            patient_id: row.patient_id,
            age: row.age,
            gender: row.gender,
            address: row.address,
            coordinates: Coordinates::from_parts(row.latitude, row.longitude),
            hospital_id: row.hospital_id,
            hospital_name: row.hospital_name,
        })
    }
}

#[derive(FromRow)]
struct HospitalRow {
    id: i64,
    hospital_name: String,
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    contact_email: Option<String>,
    api_endpoint: Option<String>,
}

impl From<HospitalRow> for Hospital {
    fn from(row: HospitalRow) -> Self {
        Hospital {
            id: row.id,
            name: row.hospital_name,
            location: row.location,
            coordinates: Coordinates::from_parts(row.latitude, row.longitude),
            contact_email: row.contact_email,
            api_endpoint: row.api_endpoint,
        }
    }
}

impl PgRepository {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    async fn connect(&self) -> Result<PgConnection> {
        let conn = PgConnection::connect(&self.database_url).await?;
        debug!("Opened database connection");
        Ok(conn)
    }

    pub async fn init_db(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        sqlx::migrate!("./migrations").run(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }

    pub async fn add_hospital(&self, hospital: &NewHospital) -> Result<i64> {
        let mut conn = self.connect().await?;
        let id = insert_hospital(&mut conn, hospital).await?;
        conn.close().await?;
        info!(hospital_id = id, name = %hospital.name, "Hospital registered");
        Ok(id)
    }

    pub async fn list_hospitals(&self) -> Result<Vec<Hospital>> {
        let mut conn = self.connect().await?;
        let rows: Vec<HospitalRow> = sqlx::query_as(
            r#"
            SELECT id, hospital_name, location, latitude, longitude, contact_email, api_endpoint
            FROM surveillance.hospitals
            ORDER BY hospital_name
            "#,
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;
        Ok(rows.into_iter().map(Hospital::from).collect())
    }

    /// Upserts the patient and appends the test result in one transaction.
    /// Returns the new case id, or `None` when the source key was already
    /// ingested.
    pub async fn ingest_case(&self, case: &NewCase) -> Result<Option<i64>> {
        let mut conn = self.connect().await?;
        let id = ingest_case_on(&mut conn, case).await?;
        conn.close().await?;
        Ok(id)
    }

    pub async fn seed(&self, today: NaiveDate) -> Result<usize> {
        let mut conn = self.connect().await?;

        let hospital_id = insert_hospital(
            &mut conn,
            &NewHospital {
                name: "National Hospital Abuja".to_string(),
                location: "Central District, Abuja".to_string(),
                coordinates: Some(Coordinates::new(9.0579, 7.4951)),
                contact_email: Some("contact@nationalhospital.ng".to_string()),
                api_endpoint: None,
            },
        )
        .await?;

        let neighbourhoods = [
            ("Wuse 2, Abuja", 9.0795, 7.4700),
            ("Garki, Abuja", 9.0319, 7.4860),
            ("Maitama, Abuja", 9.0882, 7.4934),
            ("Asokoro, Abuja", 9.0425, 7.5283),
            ("Gwarinpa, Abuja", 9.1099, 7.4042),
            ("Kubwa, Abuja", 9.1550, 7.3220),
            ("Karu, Abuja", 9.0100, 7.5900),
        ];
        let diseases = ["Malaria", "Malaria", "Typhoid", "Tuberculosis"];
        let severities = [Severity::Mild, Severity::Moderate, Severity::Severe];

        let mut inserted = 0usize;
        for i in 0..60usize {
            let (address, lat, lon) = neighbourhoods[i % neighbourhoods.len()];
            let test_result = if i % 3 == 2 {
                TestResult::Negative
            } else {
                TestResult::Positive
            };
            // Recent days are denser so the outbreak check has something to find.
            let days_ago = if i < 24 { (i % 6) as i64 } else { (i % 30) as i64 };

            let case = NewCase {
                hospital_id,
                disease_type: diseases[i % diseases.len()].to_string(),
                test_result,
                test_date: today - Duration::days(days_ago),
                severity: Some(severities[i % severities.len()]),
                symptoms: Some("Fever, headache".to_string()),
                notes: None,
                source_key: Some(format!("seed-{:03}", i + 1)),
                patient: NewPatient {
                    hospital_id,
                    external_patient_id: format!("PT{:03}", i + 1),
                    age: Some(((i * 7) % 80 + 1) as i32),
                    gender: Some(if i % 2 == 0 { "Female" } else { "Male" }.to_string()),
                    address: Some(address.to_string()),
                    coordinates: Some(Coordinates::new(
                        lat + (i % 4) as f64 * 0.002,
                        lon - (i % 3) as f64 * 0.002,
                    )),
                    phone: Some(format!("+23480{:08}", 10_000_000 + i * 7919)),
                },
            };

            if ingest_case_on(&mut conn, &case).await?.is_some() {
                inserted += 1;
            }
        }

        conn.close().await?;
        Ok(inserted)
    }

    /// Imports cases from CSV. Rows that fail to parse or insert are logged
    /// and skipped.
    pub async fn import_csv(&self, csv_path: &Path) -> Result<usize> {
        let mut reader = csv::Reader::from_path(csv_path)?;
        let cases = read_csv_cases(&mut reader);
        let mut conn = self.connect().await?;
        let mut inserted = 0usize;

        for (line, case) in cases {
            match ingest_case_on(&mut conn, &case).await {
                Ok(Some(_)) => inserted += 1,
                Ok(None) => debug!(line, "Row already imported"),
                Err(error) => warn!(line, %error, "Skipping CSV row"),
            }
        }

        conn.close().await?;
        Ok(inserted)
    }
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    hospital_id: i64,
    external_patient_id: String,
    age: Option<i32>,
    gender: Option<String>,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    phone: Option<String>,
    disease_type: String,
    test_result: TestResult,
    test_date: NaiveDate,
    severity: Option<Severity>,
    symptoms: Option<String>,
    notes: Option<String>,
    source_key: Option<String>,
}

impl From<CsvRow> for NewCase {
    fn from(row: CsvRow) -> Self {
        NewCase {
            hospital_id: row.hospital_id,
            disease_type: row.disease_type,
            test_result: row.test_result,
            test_date: row.test_date,
            severity: row.severity,
            symptoms: row.symptoms,
            notes: row.notes,
            source_key: row.source_key,
            patient: NewPatient {
                hospital_id: row.hospital_id,
                external_patient_id: row.external_patient_id,
                age: row.age,
                gender: row.gender,
                address: row.address,
                coordinates: Coordinates::from_parts(row.latitude, row.longitude),
                phone: row.phone,
            },
        }
    }
}

/// Parses CSV rows into cases paired with their file line. Unreadable rows
/// and rows repeating an earlier source key in the same file are skipped.
fn read_csv_cases<R: io::Read>(reader: &mut csv::Reader<R>) -> Vec<(usize, NewCase)> {
    let mut seen_keys = HashSet::new();
    let mut cases = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(error) => {
                warn!(line, %error, "Skipping unreadable CSV row");
                continue;
            }
        };

        if let Some(key) = &row.source_key {
            if !seen_keys.insert(key.clone()) {
                warn!(line, source_key = %key, "Skipping duplicate source key");
                continue;
            }
        }

        cases.push((line, NewCase::from(row)));
    }

    cases
}

/// The de-duplication key stored with a case; generated when the source did
/// not supply one.
fn source_key_for(case: &NewCase) -> String {
    case.source_key
        .clone()
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()))
}

async fn insert_hospital(conn: &mut PgConnection, hospital: &NewHospital) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO surveillance.hospitals
        (hospital_name, location, latitude, longitude, contact_email, api_endpoint)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (hospital_name) DO UPDATE
        SET location = EXCLUDED.location,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            contact_email = EXCLUDED.contact_email,
            api_endpoint = EXCLUDED.api_endpoint
        RETURNING id
        "#,
    )
    .bind(&hospital.name)
    .bind(&hospital.location)
    .bind(hospital.coordinates.map(|c| c.latitude))
    .bind(hospital.coordinates.map(|c| c.longitude))
    .bind(&hospital.contact_email)
    .bind(&hospital.api_endpoint)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

async fn ingest_case_on(conn: &mut PgConnection, case: &NewCase) -> Result<Option<i64>> {
    let mut tx = conn.begin().await?;
    let patient = &case.patient;

    let patient_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO surveillance.patients
        (hospital_id, external_patient_id, age, gender, address, latitude, longitude, phone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (hospital_id, external_patient_id) DO UPDATE
        SET age = EXCLUDED.age,
            gender = EXCLUDED.gender,
            address = EXCLUDED.address,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            phone = EXCLUDED.phone
        RETURNING id
        "#,
    )
    .bind(patient.hospital_id)
    .bind(&patient.external_patient_id)
    .bind(patient.age)
    .bind(&patient.gender)
    .bind(&patient.address)
    .bind(patient.coordinates.map(|c| c.latitude))
    .bind(patient.coordinates.map(|c| c.longitude))
    .bind(&patient.phone)
    .fetch_one(&mut *tx)
    .await?;

    let source_key = source_key_for(case);

    let case_id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO surveillance.test_results
        (patient_id, hospital_id, disease_type, test_result, test_date, severity, symptoms, notes, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(patient_id)
    .bind(case.hospital_id)
    .bind(&case.disease_type)
    .bind(case.test_result.as_str())
    .bind(case.test_date)
    .bind(case.severity.map(|s| s.as_str()))
    .bind(&case.symptoms)
    .bind(&case.notes)
    .bind(&source_key)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(case_id)
}

impl CaseRepository for PgRepository {
    async fn query_cases(
        &self,
        disease_type: &str,
        result: Option<TestResult>,
        range: Option<DateRange>,
    ) -> Result<Vec<CaseRecord>> {
        let mut conn = self.connect().await?;
        let rows: Vec<CaseRow> = sqlx::query_as(
            r#"
            SELECT tr.id, tr.disease_type, tr.test_result, tr.test_date, tr.severity,
                   p.id AS patient_id, p.age, p.gender, p.address, p.latitude, p.longitude,
                   h.id AS hospital_id, h.hospital_name
            FROM surveillance.test_results tr
            JOIN surveillance.patients p ON p.id = tr.patient_id
            JOIN surveillance.hospitals h ON h.id = tr.hospital_id
            WHERE tr.disease_type = $1
              AND ($2::text IS NULL OR tr.test_result = $2)
              AND ($3::date IS NULL OR tr.test_date >= $3)
              AND ($4::date IS NULL OR tr.test_date <= $4)
            ORDER BY tr.id
            "#,
        )
        .bind(disease_type)
        .bind(result.map(|r| r.as_str()))
        .bind(range.map(|r| r.start))
        .bind(range.map(|r| r.end))
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.into_iter().map(CaseRecord::try_from).collect()
    }

    async fn query_case_count(
        &self,
        disease_type: &str,
        result: TestResult,
        range: DateRange,
    ) -> Result<i64> {
        let mut conn = self.connect().await?;
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM surveillance.test_results
            WHERE disease_type = $1
              AND test_result = $2
              AND test_date BETWEEN $3 AND $4
            "#,
        )
        .bind(disease_type)
        .bind(result.as_str())
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&mut conn)
        .await?;
        conn.close().await?;
        Ok(count)
    }

    async fn upsert_daily_summary(&self, summary: &DailyStatistics) -> Result<()> {
        let summary_data = json!({ "locations": serde_json::to_value(&summary.locations)? });
        let mut conn = self.connect().await?;
        sqlx::query(
            r#"
            INSERT INTO surveillance.daily_statistics
            (disease_type, stat_date, total_cases, positive_cases, negative_cases, locations_affected, summary_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (disease_type, stat_date) DO UPDATE
            SET total_cases = EXCLUDED.total_cases,
                positive_cases = EXCLUDED.positive_cases,
                negative_cases = EXCLUDED.negative_cases,
                locations_affected = EXCLUDED.locations_affected,
                summary_data = EXCLUDED.summary_data
            "#,
        )
        .bind(&summary.disease_type)
        .bind(summary.date)
        .bind(summary.total_tests)
        .bind(summary.positive_cases)
        .bind(summary.negative_cases)
        .bind(summary.unique_locations)
        .bind(summary_data)
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }

    async fn insert_hotspot_record(&self, record: &HotspotRecord) -> Result<()> {
        let analysis_data = json!({ "cases": serde_json::to_value(&record.case_ids)? });
        let mut conn = self.connect().await?;
        sqlx::query(
            r#"
            INSERT INTO surveillance.hotspot_analysis
            (disease_type, analysis_date, location, latitude, longitude, case_count, risk_level, radius_km, analysis_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.disease_type)
        .bind(record.analysis_date)
        .bind(&record.location)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.case_count)
        .bind(record.risk_level.as_str())
        .bind(record.radius_km)
        .bind(analysis_data)
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }

    async fn insert_outbreak_alert(&self, signal: &OutbreakSignal) -> Result<()> {
        let mut conn = self.connect().await?;
        sqlx::query(
            r#"
            INSERT INTO surveillance.outbreak_alerts
            (disease_type, alert_date, recent_cases, historical_avg, increase_factor, alert_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&signal.disease_type)
        .bind(signal.analysis_date)
        .bind(signal.recent_cases)
        .bind(signal.historical_avg)
        .bind(signal.increase_factor)
        .bind(signal.alert_message())
        .execute(&mut conn)
        .await?;
        conn.close().await?;
        Ok(())
    }
}
