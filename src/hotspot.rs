use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::{DEFAULT_MIN_CASES, DEFAULT_RADIUS_KM};
use crate::error::Result;
use crate::geo::haversine_km;
use crate::models::{
    CaseRecord, Coordinates, DateRange, Hotspot, HotspotMember, HotspotRecord, RiskTier,
    TestResult,
};
use crate::repository::CaseRepository;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotspotParams {
    pub radius_km: f64,
    pub min_cases: usize,
}

impl Default for HotspotParams {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            min_cases: DEFAULT_MIN_CASES,
        }
    }
}

/// Groups positions into clusters.
///
/// Returns each accepted cluster as indices into `points`, seed first, in the
/// order clusters were discovered. No index may appear in two clusters and
/// every cluster must hold at least `min_cases` members.
pub trait ClusterStrategy {
    fn cluster(&self, points: &[Coordinates], radius_km: f64, min_cases: usize) -> Vec<Vec<usize>>;
}

/// Greedy single-link clustering anchored on a seed.
///
/// Each unassigned point in input order seeds a candidate; every other
/// unassigned point within `radius_km` of the seed (not of other members)
/// joins it. Candidates below `min_cases` are dropped and their points stay
/// free for later seeds. O(n²) and sensitive to input order.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeedLinkage;

impl ClusterStrategy for SeedLinkage {
    fn cluster(&self, points: &[Coordinates], radius_km: f64, min_cases: usize) -> Vec<Vec<usize>> {
        let mut used = vec![false; points.len()];
        let mut clusters = Vec::new();

        for seed in 0..points.len() {
            if used[seed] {
                continue;
            }

            let mut members = vec![seed];
            for other in 0..points.len() {
                if other == seed || used[other] {
                    continue;
                }
                if haversine_km(Some(points[seed]), Some(points[other])) <= radius_km {
                    members.push(other);
                }
            }

            if members.len() >= min_cases {
                for &member in &members {
                    used[member] = true;
                }
                clusters.push(members);
            }
        }

        clusters
    }
}

/// Fetches positive cases in range and clusters them. Nothing is stored; see
/// [`persist_hotspots`].
pub async fn detect_hotspots<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    range: DateRange,
    params: HotspotParams,
) -> Result<Vec<Hotspot>> {
    let cases = repo
        .query_cases(disease_type, Some(TestResult::Positive), Some(range))
        .await?;
    let hotspots = find_hotspots(&cases, params, &SeedLinkage);

    info!(
        disease = disease_type,
        %range,
        cases = cases.len(),
        hotspots = hotspots.len(),
        "Hotspot detection finished"
    );

    Ok(hotspots)
}

/// Clusters the positive, located cases of `cases`, largest cluster first.
pub fn find_hotspots<S: ClusterStrategy>(
    cases: &[CaseRecord],
    params: HotspotParams,
    strategy: &S,
) -> Vec<Hotspot> {
    let located: Vec<(&CaseRecord, Coordinates)> = cases
        .iter()
        .filter(|case| case.test_result == TestResult::Positive)
        .filter_map(|case| case.coordinates.map(|coordinates| (case, coordinates)))
        .collect();

    if located.len() < params.min_cases {
        debug!(
            eligible = located.len(),
            min_cases = params.min_cases,
            "Too few located positive cases to cluster"
        );
        return Vec::new();
    }

    let points: Vec<Coordinates> = located.iter().map(|(_, coordinates)| *coordinates).collect();
    let mut hotspots: Vec<Hotspot> = strategy
        .cluster(&points, params.radius_km, params.min_cases)
        .into_iter()
        .map(|members| build_hotspot(&located, &members, params.radius_km))
        .collect();

    hotspots.sort_by(|a, b| b.case_count.cmp(&a.case_count));
    hotspots
}

fn build_hotspot(
    located: &[(&CaseRecord, Coordinates)],
    members: &[usize],
    radius_km: f64,
) -> Hotspot {
    let count = members.len() as f64;
    let latitude = members.iter().map(|&i| located[i].1.latitude).sum::<f64>() / count;
    let longitude = members.iter().map(|&i| located[i].1.longitude).sum::<f64>() / count;
    let seed = located[members[0]].0;

    let cases = members
        .iter()
        .map(|&i| {
            let (case, coordinates) = located[i];
            HotspotMember {
                case_id: case.id,
                test_date: case.test_date,
                address: case.address.clone(),
                hospital_name: case.hospital_name.clone(),
                latitude: coordinates.latitude,
                longitude: coordinates.longitude,
            }
        })
        .collect();

    Hotspot {
        location: seed
            .address
            .clone()
            .unwrap_or_else(|| "Unknown location".to_string()),
        latitude,
        longitude,
        case_count: members.len(),
        risk_level: RiskTier::for_size(members.len()),
        radius_km,
        seed_case_id: seed.id,
        cases,
    }
}

/// Writes one audit row per hotspot. The rows are never read back as input.
pub async fn persist_hotspots<R: CaseRepository>(
    repo: &R,
    disease_type: &str,
    analysis_date: NaiveDate,
    hotspots: &[Hotspot],
) -> Result<usize> {
    for hotspot in hotspots {
        let record = HotspotRecord {
            disease_type: disease_type.to_string(),
            analysis_date,
            location: hotspot.location.clone(),
            latitude: hotspot.latitude,
            longitude: hotspot.longitude,
            case_count: hotspot.case_count as i32,
            risk_level: hotspot.risk_level,
            radius_km: hotspot.radius_km,
            case_ids: hotspot.case_ids(),
        };
        repo.insert_hotspot_record(&record).await?;
    }

    debug!(count = hotspots.len(), "Hotspot audit rows written");
    Ok(hotspots.len())
}
