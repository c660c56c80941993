//! Dashboard aggregation.
//!
//! Everything is recomputed on every call. Candidate statistics come from a
//! single SELECT so the overall total always equals the sum of the
//! per-dataset totals, even while imports are running.

use std::collections::BTreeMap;
use std::sync::Arc;

use exoscope_common::{Classification, Mission};
use serde::Serialize;
use tracing::instrument;

use crate::candidates::Visibility;
use crate::database::Database;
use crate::error::Result;

/// Upper edges of the orbital period bins, in days (log-spaced).
const PERIOD_EDGES: [f64; 4] = [1.0, 10.0, 100.0, 1000.0];

/// Upper edges of the planetary radius bins, in Earth radii.
const RADIUS_EDGES: [f64; 4] = [1.25, 2.0, 6.0, 15.0];
const RADIUS_LABELS: [&str; 5] = ["Earth-size", "Super-Earth", "Neptune-size", "Jupiter-size", "Larger"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationCount {
    pub classification: Classification,
    pub label: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetBreakdown {
    pub id: i64,
    pub name: String,
    pub mission: Mission,
    pub total: u64,
    pub confirmed: u64,
    pub candidate: u64,
    pub false_positive: u64,
    pub unknown: u64,
    /// Share of confirmed candidates, 0–100, one decimal.
    pub confirmed_percentage: f64,
}

impl DatasetBreakdown {
    fn add(&mut self, classification: Classification) {
        self.total += 1;
        match classification {
            Classification::Confirmed     => self.confirmed += 1,
            Classification::Candidate     => self.candidate += 1,
            Classification::FalsePositive => self.false_positive += 1,
            Classification::Unknown       => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissionCount {
    pub mission: Mission,
    pub datasets: u64,
    pub candidates: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub label: String,
    /// Inclusive lower edge; `None` is unbounded.
    pub lower: Option<f64>,
    /// Exclusive upper edge; `None` is unbounded.
    pub upper: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub total: u64,
    pub by_label: Vec<ClassificationCount>,
}

/// Aggregated view of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub total_candidates: u64,
    pub total_datasets: u64,
    pub by_classification: Vec<ClassificationCount>,
    pub by_dataset: Vec<DatasetBreakdown>,
    pub by_mission: Vec<MissionCount>,
    pub predictions: PredictionSummary,
    pub orbital_period_histogram: Vec<HistogramBin>,
    pub planetary_radius_histogram: Vec<HistogramBin>,
}

impl Dashboard {
    pub fn classification_count(&self, classification: Classification) -> u64 {
        self.by_classification
            .iter()
            .find(|c| c.classification == classification)
            .map_or(0, |c| c.count)
    }
}

/// Computes [`Dashboard`]s from the store.
#[derive(Clone)]
pub struct DashboardAggregator {
    db: Arc<Database>,
}

impl DashboardAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn compute(&self, visibility: Visibility) -> Result<Dashboard> {
        let conn = self.db.conn().await;

        let sql = match visibility {
            Visibility::Public => {
                "SELECT d.id, d.name, d.mission, c.classification, c.orbital_period, c.planetary_radius
                 FROM datasets d LEFT JOIN candidates c ON c.dataset_id = d.id
                 WHERE d.is_active = 1 ORDER BY d.name, d.id"
            }
            Visibility::All => {
                "SELECT d.id, d.name, d.mission, c.classification, c.orbital_period, c.planetary_radius
                 FROM datasets d LEFT JOIN candidates c ON c.dataset_id = d.id
                 ORDER BY d.name, d.id"
            }
        };

        let mut datasets: Vec<DatasetBreakdown> = Vec::new();
        let mut by_class: BTreeMap<Classification, u64> = BTreeMap::new();
        let mut periods = vec![0u64; PERIOD_EDGES.len() + 1];
        let mut radii = vec![0u64; RADIUS_EDGES.len() + 1];

        let mut rows = conn.query(sql, ()).await?;
        while let Some(row) = rows.next().await? {
            let id = row.get::<i64>(0)?;
            if datasets.last().map(|d| d.id) != Some(id) {
                datasets.push(DatasetBreakdown {
                    id,
                    name: row.get::<String>(1)?,
                    mission: Mission::from_db(&row.get::<String>(2)?),
                    total: 0,
                    confirmed: 0,
                    candidate: 0,
                    false_positive: 0,
                    unknown: 0,
                    confirmed_percentage: 0.0,
                });
            }
            // NULL classification: a dataset without candidates.
            let Some(label) = row.get::<Option<String>>(3)? else {
                continue;
            };
            let classification = Classification::from_db(&label);
            if let Some(current) = datasets.last_mut() {
                current.add(classification);
            }
            *by_class.entry(classification).or_default() += 1;
            periods[bin_index(&PERIOD_EDGES, row.get::<f64>(4)?)] += 1;
            radii[bin_index(&RADIUS_EDGES, row.get::<f64>(5)?)] += 1;
        }

        let mut predictions_by_label: BTreeMap<Classification, u64> = BTreeMap::new();
        let mut rows = conn
            .query("SELECT prediction, COUNT(*) FROM prediction_requests GROUP BY prediction", ())
            .await?;
        while let Some(row) = rows.next().await? {
            let label = Classification::from_db(&row.get::<String>(0)?);
            *predictions_by_label.entry(label).or_default() += row.get::<i64>(1)? as u64;
        }
        drop(conn);

        for d in &mut datasets {
            d.confirmed_percentage = percentage(d.confirmed, d.total);
        }

        let by_mission = Mission::ALL
            .into_iter()
            .map(|mission| {
                let of_mission: Vec<&DatasetBreakdown> =
                    datasets.iter().filter(|d| d.mission == mission).collect();
                MissionCount {
                    mission,
                    datasets: of_mission.len() as u64,
                    candidates: of_mission.iter().map(|d| d.total).sum(),
                }
            })
            .collect();

        Ok(Dashboard {
            total_candidates: datasets.iter().map(|d| d.total).sum(),
            total_datasets: datasets.len() as u64,
            by_classification: counts(&by_class),
            by_dataset: datasets,
            by_mission,
            predictions: PredictionSummary {
                total: predictions_by_label.values().sum(),
                by_label: counts(&predictions_by_label),
            },
            orbital_period_histogram: histogram(&PERIOD_EDGES, &periods, period_label),
            planetary_radius_histogram: histogram(&RADIUS_EDGES, &radii, |i, _, _| RADIUS_LABELS[i].to_string()),
        })
    }
}

/// Index of the bin `value` falls in, given ascending exclusive upper edges.
fn bin_index(edges: &[f64], value: f64) -> usize {
    edges.iter().position(|edge| value < *edge).unwrap_or(edges.len())
}

fn histogram(
    edges: &[f64],
    counts: &[u64],
    label: impl Fn(usize, Option<f64>, Option<f64>) -> String,
) -> Vec<HistogramBin> {
    (0..counts.len())
        .map(|i| {
            let lower = if i == 0 { None } else { Some(edges[i - 1]) };
            let upper = edges.get(i).copied();
            HistogramBin { label: label(i, lower, upper), lower, upper, count: counts[i] }
        })
        .collect()
}

fn period_label(_: usize, lower: Option<f64>, upper: Option<f64>) -> String {
    match (lower, upper) {
        (None, Some(hi)) => format!("< {hi} d"),
        (Some(lo), Some(hi)) => format!("{lo}–{hi} d"),
        (Some(lo), None) => format!("≥ {lo} d"),
        (None, None) => "all".to_string(),
    }
}

fn counts(map: &BTreeMap<Classification, u64>) -> Vec<ClassificationCount> {
    Classification::ALL
        .into_iter()
        .map(|classification| ClassificationCount {
            classification,
            label: classification.display_name(),
            count: map.get(&classification).copied().unwrap_or(0),
        })
        .collect()
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 * 1000.0 / whole as f64).round() / 10.0
    }
}
