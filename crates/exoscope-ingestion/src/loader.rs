//! Bulk candidate import.
//!
//! Every row is mapped and validated on its own without touching the store.
//! The rows that pass are then inserted in a single transaction, and the
//! report lists each rejected row with its offending fields.

use std::collections::HashMap;
use std::path::Path;

use exoscope_common::config::ImportConfig;
use exoscope_common::{Classification, FieldErrors, ParameterField, ParameterSet, RawParameters};
use exoscope_db::{CandidateRepository, Dataset, NewCandidate};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::columns::{index_cells, ColumnAliases, Target};
use crate::error::{ImportError, ImportRowError, Result};
use crate::reader::{read_rows, FileFormat, RowResult, SourceRow};

/// Value used when an optional numeric column is absent or blank.
fn default_for(field: ParameterField) -> Option<&'static str> {
    match field {
        ParameterField::StellarMass => Some("1.0"),
        ParameterField::TransitDepth
        | ParameterField::ImpactParameter
        | ParameterField::EquilibriumTemperature => Some("0.0"),
        _ => None,
    }
}

/// Outcome of one import. Partial success is normal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub dataset_id: i64,
    pub dataset_name: String,
    /// Data rows read from the file, blank rows excluded.
    pub total_rows: usize,
    pub imported: usize,
    pub errors: Vec<ImportRowError>,
}

impl ImportReport {
    pub fn rejected(&self) -> usize {
        self.errors.len()
    }
}

/// Map one decoded row to a candidate of `dataset`, collecting every
/// offending field.
pub fn map_row(
    dataset: &Dataset,
    row: &SourceRow,
    aliases: &ColumnAliases,
) -> std::result::Result<NewCandidate, FieldErrors> {
    let cells = index_cells(&row.fields);

    let mut raw = RawParameters::default();
    for field in ParameterField::ALL {
        if let Some(value) = aliases.lookup(Target::Param(field), &cells).or_else(|| default_for(field)) {
            raw.set(field, value);
        }
    }
    let params = ParameterSet::validate(&raw)?;

    let name = match aliases.lookup(Target::Name, &cells) {
        Some(name) => name.to_string(),
        None => format!("{} row {}", dataset.name, row.number),
    };
    let classification = aliases
        .lookup(Target::Classification, &cells)
        .map(Classification::from_disposition)
        .unwrap_or_default();

    let extra: Map<String, Value> = row
        .fields
        .iter()
        .filter(|(header, value)| !aliases.is_mapped(header) && !value.trim().is_empty())
        .map(|(header, value)| (header.trim().to_string(), Value::String(value.trim().to_string())))
        .collect();

    Ok(NewCandidate {
        dataset_id: dataset.id,
        name,
        koi_id: aliases.lookup(Target::KoiId, &cells).map(str::to_string),
        tess_id: aliases.lookup(Target::TessId, &cells).map(str::to_string),
        params,
        classification,
        additional_data: Value::Object(extra),
    })
}

/// Loads spreadsheets into a dataset.
#[derive(Clone)]
pub struct BulkLoader {
    candidates: CandidateRepository,
    aliases: ColumnAliases,
    max_bytes: usize,
}

impl BulkLoader {
    pub fn new(candidates: CandidateRepository, aliases: ColumnAliases, max_bytes: usize) -> Self {
        Self { candidates, aliases, max_bytes }
    }

    pub fn from_config(candidates: CandidateRepository, config: &ImportConfig) -> Result<Self> {
        let aliases = ColumnAliases::with_extra(&config.aliases)?;
        Ok(Self::new(candidates, aliases, config.max_upload_bytes))
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Validate decoded rows. Returns the candidates to insert and the
    /// rejected rows. With a `limit`, stops once that many rows are accepted.
    pub fn prepare(
        &self,
        dataset: &Dataset,
        rows: Vec<RowResult>,
        limit: Option<usize>,
    ) -> (Vec<NewCandidate>, Vec<ImportRowError>, usize) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = 0;

        for row in rows {
            if limit.is_some_and(|max| accepted.len() >= max) {
                break;
            }
            seen += 1;
            match row.and_then(|row| {
                map_row(dataset, &row, &self.aliases).map_err(|e| ImportRowError::new(row.number, e))
            }) {
                Ok(candidate) => accepted.push(candidate),
                Err(e) => rejected.push(e),
            }
        }
        (accepted, rejected, seen)
    }

    /// Check and decode an uploaded file, picking the format from
    /// `filename`. Nothing is stored.
    pub fn decode(&self, filename: &str, bytes: &[u8]) -> Result<Vec<RowResult>> {
        let format = FileFormat::from_filename(filename)?;
        if bytes.len() > self.max_bytes {
            return Err(ImportError::TooLarge { size: bytes.len(), max: self.max_bytes });
        }
        let rows = read_rows(format, bytes)?;
        if rows.is_empty() {
            return Err(ImportError::Empty);
        }
        Ok(rows)
    }

    /// Validate decoded rows and insert the valid ones in one transaction.
    #[instrument(skip(self, dataset, rows), fields(dataset = %dataset.name, rows = rows.len()))]
    pub async fn import_rows(
        &self,
        dataset: &Dataset,
        rows: Vec<RowResult>,
        limit: Option<usize>,
    ) -> Result<ImportReport> {
        let (accepted, errors, total_rows) = self.prepare(dataset, rows, limit);
        for e in &errors {
            warn!(row = e.row, errors = %e.errors, "Row rejected");
        }

        let ids = self.candidates.insert_batch(&accepted).await?;
        info!(imported = ids.len(), rejected = errors.len(), "Import finished");

        Ok(ImportReport {
            dataset_id: dataset.id,
            dataset_name: dataset.name.clone(),
            total_rows,
            imported: ids.len(),
            errors,
        })
    }

    /// Decode and import an uploaded file.
    pub async fn import_bytes(
        &self,
        dataset: &Dataset,
        filename: &str,
        bytes: &[u8],
        limit: Option<usize>,
    ) -> Result<ImportReport> {
        let rows = self.decode(filename, bytes)?;
        self.import_rows(dataset, rows, limit).await
    }

    /// Import a file from disk.
    pub async fn import_file(&self, dataset: &Dataset, path: &Path, limit: Option<usize>) -> Result<ImportReport> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ImportError::Unreadable(format!("{}: {e}", path.display())))?;
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.import_bytes(dataset, filename, &bytes, limit).await
    }
}

/// Rejected-row counts per field, for summarising large reports.
pub fn errors_by_field(errors: &[ImportRowError]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for e in errors {
        for field in e.errors.fields() {
            *counts.entry(field.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use exoscope_common::Mission;
    use exoscope_db::{Database, DatasetRepository, NewDataset};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;

    const HEADER: &str = "kepoi_name,koi_disposition,koi_period,koi_duration,koi_prad,koi_srad,koi_smass,koi_steff,koi_depth,koi_impact,koi_teq,koi_score";

    fn valid_line(i: usize) -> String {
        format!("K{i:05}.01,CONFIRMED,{}.5,2.9,2.26,0.93,0.91,5455,615.8,0.146,793,0.97", i + 1)
    }

    async fn setup() -> (BulkLoader, CandidateRepository, Dataset) {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let dataset = DatasetRepository::new(db.clone())
            .insert(&NewDataset::new("Kepler Confirmed Planets", Mission::Kepler))
            .await
            .unwrap();
        let candidates = CandidateRepository::new(db);
        let loader = BulkLoader::new(candidates.clone(), ColumnAliases::default(), 10 * 1024 * 1024);
        (loader, candidates, dataset)
    }

    fn dataset() -> Dataset {
        Dataset {
            id: 7,
            name: "TESS Objects of Interest".into(),
            mission: Mission::Tess,
            description: String::new(),
            source_url: None,
            is_active: true,
            created_at: chrono::Utc::now(),
        }
    }

    fn source_row(number: usize, pairs: &[(&str, &str)]) -> SourceRow {
        SourceRow { number, fields: pairs.iter().map(|(h, v)| (h.to_string(), v.to_string())).collect() }
    }

    #[tokio::test]
    async fn test_partial_success() {
        let (loader, candidates, dataset) = setup().await;

        let mut lines = vec![HEADER.to_string()];
        lines.extend((0..5).map(valid_line));
        // Negative period, then a missing stellar radius.
        lines.push("K09998.01,CANDIDATE,-1,2.9,2.26,0.93,0.91,5455,615.8,0.146,793,0.5".to_string());
        lines.extend((5..10).map(valid_line));
        lines.push("K09999.01,CANDIDATE,3.1,2.9,2.26,,0.91,5455,615.8,0.146,793,0.5".to_string());
        let csv = lines.join("\n");

        let report = loader.import_bytes(&dataset, "kepler.csv", csv.as_bytes(), None).await.unwrap();
        assert_eq!(report.total_rows, 12);
        assert_eq!(report.imported, 10);
        assert_eq!(report.rejected(), 2);
        assert_eq!(report.errors[0].row, 6);
        assert!(report.errors[0].errors.contains("orbital_period"));
        assert_eq!(report.errors[1].row, 12);
        assert!(report.errors[1].errors.contains("stellar_radius"));
        assert_eq!(candidates.count_by_dataset(dataset.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_limit_counts_accepted_rows() {
        let (loader, candidates, dataset) = setup().await;
        let mut lines = vec![HEADER.to_string()];
        lines.extend((0..8).map(valid_line));

        let report = loader.import_bytes(&dataset, "k.csv", lines.join("\n").as_bytes(), Some(3)).await.unwrap();
        assert_eq!(report.imported, 3);
        assert_eq!(candidates.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rejects_large_and_unsupported_files() {
        let (_, candidates, dataset) = setup().await;
        let loader = BulkLoader::new(candidates.clone(), ColumnAliases::default(), 16);

        let err = loader.import_bytes(&dataset, "k.csv", &[b'a'; 17], None).await.unwrap_err();
        assert!(matches!(err, ImportError::TooLarge { size: 17, max: 16 }));
        let err = loader.import_bytes(&dataset, "k.txt", b"a", None).await.unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
        assert!(matches!(
            loader.import_bytes(&dataset, "k.csv", b"name\n", None).await,
            Err(ImportError::Empty)
        ));
        assert_eq!(candidates.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_jsonl_file_from_disk() {
        let (loader, candidates, dataset) = setup().await;
        let mut file = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"name": "TOI-700 d", "tfopwg_disp": "KP", "pl_orbper": 37.42, "pl_trandurh": 3.2, "pl_rade": 1.07, "st_rad": 0.42, "st_teff": 3480}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"name": "broken""#).unwrap();

        let report = loader.import_file(&dataset, file.path(), None).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors[0].row, 2);

        let page = candidates.list_by_dataset(dataset.id, 10).await.unwrap();
        assert_eq!(page[0].classification, Classification::Confirmed);
        assert_eq!(page[0].params.stellar_mass, 1.0);
    }

    #[tokio::test]
    async fn test_import_xlsx_upload() {
        let (loader, candidates, dataset) = setup().await;
        let bytes = crate::reader::tests::koi_workbook();

        let report = loader.import_bytes(&dataset, "cumulative.xlsx", &bytes, None).await.unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.imported, 2);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.errors[0].row, 4);
        assert!(report.errors[0].errors.contains("planetary_radius"));

        let stored = candidates.list_by_dataset(dataset.id, 10).await.unwrap();
        let sparse = stored.iter().find(|c| c.name == "K00753.01").unwrap();
        assert_eq!(sparse.classification, Classification::Candidate);
        assert_eq!(sparse.params.orbital_period, 112.305);
        assert_eq!(sparse.params.stellar_effective_temperature, 5853.0);
        assert_eq!(sparse.params.stellar_mass, 1.0);
        assert_eq!(sparse.params.transit_depth, 0.0);
        assert_eq!(sparse.params.equilibrium_temperature, 0.0);
    }

    #[test]
    fn test_map_row_defaults_and_extras() {
        let row = source_row(
            4,
            &[
                ("pl_orbper", "5.1"),
                ("pl_trandurh", "1.5"),
                ("pl_rade", "2.0"),
                ("st_rad", "0.8"),
                ("st_teff", "5100"),
                ("toi", "1234.01"),
                ("tfopwg_disp", "PC"),
                ("ra", "118.2"),
                ("notes", ""),
            ],
        );
        let candidate = map_row(&dataset(), &row, &ColumnAliases::default()).unwrap();

        assert_eq!(candidate.name, "TESS Objects of Interest row 4");
        assert_eq!(candidate.tess_id.as_deref(), Some("1234.01"));
        assert_eq!(candidate.koi_id, None);
        assert_eq!(candidate.classification, Classification::Candidate);
        assert_eq!(candidate.params.stellar_mass, 1.0);
        assert_eq!(candidate.params.transit_depth, 0.0);
        assert_eq!(candidate.params.impact_parameter, 0.0);
        assert_eq!(candidate.params.equilibrium_temperature, 0.0);
        assert_eq!(candidate.additional_data, serde_json::json!({"ra": "118.2"}));
    }

    #[test]
    fn test_map_row_reports_every_field() {
        let row = source_row(1, &[("koi_period", "abc"), ("koi_impact", "3")]);
        let errors = map_row(&dataset(), &row, &ColumnAliases::default()).unwrap_err();
        for field in ["orbital_period", "transit_duration", "planetary_radius", "stellar_radius", "impact_parameter"] {
            assert!(errors.contains(field), "missing {field}");
        }
        assert!(!errors.contains("stellar_mass"));
    }

    #[test]
    fn test_unknown_disposition() {
        let row = source_row(
            1,
            &[
                ("koi_period", "1"),
                ("koi_duration", "1"),
                ("koi_prad", "1"),
                ("koi_srad", "1"),
                ("koi_steff", "5000"),
                ("koi_disposition", "NOT DISPOSITIONED"),
            ],
        );
        let candidate = map_row(&dataset(), &row, &ColumnAliases::default()).unwrap();
        assert_eq!(candidate.classification, Classification::Unknown);
    }

    #[test]
    fn test_errors_by_field() {
        let mut a = FieldErrors::new();
        a.add("orbital_period", "must be greater than 0");
        let mut b = FieldErrors::new();
        b.add("orbital_period", "must be a number");
        b.add("stellar_radius", "this field is required");
        let counts = errors_by_field(&[ImportRowError::new(1, a), ImportRowError::new(2, b)]);
        assert_eq!(counts["orbital_period"], 2);
        assert_eq!(counts["stellar_radius"], 1);
    }
}
