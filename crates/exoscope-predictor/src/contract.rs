//! Versioned wire contracts for the external predictor.
//!
//! A contract decides what JSON body is POSTed for a parameter set and how
//! the answer is turned into a [`Verdict`].

use exoscope_common::{Classification, ContractVersion, ParameterField, ParameterSet};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{PredictorError, Result};

/// Classification returned by the predictor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: Classification,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Per-class probabilities, when the predictor reports them.
    pub details: Option<Value>,
}

/// Request/response shape spoken by one predictor API version.
pub trait PredictionContract: Send + Sync {
    fn version(&self) -> ContractVersion;

    /// Body to POST for `params`.
    fn encode(&self, params: &ParameterSet) -> Value;

    /// Interpret a successful response body.
    fn decode(&self, body: &Value) -> Result<Verdict>;
}

/// Contract implementation for a configured version.
pub fn for_version(version: ContractVersion) -> Box<dyn PredictionContract> {
    match version {
        ContractVersion::V1  => Box::new(V1Contract),
        ContractVersion::Koi => Box::new(KoiContract),
    }
}

fn malformed(msg: impl Into<String>) -> PredictorError {
    PredictorError::Malformed(msg.into())
}

fn probability(value: Option<&Value>, key: &str) -> Result<f64> {
    let v = value
        .ok_or_else(|| malformed(format!("missing `{key}`")))?
        .as_f64()
        .ok_or_else(|| malformed(format!("`{key}` is not a number")))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(malformed(format!("`{key}` {v} is outside [0, 1]")));
    }
    Ok(v)
}

// ── v1 ────────────────────────────────────────────────────────────────────────

/// App field names in; `{"label", "confidence", "details"?}` out.
///
/// `"prediction"` is accepted in place of `"label"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct V1Contract;

impl PredictionContract for V1Contract {
    fn version(&self) -> ContractVersion {
        ContractVersion::V1
    }

    fn encode(&self, params: &ParameterSet) -> Value {
        let mut body = Map::new();
        for field in ParameterField::ALL {
            body.insert(field.as_str().to_string(), json!(params.get(field)));
        }
        Value::Object(body)
    }

    fn decode(&self, body: &Value) -> Result<Verdict> {
        let obj = body.as_object().ok_or_else(|| malformed("expected a JSON object"))?;

        let text = obj
            .get("label")
            .or_else(|| obj.get("prediction"))
            .ok_or_else(|| malformed("missing `label`"))?
            .as_str()
            .ok_or_else(|| malformed("`label` is not a string"))?;
        let label = Classification::from_label(text)
            .ok_or_else(|| malformed(format!("unrecognised label {text:?}")))?;

        let confidence = probability(obj.get("confidence"), "confidence")?;

        let details = match obj.get("details") {
            None | Some(Value::Null) => None,
            Some(d @ Value::Object(_)) => Some(d.clone()),
            Some(_) => return Err(malformed("`details` is not an object")),
        };

        Ok(Verdict { label, confidence, details })
    }
}

// ── koi ───────────────────────────────────────────────────────────────────────

/// Kepler cumulative-table column for each parameter the binary KOI model
/// consumes. Stellar mass is not a model input.
const KOI_COLUMNS: [(ParameterField, &str); 8] = [
    (ParameterField::OrbitalPeriod, "koi_period"),
    (ParameterField::TransitDuration, "koi_duration"),
    (ParameterField::TransitDepth, "koi_depth"),
    (ParameterField::StellarEffectiveTemperature, "koi_steff"),
    (ParameterField::PlanetaryRadius, "koi_prad"),
    (ParameterField::StellarRadius, "koi_srad"),
    (ParameterField::EquilibriumTemperature, "koi_teq"),
    (ParameterField::ImpactParameter, "koi_impact"),
];

/// `koi_*` names in; binary `{"label": 0|1, "probability": p}` out, where
/// `p` is the probability of a planet.
#[derive(Debug, Clone, Copy, Default)]
pub struct KoiContract;

impl PredictionContract for KoiContract {
    fn version(&self) -> ContractVersion {
        ContractVersion::Koi
    }

    fn encode(&self, params: &ParameterSet) -> Value {
        let mut body = Map::new();
        for (field, column) in KOI_COLUMNS {
            body.insert(column.to_string(), json!(params.get(field)));
        }
        Value::Object(body)
    }

    fn decode(&self, body: &Value) -> Result<Verdict> {
        let obj = body.as_object().ok_or_else(|| malformed("expected a JSON object"))?;

        let is_planet = match obj.get("label") {
            Some(Value::Number(n)) if n.as_i64() == Some(1) => true,
            Some(Value::Number(n)) if n.as_i64() == Some(0) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s.trim() == "1" => true,
            Some(Value::String(s)) if s.trim() == "0" => false,
            Some(other) => return Err(malformed(format!("unrecognised label {other}"))),
            None => return Err(malformed("missing `label`")),
        };
        let p = probability(obj.get("probability"), "probability")?;

        let (label, confidence) = if is_planet {
            (Classification::Confirmed, p)
        } else {
            (Classification::FalsePositive, 1.0 - p)
        };
        let details = json!({
            "probability_confirmed": p,
            "probability_candidate": 0.0,
            "probability_false_positive": 1.0 - p,
        });

        Ok(Verdict { label, confidence, details: Some(details) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn params() -> ParameterSet {
        ParameterSet {
            orbital_period: 112.305,
            transit_duration: 5.2,
            planetary_radius: 1.34,
            stellar_radius: 0.6,
            stellar_mass: 0.61,
            stellar_effective_temperature: 4402.0,
            transit_depth: 0.0001,
            impact_parameter: 0.3,
            equilibrium_temperature: 233.0,
        }
    }

    #[test]
    fn test_v1_encode_uses_app_names() {
        let body = V1Contract.encode(&params());
        assert_eq!(body["orbital_period"], json!(112.305));
        assert_eq!(body["stellar_mass"], json!(0.61));
        assert_eq!(body.as_object().unwrap().len(), 9);
    }

    #[rstest]
    #[case(json!({"label": "confirmed", "confidence": 0.92}), Classification::Confirmed)]
    #[case(json!({"prediction": "False Positive", "confidence": 0.5}), Classification::FalsePositive)]
    #[case(json!({"label": "CANDIDATE", "confidence": 1}), Classification::Candidate)]
    fn test_v1_decode(#[case] body: Value, #[case] expected: Classification) {
        assert_eq!(V1Contract.decode(&body).unwrap().label, expected);
    }

    #[rstest]
    #[case(json!({"label": "planet", "confidence": 0.9}))]
    #[case(json!({"label": "confirmed", "confidence": 1.2}))]
    #[case(json!({"label": "confirmed", "confidence": -0.1}))]
    #[case(json!({"label": "confirmed"}))]
    #[case(json!({"confidence": 0.9}))]
    #[case(json!({"label": 1, "confidence": 0.9}))]
    #[case(json!({"label": "confirmed", "confidence": 0.9, "details": [0.9]}))]
    #[case(json!(["confirmed", 0.9]))]
    fn test_v1_rejects_malformed(#[case] body: Value) {
        assert!(matches!(V1Contract.decode(&body), Err(PredictorError::Malformed(_))));
    }

    #[test]
    fn test_v1_keeps_details() {
        let verdict = V1Contract
            .decode(&json!({
                "label": "candidate",
                "confidence": 0.61,
                "details": {"CONFIRMED": 0.2, "CANDIDATE": 0.61, "FALSE_POSITIVE": 0.19}
            }))
            .unwrap();
        assert_eq!(verdict.details.unwrap()["CANDIDATE"], json!(0.61));
    }

    #[test]
    fn test_koi_encode_maps_columns() {
        let body = KoiContract.encode(&params());
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        assert_eq!(body["koi_period"], json!(112.305));
        assert_eq!(body["koi_steff"], json!(4402.0));
        assert!(!obj.contains_key("stellar_mass"));
    }

    #[test]
    fn test_koi_decode_binary_verdict() {
        let planet = KoiContract.decode(&json!({"label": 1, "probability": 0.8})).unwrap();
        assert_eq!(planet.label, Classification::Confirmed);
        assert_eq!(planet.confidence, 0.8);

        let fp = KoiContract.decode(&json!({"label": 0, "probability": 0.25})).unwrap();
        assert_eq!(fp.label, Classification::FalsePositive);
        assert_eq!(fp.confidence, 0.75);
        assert_eq!(fp.details.unwrap()["probability_confirmed"], json!(0.25));

        assert!(KoiContract.decode(&json!({"label": 2, "probability": 0.5})).is_err());
        assert!(KoiContract.decode(&json!({"label": 1})).is_err());
    }

    #[test]
    fn test_for_version() {
        assert_eq!(for_version(ContractVersion::Koi).version(), ContractVersion::Koi);
        assert_eq!(for_version(ContractVersion::V1).version(), ContractVersion::V1);
    }
}
