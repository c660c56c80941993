//! Orbital/stellar parameter validation.
//!
//! Raw values arrive as text (HTML form fields, spreadsheet cells) or as JSON
//! scalars. [`ParameterSet::validate`] turns them into a normalized numeric
//! set or reports every offending field at once.

use serde::{Deserialize, Serialize};

use crate::error::FieldErrors;

/// Maximum length of a candidate name submitted with a prediction.
pub const MAX_NAME_LEN: usize = 100;

// ── Field table ───────────────────────────────────────────────────────────────

/// The nine numeric parameters describing a transiting candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterField {
    OrbitalPeriod,
    TransitDuration,
    PlanetaryRadius,
    StellarRadius,
    StellarMass,
    StellarEffectiveTemperature,
    TransitDepth,
    ImpactParameter,
    EquilibriumTemperature,
}

/// Acceptance rule for one field. Bounds are inclusive unless stated.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    /// x > 0, optionally x <= max
    Positive { max: Option<f64> },
    /// min <= x <= max
    Range { min: f64, max: f64 },
    /// x >= 0, optionally x <= max
    NonNegative { max: Option<f64> },
}

impl Rule {
    fn check(&self, value: f64) -> Result<(), String> {
        match *self {
            Rule::Positive { max } => {
                if value <= 0.0 {
                    return Err("must be greater than 0".to_string());
                }
                match max {
                    Some(max) if value > max => Err(format!("must be at most {max}")),
                    _ => Ok(()),
                }
            }
            Rule::Range { min, max } => {
                if value < min || value > max {
                    Err(format!("must be between {min} and {max}"))
                } else {
                    Ok(())
                }
            }
            Rule::NonNegative { max } => {
                if value < 0.0 {
                    return Err("must not be negative".to_string());
                }
                match max {
                    Some(max) if value > max => Err(format!("must be at most {max}")),
                    _ => Ok(()),
                }
            }
        }
    }
}

impl ParameterField {
    pub const ALL: [ParameterField; 9] = [
        ParameterField::OrbitalPeriod,
        ParameterField::TransitDuration,
        ParameterField::PlanetaryRadius,
        ParameterField::StellarRadius,
        ParameterField::StellarMass,
        ParameterField::StellarEffectiveTemperature,
        ParameterField::TransitDepth,
        ParameterField::ImpactParameter,
        ParameterField::EquilibriumTemperature,
    ];

    /// Field name used in forms, JSON bodies and DB columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterField::OrbitalPeriod               => "orbital_period",
            ParameterField::TransitDuration             => "transit_duration",
            ParameterField::PlanetaryRadius             => "planetary_radius",
            ParameterField::StellarRadius               => "stellar_radius",
            ParameterField::StellarMass                 => "stellar_mass",
            ParameterField::StellarEffectiveTemperature => "stellar_effective_temperature",
            ParameterField::TransitDepth                => "transit_depth",
            ParameterField::ImpactParameter             => "impact_parameter",
            ParameterField::EquilibriumTemperature      => "equilibrium_temperature",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ParameterField::OrbitalPeriod               => "Orbital period (days)",
            ParameterField::TransitDuration             => "Transit duration (hours)",
            ParameterField::PlanetaryRadius             => "Planetary radius (Earth radii)",
            ParameterField::StellarRadius               => "Stellar radius (solar radii)",
            ParameterField::StellarMass                 => "Stellar mass (solar masses)",
            ParameterField::StellarEffectiveTemperature => "Stellar effective temperature (K)",
            ParameterField::TransitDepth                => "Transit depth",
            ParameterField::ImpactParameter             => "Impact parameter",
            ParameterField::EquilibriumTemperature      => "Equilibrium temperature (K)",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    fn rule(&self) -> Rule {
        match self {
            ParameterField::OrbitalPeriod               => Rule::Positive { max: None },
            ParameterField::TransitDuration             => Rule::Positive { max: None },
            ParameterField::PlanetaryRadius             => Rule::Positive { max: None },
            ParameterField::StellarRadius               => Rule::Positive { max: Some(2000.0) },
            ParameterField::StellarMass                 => Rule::Positive { max: Some(300.0) },
            ParameterField::StellarEffectiveTemperature => Rule::Range { min: 500.0, max: 100_000.0 },
            ParameterField::TransitDepth                => Rule::NonNegative { max: None },
            ParameterField::ImpactParameter             => Rule::Range { min: 0.0, max: 1.0 },
            ParameterField::EquilibriumTemperature      => Rule::NonNegative { max: Some(10_000.0) },
        }
    }
}

// ── Raw input ─────────────────────────────────────────────────────────────────

/// Unvalidated field values exactly as submitted.
///
/// Deserializes straight from an urlencoded HTML form; every field is optional
/// so that missing values become validation errors instead of extractor
/// rejections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawParameters {
    pub name: Option<String>,
    pub orbital_period: Option<String>,
    pub transit_duration: Option<String>,
    pub planetary_radius: Option<String>,
    pub stellar_radius: Option<String>,
    pub stellar_mass: Option<String>,
    pub stellar_effective_temperature: Option<String>,
    pub transit_depth: Option<String>,
    pub impact_parameter: Option<String>,
    pub equilibrium_temperature: Option<String>,
}

impl RawParameters {
    pub fn get(&self, field: ParameterField) -> Option<&str> {
        let slot = match field {
            ParameterField::OrbitalPeriod               => &self.orbital_period,
            ParameterField::TransitDuration             => &self.transit_duration,
            ParameterField::PlanetaryRadius             => &self.planetary_radius,
            ParameterField::StellarRadius               => &self.stellar_radius,
            ParameterField::StellarMass                 => &self.stellar_mass,
            ParameterField::StellarEffectiveTemperature => &self.stellar_effective_temperature,
            ParameterField::TransitDepth                => &self.transit_depth,
            ParameterField::ImpactParameter             => &self.impact_parameter,
            ParameterField::EquilibriumTemperature      => &self.equilibrium_temperature,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, field: ParameterField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            ParameterField::OrbitalPeriod               => self.orbital_period = value,
            ParameterField::TransitDuration             => self.transit_duration = value,
            ParameterField::PlanetaryRadius             => self.planetary_radius = value,
            ParameterField::StellarRadius               => self.stellar_radius = value,
            ParameterField::StellarMass                 => self.stellar_mass = value,
            ParameterField::StellarEffectiveTemperature => self.stellar_effective_temperature = value,
            ParameterField::TransitDepth                => self.transit_depth = value,
            ParameterField::ImpactParameter             => self.impact_parameter = value,
            ParameterField::EquilibriumTemperature      => self.equilibrium_temperature = value,
        }
    }

    /// Build from a JSON object. Numbers keep their exact textual form so that
    /// parsing is lossless; strings are taken as-is; anything else is kept as
    /// its JSON text and will fail numeric parsing with a field error.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FieldErrors> {
        let Some(obj) = value.as_object() else {
            let mut errors = FieldErrors::new();
            errors.add("body", "expected a JSON object");
            return Err(errors);
        };

        let mut raw = RawParameters::default();
        if let Some(name) = obj.get("name") {
            raw.name = Some(json_scalar_text(name));
        }
        for field in ParameterField::ALL {
            match obj.get(field.as_str()) {
                None | Some(serde_json::Value::Null) => {}
                Some(v) => raw.set(field, json_scalar_text(v)),
            }
        }
        Ok(raw)
    }

    /// Build from a normalized set, e.g. to prefill an edit form.
    pub fn from_set(params: &ParameterSet) -> Self {
        let mut raw = RawParameters::default();
        for field in ParameterField::ALL {
            raw.set(field, params.get(field).to_string());
        }
        raw
    }
}

fn json_scalar_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Normalized output ─────────────────────────────────────────────────────────

/// A validated, normalized parameter set. Field names match the DB columns and
/// the `v1` predictor contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub orbital_period: f64,
    pub transit_duration: f64,
    pub planetary_radius: f64,
    pub stellar_radius: f64,
    pub stellar_mass: f64,
    pub stellar_effective_temperature: f64,
    pub transit_depth: f64,
    pub impact_parameter: f64,
    pub equilibrium_temperature: f64,
}

impl ParameterSet {
    pub fn get(&self, field: ParameterField) -> f64 {
        match field {
            ParameterField::OrbitalPeriod               => self.orbital_period,
            ParameterField::TransitDuration             => self.transit_duration,
            ParameterField::PlanetaryRadius             => self.planetary_radius,
            ParameterField::StellarRadius               => self.stellar_radius,
            ParameterField::StellarMass                 => self.stellar_mass,
            ParameterField::StellarEffectiveTemperature => self.stellar_effective_temperature,
            ParameterField::TransitDepth                => self.transit_depth,
            ParameterField::ImpactParameter             => self.impact_parameter,
            ParameterField::EquilibriumTemperature      => self.equilibrium_temperature,
        }
    }

    /// Validate every numeric field of `raw`, collecting all failures.
    pub fn validate(raw: &RawParameters) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut values = [0.0_f64; 9];

        for (i, field) in ParameterField::ALL.into_iter().enumerate() {
            match check_field(field, raw.get(field)) {
                Ok(v) => values[i] = v,
                Err(msg) => errors.add(field.as_str(), msg),
            }
        }

        errors.into_result(Self {
            orbital_period: values[0],
            transit_duration: values[1],
            planetary_radius: values[2],
            stellar_radius: values[3],
            stellar_mass: values[4],
            stellar_effective_temperature: values[5],
            transit_depth: values[6],
            impact_parameter: values[7],
            equilibrium_temperature: values[8],
        })
    }

    /// Re-check an already numeric set against the same rules, e.g. values
    /// loaded from an admin edit.
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        for field in ParameterField::ALL {
            let v = self.get(field);
            if !v.is_finite() {
                errors.add(field.as_str(), "must be a finite number");
            } else if let Err(msg) = field.rule().check(v) {
                errors.add(field.as_str(), msg);
            }
        }
        errors.into_result(())
    }
}

/// Parse a user-typed decimal number.
///
/// Leading/trailing whitespace is ignored and a single decimal comma is
/// accepted (`"1,5"` → 1.5). Returns `None` for empty input.
pub fn parse_decimal(text: &str) -> Option<Result<f64, String>> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let normalized;
    let candidate = if !t.contains('.') && t.matches(',').count() == 1 {
        normalized = t.replace(',', ".");
        normalized.as_str()
    } else {
        t
    };
    Some(match candidate.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err("must be a finite number".to_string()),
        Err(_) => Err("must be a number".to_string()),
    })
}

fn check_field(field: ParameterField, raw: Option<&str>) -> Result<f64, String> {
    let value = match raw.and_then(parse_decimal) {
        None => return Err("this field is required".to_string()),
        Some(parsed) => parsed?,
    };
    field.rule().check(value)?;
    Ok(value)
}

// ── Form submission ───────────────────────────────────────────────────────────

/// A validated prediction submission: the candidate name and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub name: String,
    pub params: ParameterSet,
}

impl Submission {
    /// Validate the name and all parameters, reporting every failure.
    pub fn validate(raw: &RawParameters) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = raw.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            errors.add("name", "this field is required");
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.add("name", format!("must be at most {MAX_NAME_LEN} characters"));
        }

        let params = match ParameterSet::validate(raw) {
            Ok(p) => Some(p),
            Err(param_errors) => {
                for (field, msg) in param_errors.iter() {
                    errors.add(field, msg);
                }
                None
            }
        };

        match params {
            Some(params) if errors.is_empty() => Ok(Self { name: name.to_string(), params }),
            _ => Err(errors),
        }
    }
}
