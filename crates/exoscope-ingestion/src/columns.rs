//! Header → candidate field mapping.
//!
//! Each target field has an ordered list of header aliases. For a given row
//! the first alias whose cell is non-empty supplies the value, so one header
//! (e.g. `kepoi_name`) may feed several fields.

use std::collections::{HashMap, HashSet};

use exoscope_common::ParameterField;

use crate::error::{ImportError, Result};

/// Candidate field a spreadsheet column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Name,
    KoiId,
    TessId,
    Param(ParameterField),
    Classification,
}

impl Target {
    /// Field name as used in alias configuration and row error reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Name => "name",
            Target::KoiId => "koi_id",
            Target::TessId => "tess_id",
            Target::Param(field) => field.as_str(),
            Target::Classification => "classification",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Target::Name),
            "koi_id" => Some(Target::KoiId),
            "tess_id" => Some(Target::TessId),
            "classification" => Some(Target::Classification),
            other => ParameterField::from_name(other).map(Target::Param),
        }
    }
}

const DEFAULT_ALIASES: &[(Target, &[&str])] = &[
    (Target::Name, &["name", "kepoi_name", "kepler_name", "koi_name", "kepid"]),
    (Target::KoiId, &["koi_id", "kepoi_name"]),
    (Target::TessId, &["tess_id", "toi", "tic_id"]),
    (Target::Param(ParameterField::OrbitalPeriod), &["orbital_period", "koi_period", "pl_orbper"]),
    (Target::Param(ParameterField::TransitDuration), &["transit_duration", "koi_duration", "pl_trandurh"]),
    (Target::Param(ParameterField::PlanetaryRadius), &["planetary_radius", "koi_prad", "pl_rade"]),
    (Target::Param(ParameterField::StellarRadius), &["stellar_radius", "koi_srad", "st_rad"]),
    (Target::Param(ParameterField::StellarMass), &["stellar_mass", "koi_smass", "st_mass"]),
    (
        Target::Param(ParameterField::StellarEffectiveTemperature),
        &["stellar_effective_temperature", "koi_steff", "st_teff"],
    ),
    (Target::Param(ParameterField::TransitDepth), &["transit_depth", "koi_depth", "pl_trandep"]),
    (Target::Param(ParameterField::ImpactParameter), &["impact_parameter", "koi_impact", "pl_imppar"]),
    (
        Target::Param(ParameterField::EquilibriumTemperature),
        &["equilibrium_temperature", "koi_teq", "pl_eqt"],
    ),
    (Target::Classification, &["classification", "koi_disposition", "tfopwg_disp", "disposition"]),
];

fn normalize(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Alias table used by the bulk loader.
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    aliases: Vec<(Target, Vec<String>)>,
    known: HashSet<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(target, names)| (*target, names.iter().map(|n| n.to_string()).collect()))
            .collect();
        Self::from_table(aliases)
    }
}

impl ColumnAliases {
    fn from_table(aliases: Vec<(Target, Vec<String>)>) -> Self {
        let known = aliases.iter().flat_map(|(_, names)| names.iter().cloned()).collect();
        Self { aliases, known }
    }

    /// Default table extended with configured aliases, keyed by field name.
    /// Extra aliases rank after the built-in ones.
    pub fn with_extra(extra: &HashMap<String, Vec<String>>) -> Result<Self> {
        let mut aliases = Self::default().aliases;
        for (field, names) in extra {
            let target =
                Target::from_name(field).ok_or_else(|| ImportError::UnknownAliasField(field.clone()))?;
            let Some((_, list)) = aliases.iter_mut().find(|(t, _)| *t == target) else {
                continue;
            };
            for name in names.iter().map(|n| normalize(n)).filter(|n| !n.is_empty()) {
                if !list.contains(&name) {
                    list.push(name);
                }
            }
        }
        Ok(Self::from_table(aliases))
    }

    /// Aliases for `target`, highest priority first.
    pub fn aliases(&self, target: Target) -> &[String] {
        self.aliases
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, names)| names.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `header` feeds any field.
    pub fn is_mapped(&self, header: &str) -> bool {
        self.known.contains(&normalize(header))
    }

    /// Value for `target` in a row whose cells are keyed by normalized header.
    pub fn lookup<'a>(&self, target: Target, cells: &'a HashMap<String, &'a str>) -> Option<&'a str> {
        self.aliases(target)
            .iter()
            .filter_map(|alias| cells.get(alias).copied())
            .map(str::trim)
            .find(|value| !value.is_empty())
    }
}

/// Index a row's cells by normalized header. The first column wins when
/// two headers normalize to the same name.
pub fn index_cells(fields: &[(String, String)]) -> HashMap<String, &str> {
    let mut cells = HashMap::with_capacity(fields.len());
    for (header, value) in fields {
        cells.entry(normalize(header)).or_insert(value.as_str());
    }
    cells
}
