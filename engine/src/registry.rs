//! Case id -> declarative case configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::api::{Modality, SynthError, VolumeType, Window};
use crate::lesion::{LesionSpec, LymphNodeSpec};

const BUILTIN_CASES: &str = include_str!("../assets/cases.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseConfig {
    pub case_id: String,
    #[serde(default)]
    pub volume_type: VolumeType,
    #[serde(default)]
    pub modality: Modality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_description: Option<String>,
    #[serde(default)]
    pub default_window: Window,
    #[serde(default)]
    pub tumors: Vec<LesionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lymph_nodes: Vec<LymphNodeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metastases: Vec<LesionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_findings: Vec<String>,
}

impl CaseConfig {
    /// Single spiculated right-upper-lobe nodule on a chest CT.
    pub fn fallback(case_id: &str) -> Self {
        Self {
            case_id: case_id.to_string(),
            volume_type: VolumeType::CtThorax,
            modality: Modality::Ct,
            body_part: None,
            series_description: None,
            default_window: Window::LUNG,
            tumors: vec![LesionSpec {
                location: [0.65, 0.35, 0.55],
                size: [0.08, 0.075, 0.08],
                intensity: 45.0,
                heterogeneity: 0.4,
                necrosis: Some(0.15),
                enhancement: Some(0.3),
                spiculated: true,
                infiltrative: false,
            }],
            lymph_nodes: Vec::new(),
            metastases: Vec::new(),
            additional_findings: Vec::new(),
        }
    }

    pub fn lesion_count(&self) -> usize {
        self.tumors.len() + self.metastases.len()
    }
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

fn sanitize_lesions(case_id: &str, what: &str, lesions: &mut Vec<LesionSpec>) {
    lesions.retain(|lesion| {
        let valid = lesion.size.iter().all(|r| r.is_finite() && *r > 0.0);
        if !valid {
            warn!("Case '{}': dropping {} with non-positive radius {:?}", case_id, what, lesion.size);
        }
        valid
    });
    for lesion in lesions.iter_mut() {
        lesion.location = lesion.location.map(unit);
        lesion.size = lesion.size.map(|r| r.min(1.0));
        lesion.heterogeneity = unit(lesion.heterogeneity);
        lesion.necrosis = lesion.necrosis.map(unit);
        lesion.enhancement = lesion.enhancement.map(unit);
    }
}

/// All known cases. Lookups never fail; unknown ids resolve to
/// [`CaseConfig::fallback`].
#[derive(Debug, Clone, Default)]
pub struct CaseRegistry {
    cases: BTreeMap<String, CaseConfig>,
}

impl CaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalogue compiled into the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        match serde_json::from_str::<Vec<CaseConfig>>(BUILTIN_CASES) {
            Ok(cases) => {
                for case in cases {
                    registry.insert(case);
                }
                debug!("Loaded {} built-in cases", registry.len());
            }
            Err(e) => warn!("Built-in case catalogue is invalid: {}", e),
        }
        registry
    }

    /// Merges a list of cases from a `.json` or `.ron` file over the current
    /// entries. Returns how many cases were read.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, SynthError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let cases: Vec<CaseConfig> = match extension.as_str() {
            "json" => serde_json::from_str(&text)?,
            "ron" => ron::from_str(&text)?,
            _ => return Err(SynthError::UnsupportedConfigFormat(path.display().to_string())),
        };
        let count = cases.len();
        for case in cases {
            self.insert(case);
        }
        info!("Loaded {} cases from {}", count, path.display());
        Ok(count)
    }

    /// Registers `config`, replacing any case with the same id. Lesions with
    /// non-positive radii are dropped; locations and fractions are clamped.
    pub fn insert(&mut self, mut config: CaseConfig) {
        let id = config.case_id.clone();
        if config.volume_type == VolumeType::Unrecognized {
            warn!("Case '{}' has an unrecognized volume type; it will render as chest CT", id);
        }
        sanitize_lesions(&id, "tumor", &mut config.tumors);
        sanitize_lesions(&id, "metastasis", &mut config.metastases);
        config.lymph_nodes.retain(|node| {
            let valid = node.radius.is_finite() && node.radius > 0.0;
            if !valid {
                warn!("Case '{}': dropping lymph node with radius {}", id, node.radius);
            }
            valid
        });
        for node in &mut config.lymph_nodes {
            node.location = node.location.map(unit);
        }
        if config.default_window.width <= 0.0 {
            warn!("Case '{}': window width {} is not positive", id, config.default_window.width);
            config.default_window.width = 1.0;
        }
        self.cases.insert(id, config);
    }

    pub fn get(&self, case_id: &str) -> Option<&CaseConfig> {
        self.cases.get(case_id)
    }

    pub fn resolve(&self, case_id: &str) -> CaseConfig {
        match self.cases.get(case_id) {
            Some(config) => config.clone(),
            None => {
                warn!("Unknown case '{}', using the default chest CT configuration", case_id);
                CaseConfig::fallback(case_id)
            }
        }
    }

    pub fn case_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.cases.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
