use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("could not allocate a volume of {voxels} voxels")]
    OutOfMemory { voxels: usize },
    #[error("volume generation was cancelled")]
    Cancelled,
    #[error("voxel buffer does not match volume shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("failed to build synthesis thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("case file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("case file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("case file is not valid RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("unsupported case file format: {0}")]
    UnsupportedConfigFormat(String),
}

/// Per-case seed. Derived from the case id with 32-bit FNV-1a so any
/// implementation reproduces it from the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seed(pub u32);

impl Seed {
    const FNV_OFFSET: u32 = 0x811C_9DC5;
    const FNV_PRIME: u32 = 0x0100_0193;

    pub fn from_case_id(case_id: &str) -> Self {
        let hash = case_id.bytes().fold(Self::FNV_OFFSET, |h, b| {
            (h ^ b as u32).wrapping_mul(Self::FNV_PRIME)
        });
        Seed(hash)
    }

    /// Disjoint stream for a sub-component (lesion, necrotic core, ...).
    pub fn offset(self, delta: u32) -> Self {
        Seed(self.0.wrapping_add(delta))
    }

    /// Primary tumour `index`.
    pub fn primary(self, index: usize) -> Self {
        self.offset(1_000 * (index as u32 + 1))
    }

    /// Metastasis `index`.
    pub fn metastasis(self, index: usize) -> Self {
        self.offset(50_000 + 1_000 * index as u32)
    }

    /// Lymph node `index`.
    pub fn lymph_node(self, index: usize) -> Self {
        self.offset(90_000 + 100 * index as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "MRI", alias = "MR")]
    Mri,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mri => "MRI",
        }
    }
}

impl Default for Modality {
    fn default() -> Self { Modality::Ct }
}

/// Volume type tag from the case configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeType {
    CtThorax,
    CtAbdomen,
    CtPelvis,
    CtHeadNeck,
    MriBrain,
    #[serde(other)]
    Unrecognized,
}

impl Default for VolumeType {
    fn default() -> Self { VolumeType::CtThorax }
}

/// Slice orientation. Axial planes are normal to z, coronal to y, sagittal to x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Axial,
    Sagittal,
    Coronal,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Axial, Axis::Sagittal, Axis::Coronal];

    /// Unknown names fall back to axial instead of failing.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sagittal" | "sag" => Axis::Sagittal,
            "coronal" | "cor" => Axis::Coronal,
            _ => Axis::Axial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Axial => "axial",
            Axis::Sagittal => "sagittal",
            Axis::Coronal => "coronal",
        }
    }
}

/// Linear display window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub center: f32,
    pub width: f32,
}

impl Window {
    pub const LUNG: Window = Window::new(-600.0, 1500.0);
    pub const MEDIASTINUM: Window = Window::new(40.0, 400.0);
    pub const SOFT_TISSUE: Window = Window::new(40.0, 400.0);
    pub const LIVER: Window = Window::new(60.0, 160.0);
    pub const BONE: Window = Window::new(400.0, 1800.0);
    pub const HEAD_NECK: Window = Window::new(40.0, 350.0);
    pub const BRAIN_CT: Window = Window::new(40.0, 80.0);
    pub const MRI_T1C: Window = Window::new(500.0, 1000.0);

    pub const fn new(center: f32, width: f32) -> Self {
        Self { center, width }
    }

    pub fn preset(name: &str) -> Option<Self> {
        let window = match name.trim().to_ascii_lowercase().as_str() {
            "lung" => Self::LUNG,
            "mediastinum" => Self::MEDIASTINUM,
            "soft_tissue" | "soft-tissue" | "abdomen" => Self::SOFT_TISSUE,
            "liver" => Self::LIVER,
            "bone" => Self::BONE,
            "head_neck" | "head-neck" => Self::HEAD_NECK,
            "brain" => Self::BRAIN_CT,
            "mri" | "t1c" => Self::MRI_T1C,
            _ => return None,
        };
        Some(window)
    }

    pub fn lower(&self) -> f32 {
        self.center - self.width / 2.0
    }
}

impl Default for Window {
    fn default() -> Self { Window::SOFT_TISSUE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_values() {
        assert_eq!(Seed::from_case_id("").0, 0x811C_9DC5);
        assert_eq!(Seed::from_case_id("a").0, 0xE40C_292C);
        assert_eq!(Seed::from_case_id("foobar").0, 0xBF9C_F968);
    }

    #[test]
    fn lesion_streams_are_disjoint() {
        let seed = Seed::from_case_id("lung-nsclc-kras-g12c");
        assert_ne!(seed.primary(0), seed.primary(1));
        assert_ne!(seed.primary(0), seed.metastasis(0));
        assert_ne!(seed.metastasis(0), seed.lymph_node(0));
    }

    #[test]
    fn unknown_volume_type_deserializes() {
        let vt: VolumeType = serde_json::from_str("\"ct_spleen\"").unwrap();
        assert_eq!(vt, VolumeType::Unrecognized);
        let vt: VolumeType = serde_json::from_str("\"mri_brain\"").unwrap();
        assert_eq!(vt, VolumeType::MriBrain);
    }

    #[test]
    fn axis_parsing_is_lenient() {
        assert_eq!(Axis::parse_lenient("Coronal"), Axis::Coronal);
        assert_eq!(Axis::parse_lenient("oblique"), Axis::Axial);
    }

    #[test]
    fn window_presets() {
        assert_eq!(Window::preset("lung"), Some(Window::LUNG));
        assert_eq!(Window::preset("nope"), None);
        assert_eq!(Window::LUNG.lower(), -1350.0);
    }
}
