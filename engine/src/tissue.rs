//! Tissue intensity tables. Art-direction constants, not clinical values.

use crate::api::Modality;

/// Hounsfield-like CT constants.
pub mod ct {
    pub const AIR: f32 = -1000.0;
    pub const LUNG: f32 = -850.0;
    pub const BOWEL_GAS: f32 = -900.0;
    pub const FAT: f32 = -100.0;
    pub const FAT_HILUM: f32 = -60.0;
    pub const WATER: f32 = 0.0;
    pub const URINE: f32 = 5.0;
    pub const CSF: f32 = 8.0;
    pub const SOFT_TISSUE: f32 = 40.0;
    pub const MUSCLE: f32 = 50.0;
    pub const HEART: f32 = 45.0;
    pub const BOWEL_WALL: f32 = 45.0;
    pub const PANCREAS: f32 = 45.0;
    pub const UTERUS: f32 = 48.0;
    pub const SPLEEN: f32 = 50.0;
    pub const LIVER: f32 = 60.0;
    pub const THYROID: f32 = 100.0;
    pub const KIDNEY_MEDULLA: f32 = 100.0;
    pub const VEIN: f32 = 110.0;
    pub const KIDNEY_CORTEX: f32 = 150.0;
    pub const ARTERY: f32 = 170.0;
    pub const BONE_CANCELLOUS: f32 = 300.0;
    pub const RIB: f32 = 650.0;
    pub const BONE_CORTICAL: f32 = 1000.0;
    pub const NODE: f32 = 35.0;
    pub const NODE_SUSPICIOUS: f32 = 55.0;

    /// Texture amplitude on soft tissue.
    pub const TEXTURE: f32 = 8.0;
    pub const LUNG_TEXTURE: f32 = 25.0;
    /// Acquisition noise sigma.
    pub const NOISE: f32 = 6.0;
}

/// T1 post-contrast MRI signal scale (0..1000).
pub mod mri {
    pub const BACKGROUND: f32 = 0.0;
    pub const SCALP_FAT: f32 = 880.0;
    pub const SKULL_CORTEX: f32 = 60.0;
    pub const DIPLOE: f32 = 640.0;
    pub const DURA: f32 = 700.0;
    pub const CSF: f32 = 120.0;
    pub const GRAY_MATTER: f32 = 420.0;
    pub const DEEP_GRAY: f32 = 460.0;
    pub const WHITE_MATTER: f32 = 520.0;
    pub const CHOROID_PLEXUS: f32 = 760.0;
    pub const SINUS: f32 = 850.0;
    pub const MUSCLE: f32 = 340.0;
    pub const EDEMA: f32 = 300.0;

    pub const TEXTURE: f32 = 18.0;
    pub const NOISE: f32 = 10.0;
}

/// Modality-specific constants for lesion rendering.
#[derive(Debug, Clone, Copy)]
pub struct LesionTissue {
    pub necrosis: f32,
    pub necrosis_spread: f32,
    pub heterogeneity_scale: f32,
    pub rim_boost: f32,
    pub spicule_noise: f32,
}

impl LesionTissue {
    pub fn for_modality(modality: Modality) -> Self {
        match modality {
            Modality::Ct => Self {
                necrosis: 15.0,
                necrosis_spread: 8.0,
                heterogeneity_scale: 35.0,
                rim_boost: 70.0,
                spicule_noise: 10.0,
            },
            Modality::Mri => Self {
                necrosis: 150.0,
                necrosis_spread: 35.0,
                heterogeneity_scale: 110.0,
                rim_boost: 320.0,
                spicule_noise: 30.0,
            },
        }
    }
}

/// Noise amplitudes for the background field of a modality.
pub fn acquisition_noise(modality: Modality) -> f32 {
    match modality {
        Modality::Ct => ct::NOISE,
        Modality::Mri => mri::NOISE,
    }
}
