//! Anatomical background fields, one per body region / modality.
//!
//! Voxel positions are mapped into a normalized frame: `u` runs left to right
//! and `v` anterior to posterior, both in `[-1, 1]`; `s` runs from the first
//! (most cranial) slice at 0 to the last at 1.

use glam::{Vec2, Vec3};

use crate::api::{Modality, Seed, VolumeType};
use crate::lesion::EdemaHalo;
use crate::math::{cylinder_sdf, ellipse_sdf, fbm_noise, mix, smoothstep, SeededRandom};
use crate::tissue::ct;
use crate::volume::Dims;

pub mod abdomen;
pub mod brain;
pub mod head_neck;
pub mod pelvis;
pub mod thorax;

pub use abdomen::AbdomenCt;
pub use brain::BrainMri;
pub use head_neck::HeadNeckCt;
pub use pelvis::PelvisCt;
pub use thorax::ThoraxCt;

/// Boundary half-width in normalized units (about one voxel at 256).
pub(crate) const FEATHER: f32 = 0.008;

/// A voxel position in every frame the generators need.
#[derive(Debug, Clone, Copy)]
pub struct FieldPoint {
    /// Voxel coordinates.
    pub voxel: Vec3,
    pub u: f32,
    pub v: f32,
    pub s: f32,
    /// Resolution-independent coordinate for texture noise.
    pub texture: Vec3,
}

impl FieldPoint {
    pub fn new(x: usize, y: usize, z: usize, dims: Dims, noise_offset: Vec3) -> Self {
        let u = (x as f32 + 0.5) / dims.width as f32 * 2.0 - 1.0;
        let v = (y as f32 + 0.5) / dims.height as f32 * 2.0 - 1.0;
        let s = (z as f32 + 0.5) / dims.depth as f32;
        Self {
            voxel: Vec3::new(x as f32, y as f32, z as f32),
            u,
            v,
            s,
            texture: Vec3::new(u, v, s * 2.0 - 1.0) * 8.0 + noise_offset,
        }
    }

    #[inline]
    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.u, self.v)
    }

    /// Tissue texture in `[-1, 1]`.
    #[inline]
    pub fn grain(&self) -> f32 {
        fbm_noise(self.texture, 3)
    }
}

pub trait AnatomicalField: Send + Sync {
    fn modality(&self) -> Modality;
    fn body_part(&self) -> &'static str;
    fn series_description(&self) -> &'static str;
    /// In-plane field of view in mm.
    fn field_of_view_mm(&self) -> f32;
    /// Nominal slice thickness for a 100-slice acquisition.
    fn slice_thickness_mm(&self) -> f32;
    fn intensity_at(&self, p: &FieldPoint) -> f32;
    fn accepts_lymph_nodes(&self) -> bool {
        true
    }
}

/// Generator selection. Adding a variant forces every match below to cover it.
#[derive(Debug, Clone)]
pub enum Anatomy {
    Thorax(ThoraxCt),
    Abdomen(AbdomenCt),
    Pelvis(PelvisCt),
    HeadNeck(HeadNeckCt),
    Brain(BrainMri),
}

impl Anatomy {
    /// `Unrecognized` maps to the thorax generator; the caller swaps in the
    /// fallback case first.
    pub fn new(volume_type: VolumeType, seed: Seed) -> Self {
        let mut rng = SeededRandom::new(seed.offset(31).0);
        match volume_type {
            VolumeType::CtThorax | VolumeType::Unrecognized => Anatomy::Thorax(ThoraxCt::new(&mut rng)),
            VolumeType::CtAbdomen => Anatomy::Abdomen(AbdomenCt::new(&mut rng)),
            VolumeType::CtPelvis => Anatomy::Pelvis(PelvisCt::new(&mut rng)),
            VolumeType::CtHeadNeck => Anatomy::HeadNeck(HeadNeckCt::new(&mut rng)),
            VolumeType::MriBrain => Anatomy::Brain(BrainMri::new(&mut rng)),
        }
    }

    /// Peritumoral edema only exists in the brain field.
    pub fn with_edema(mut self, halos: Vec<EdemaHalo>) -> Self {
        if let Anatomy::Brain(brain) = &mut self {
            brain.set_edema(halos);
        }
        self
    }

    pub fn wants_edema(&self) -> bool {
        matches!(self, Anatomy::Brain(_))
    }
}

impl AnatomicalField for Anatomy {
    fn modality(&self) -> Modality {
        match self {
            Anatomy::Thorax(f) => f.modality(),
            Anatomy::Abdomen(f) => f.modality(),
            Anatomy::Pelvis(f) => f.modality(),
            Anatomy::HeadNeck(f) => f.modality(),
            Anatomy::Brain(f) => f.modality(),
        }
    }

    fn body_part(&self) -> &'static str {
        match self {
            Anatomy::Thorax(f) => f.body_part(),
            Anatomy::Abdomen(f) => f.body_part(),
            Anatomy::Pelvis(f) => f.body_part(),
            Anatomy::HeadNeck(f) => f.body_part(),
            Anatomy::Brain(f) => f.body_part(),
        }
    }

    fn series_description(&self) -> &'static str {
        match self {
            Anatomy::Thorax(f) => f.series_description(),
            Anatomy::Abdomen(f) => f.series_description(),
            Anatomy::Pelvis(f) => f.series_description(),
            Anatomy::HeadNeck(f) => f.series_description(),
            Anatomy::Brain(f) => f.series_description(),
        }
    }

    fn field_of_view_mm(&self) -> f32 {
        match self {
            Anatomy::Thorax(f) => f.field_of_view_mm(),
            Anatomy::Abdomen(f) => f.field_of_view_mm(),
            Anatomy::Pelvis(f) => f.field_of_view_mm(),
            Anatomy::HeadNeck(f) => f.field_of_view_mm(),
            Anatomy::Brain(f) => f.field_of_view_mm(),
        }
    }

    fn slice_thickness_mm(&self) -> f32 {
        match self {
            Anatomy::Thorax(f) => f.slice_thickness_mm(),
            Anatomy::Abdomen(f) => f.slice_thickness_mm(),
            Anatomy::Pelvis(f) => f.slice_thickness_mm(),
            Anatomy::HeadNeck(f) => f.slice_thickness_mm(),
            Anatomy::Brain(f) => f.slice_thickness_mm(),
        }
    }

    #[inline]
    fn intensity_at(&self, p: &FieldPoint) -> f32 {
        match self {
            Anatomy::Thorax(f) => f.intensity_at(p),
            Anatomy::Abdomen(f) => f.intensity_at(p),
            Anatomy::Pelvis(f) => f.intensity_at(p),
            Anatomy::HeadNeck(f) => f.intensity_at(p),
            Anatomy::Brain(f) => f.intensity_at(p),
        }
    }

    fn accepts_lymph_nodes(&self) -> bool {
        match self {
            Anatomy::Thorax(f) => f.accepts_lymph_nodes(),
            Anatomy::Abdomen(f) => f.accepts_lymph_nodes(),
            Anatomy::Pelvis(f) => f.accepts_lymph_nodes(),
            Anatomy::HeadNeck(f) => f.accepts_lymph_nodes(),
            Anatomy::Brain(f) => f.accepts_lymph_nodes(),
        }
    }
}

/// Blends `value` into `field` where `sd` is negative, feathered across the boundary.
#[inline]
pub(crate) fn paint(field: &mut f32, sd: f32, value: f32) {
    let inside = 1.0 - smoothstep(-FEATHER, FEATHER, sd);
    if inside > 0.0 {
        *field = mix(*field, value, inside);
    }
}

/// Draws a closed shell of `thickness` around the boundary of `sd`.
#[inline]
pub(crate) fn paint_shell(field: &mut f32, sd: f32, thickness: f32, value: f32) {
    paint(field, sd.abs() - thickness * 0.5, value);
}

/// Bone with a cortical rim: cancellous inside, cortical within `cortex` of the edge.
#[inline]
pub(crate) fn paint_bone(field: &mut f32, sd: f32, cortex: f32, grain: f32) {
    if sd > FEATHER {
        return;
    }
    paint(field, sd, ct::BONE_CORTICAL);
    paint(field, sd + cortex, ct::BONE_CANCELLOUS + 40.0 * grain);
}

/// Layered body outline: skin/subcutaneous fat, muscle wall, then the cavity
/// filled with `cavity` tissue. Returns the body SDF.
pub(crate) fn paint_body_wall(field: &mut f32, q: Vec2, center: Vec2, radii: Vec2, cavity: f32, grain: f32) -> f32 {
    let body = ellipse_sdf(q, center, radii);
    paint(field, body, ct::FAT + ct::TEXTURE * grain);
    paint(field, ellipse_sdf(q, center, radii * 0.93), ct::MUSCLE + ct::TEXTURE * grain);
    paint(field, ellipse_sdf(q, center, radii * 0.86), cavity + ct::TEXTURE * grain);
    body
}

/// Vertebra in the axial plane: body, canal, posterior arch and spinous process.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Vertebra {
    pub center: Vec2,
    pub radius: f32,
}

impl Vertebra {
    pub fn paint(&self, field: &mut f32, q: Vec2, grain: f32) {
        let r = self.radius;
        let canal = self.center + Vec2::new(0.0, r * 1.45);
        paint_shell(field, cylinder_sdf(q, canal, r * 0.62), r * 0.3, ct::BONE_CORTICAL * 0.7);
        paint_bone(field, cylinder_sdf(q, self.center, r), 0.018, grain);
        let spinous = ellipse_sdf(q, self.center + Vec2::new(0.0, r * 2.0), Vec2::new(r * 0.22, r * 0.45));
        paint_bone(field, spinous * r * 0.22, 0.01, grain);
        paint(field, cylinder_sdf(q, canal, r * 0.45), ct::CSF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_point_frames() {
        let dims = Dims::new(100, 50, 10);
        let p = FieldPoint::new(0, 49, 9, dims, Vec3::ZERO);
        assert!(p.u < -0.98 && p.v > 0.98 && p.s > 0.9);
        let c = FieldPoint::new(50, 25, 5, dims, Vec3::ZERO);
        assert!(c.u.abs() < 0.02 && c.v.abs() < 0.03);
    }

    #[test]
    fn paint_is_feathered() {
        let mut inside = 0.0;
        paint(&mut inside, -1.0, 100.0);
        assert_eq!(inside, 100.0);
        let mut outside = 0.0;
        paint(&mut outside, 1.0, 100.0);
        assert_eq!(outside, 0.0);
        let mut edge = 0.0;
        paint(&mut edge, 0.0, 100.0);
        assert!((edge - 50.0).abs() < 1e-3);
    }

    #[test]
    fn unrecognized_volume_type_uses_thorax() {
        assert!(matches!(Anatomy::new(VolumeType::Unrecognized, Seed(1)), Anatomy::Thorax(_)));
        assert!(matches!(Anatomy::new(VolumeType::MriBrain, Seed(1)), Anatomy::Brain(_)));
    }

    #[test]
    fn every_generator_is_air_outside_the_body() {
        let dims = Dims::new(64, 64, 32);
        let corner = FieldPoint::new(0, 0, 16, dims, Vec3::ZERO);
        for vt in [VolumeType::CtThorax, VolumeType::CtAbdomen, VolumeType::CtPelvis, VolumeType::CtHeadNeck] {
            let anatomy = Anatomy::new(vt, Seed(9));
            assert_eq!(anatomy.intensity_at(&corner), ct::AIR, "{vt:?}");
        }
        let brain = Anatomy::new(VolumeType::MriBrain, Seed(9));
        assert_eq!(brain.intensity_at(&corner), crate::tissue::mri::BACKGROUND);
    }
}
