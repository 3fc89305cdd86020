//! Lesion morphology: irregular occupancy and intensity for tumours,
//! metastases, peritumoral edema and lymph nodes.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::api::{Modality, Seed};
use crate::math::{fbm_noise, segment_sdf, smooth_noise, smoothstep, SeededRandom};
use crate::tissue::{ct, LesionTissue};
use crate::volume::{Dims, FindingKind, Slab, VoxelBounds};

/// Radii below this many voxels are raised so the centre voxel is always occupied.
const MIN_RADIUS_VOXELS: f32 = 1.5;
/// Lower bound of the deformed radius, in units of the base ellipsoid.
const MIN_SURFACE_RADIUS: f32 = 0.6;
/// Depth below the surface (normalized) that receives rim enhancement.
const RIM_BAND: f32 = 0.22;
/// Inner edge of the shell where spicules are tested.
const SPICULE_SHELL: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LesionSpec {
    /// `[x, y, z]` in `[0, 1]` of the volume extent.
    pub location: [f32; 3],
    /// Per-axis radius as a fraction of the volume extent.
    pub size: [f32; 3],
    pub intensity: f32,
    #[serde(default)]
    pub heterogeneity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub necrosis: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<f32>,
    #[serde(default)]
    pub spiculated: bool,
    #[serde(default)]
    pub infiltrative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LymphNodeSpec {
    pub location: [f32; 3],
    /// Radius as a fraction of each axis extent.
    pub radius: f32,
    #[serde(default)]
    pub suspicious: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LesionRegion {
    Necrotic,
    Solid,
    Rim,
    Spicule,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LesionSample {
    pub region: LesionRegion,
    pub intensity: f32,
}

#[derive(Debug, Clone)]
struct Lobe {
    direction: Vec3,
    width: f32,
    amplitude: f32,
}

/// Star-shaped lobulated surface around the origin of a unit local frame.
#[derive(Debug, Clone)]
pub struct IrregularShape {
    lobes: Vec<Lobe>,
    lobulation: f32,
    irregularity: f32,
    noise_offset: Vec3,
}

impl IrregularShape {
    pub fn new(rng: &mut SeededRandom, lobulation: f32, irregularity: f32) -> Self {
        let count = rng.range_usize(3, 6);
        let lobes = (0..count)
            .map(|_| Lobe {
                direction: rng.unit_vector(),
                width: rng.range(0.35, 0.8),
                amplitude: rng.range(-0.12, 0.35),
            })
            .collect();
        let noise_offset = Vec3::new(rng.range(0.0, 64.0), rng.range(0.0, 64.0), rng.range(0.0, 64.0));
        Self { lobes, lobulation, irregularity, noise_offset }
    }

    /// Deformed radius along the unit direction `dir`.
    pub fn radius_along(&self, dir: Vec3) -> f32 {
        let theta = dir.y.atan2(dir.x);
        let phi = dir.z.clamp(-1.0, 1.0).acos();
        let mut deform = 0.06 * (5.0 * theta).sin() * (4.0 * phi).sin()
            + 0.035 * (9.0 * theta + 1.3).sin() * (7.0 * phi).cos();
        for lobe in &self.lobes {
            let angle = dir.dot(lobe.direction).clamp(-1.0, 1.0).acos();
            let t = angle / lobe.width;
            deform += lobe.amplitude * (-t * t).exp();
        }
        let roughness = fbm_noise(dir * 2.5 + self.noise_offset, 3);
        (1.0 + self.lobulation * deform + self.irregularity * 0.3 * roughness).max(MIN_SURFACE_RADIUS)
    }

    /// Upper bound of [`radius_along`](Self::radius_along) over all directions.
    pub fn max_radius(&self) -> f32 {
        let lobes: f32 = self.lobes.iter().map(|l| l.amplitude.max(0.0)).sum();
        1.0 + self.lobulation * (0.095 + lobes) + self.irregularity * 0.3
    }

    /// Negative inside. `q` is in the shape's local frame.
    pub fn signed_distance(&self, q: Vec3) -> f32 {
        let r = q.length();
        if r < 1e-6 {
            return -self.radius_along(Vec3::Z);
        }
        r - self.radius_along(q / r)
    }
}

/// Tapered capsule, in voxel space.
#[derive(Debug, Clone)]
struct Spicule {
    root: Vec3,
    tip: Vec3,
    root_radius: f32,
    tip_radius: f32,
}

#[derive(Debug, Clone)]
struct NecroticCore {
    offset: Vec3,
    scale: f32,
    shape: IrregularShape,
}

impl NecroticCore {
    fn new(seed: Seed, necrosis: f32, irregularity: f32) -> Self {
        let mut rng = SeededRandom::new(seed.0);
        let offset = rng.unit_vector() * rng.range(0.0, 0.3);
        let scale = (necrosis.cbrt() * 1.1).clamp(0.2, 0.85);
        let shape = IrregularShape::new(&mut rng, 0.35, irregularity * 1.5 + 0.15);
        Self { offset, scale, shape }
    }

    fn contains(&self, q: Vec3) -> bool {
        self.shape.signed_distance((q - self.offset) / self.scale) < 0.0
    }
}

/// One lesion, ready to be sampled voxel by voxel.
#[derive(Debug, Clone)]
pub struct LesionModel {
    center: Vec3,
    radii: Vec3,
    base_intensity: f32,
    heterogeneity: f32,
    enhancement: f32,
    shape: IrregularShape,
    spicules: Vec<Spicule>,
    spicule_reach: f32,
    necrotic: Option<NecroticCore>,
    tissue: LesionTissue,
    noise_offset: Vec3,
    kind: FindingKind,
}

impl LesionModel {
    pub fn new(spec: &LesionSpec, seed: Seed, dims: Dims, modality: Modality, kind: FindingKind) -> Self {
        let extent = dims.as_vec3();
        let center = (Vec3::from(spec.location) * extent).clamp(Vec3::ZERO, extent - Vec3::ONE);
        let radii = (Vec3::from(spec.size) * extent).max(Vec3::splat(MIN_RADIUS_VOXELS));
        let heterogeneity = spec.heterogeneity.clamp(0.0, 1.0);

        let irregularity = if spec.infiltrative {
            0.35 + 0.3 * heterogeneity
        } else {
            0.12 + 0.2 * heterogeneity
        };
        let lobulation = 0.25 + 0.25 * heterogeneity + if spec.spiculated { 0.1 } else { 0.0 };

        let mut rng = SeededRandom::new(seed.0);
        let shape = IrregularShape::new(&mut rng, lobulation, irregularity);
        let noise_offset = Vec3::new(rng.range(0.0, 64.0), rng.range(0.0, 64.0), rng.range(0.0, 64.0));

        let (spicules, spicule_reach) = if spec.spiculated {
            build_spicules(seed.offset(104_729), center, radii, &shape)
        } else {
            (Vec::new(), 0.0)
        };

        let necrotic = spec
            .necrosis
            .filter(|&n| n > 0.0)
            .map(|n| NecroticCore::new(seed.offset(7_919), n.min(1.0), irregularity));

        Self {
            center,
            radii,
            base_intensity: spec.intensity,
            heterogeneity,
            enhancement: spec.enhancement.unwrap_or(0.0).clamp(0.0, 1.0),
            shape,
            spicules,
            spicule_reach,
            necrotic,
            tissue: LesionTissue::for_modality(modality),
            noise_offset,
            kind,
        }
    }

    /// Lesion centre in voxel coordinates.
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Base ellipsoid radii in voxels.
    pub fn radii(&self) -> Vec3 {
        self.radii
    }

    pub fn kind(&self) -> FindingKind {
        self.kind
    }

    pub fn shape(&self) -> &IrregularShape {
        &self.shape
    }

    pub fn bounds(&self, dims: Dims) -> VoxelBounds {
        let reach = self.shape.max_radius().max(self.spicule_reach);
        VoxelBounds::around(self.center, self.radii * reach + Vec3::ONE, dims)
    }

    /// Occupancy and intensity at voxel position `p`; `None` outside.
    pub fn sample(&self, p: Vec3) -> Option<LesionSample> {
        let q = (p - self.center) / self.radii;
        let r = q.length();
        let dir = if r > 1e-6 { q / r } else { Vec3::Z };
        let depth = self.shape.radius_along(dir) - r;

        if depth > 0.0 {
            if let Some(core) = &self.necrotic {
                if core.contains(q) {
                    let noise = fbm_noise(q * 4.0 + self.noise_offset, 2);
                    return Some(LesionSample {
                        region: LesionRegion::Necrotic,
                        intensity: self.tissue.necrosis + self.tissue.necrosis_spread * noise,
                    });
                }
            }

            let texture = fbm_noise(q * 2.2 + self.noise_offset, 3);
            let solid = self.base_intensity + self.heterogeneity * self.tissue.heterogeneity_scale * texture;
            if self.enhancement > 0.0 && depth < RIM_BAND {
                let weight = 1.0 - smoothstep(0.0, RIM_BAND, depth);
                return Some(LesionSample {
                    region: LesionRegion::Rim,
                    intensity: solid + self.enhancement * self.tissue.rim_boost * weight,
                });
            }
            return Some(LesionSample { region: LesionRegion::Solid, intensity: solid });
        }

        if r >= SPICULE_SHELL && r <= self.spicule_reach {
            let hit = self
                .spicules
                .iter()
                .any(|s| segment_sdf(p, s.root, s.tip, s.root_radius, s.tip_radius) < 0.0);
            if hit {
                let noise = smooth_noise(p * 0.5 + self.noise_offset);
                return Some(LesionSample {
                    region: LesionRegion::Spicule,
                    intensity: self.base_intensity + self.tissue.spicule_noise * noise,
                });
            }
        }
        None
    }

    /// Writes this lesion into one slab. Later lesions overwrite earlier ones.
    pub fn stamp(&self, slab: &mut Slab<'_>, dims: Dims, bounds: &VoxelBounds) -> usize {
        if !bounds.z.contains(&slab.z) {
            return 0;
        }
        let mut written = 0;
        for y in bounds.y.clone() {
            for x in bounds.x.clone() {
                let p = Vec3::new(x as f32, y as f32, slab.z as f32);
                if let Some(sample) = self.sample(p) {
                    let i = dims.index(x, y, 0);
                    slab.intensity[i] = sample.intensity;
                    slab.mask[i] = 1;
                    slab.labels[i] = self.kind.label();
                    written += 1;
                }
            }
        }
        written
    }
}

fn build_spicules(seed: Seed, center: Vec3, radii: Vec3, shape: &IrregularShape) -> (Vec<Spicule>, f32) {
    let mut rng = SeededRandom::new(seed.0);
    let min_radius = radii.min_element();
    let count = rng.range_usize(8, 16);
    let mut reach: f32 = 0.0;
    let spicules = (0..count)
        .map(|_| {
            let dir = rng.unit_vector();
            let root = center + dir * shape.radius_along(dir) * 0.9 * radii;
            let outward = (dir * radii).normalize_or_zero();
            let length = min_radius * rng.range(0.6, 1.3);
            let tip = root + outward * length;
            let root_radius = (min_radius * rng.range(0.07, 0.13)).max(0.9);
            let tip_radius = root_radius * 0.25;
            reach = reach.max(((tip - center) / radii).length() + root_radius / min_radius);
            Spicule { root, tip, root_radius, tip_radius }
        })
        .collect();
    (spicules, reach)
}

/// Peritumoral edema: a larger, smoother halo blended by distance.
#[derive(Debug, Clone)]
pub struct EdemaHalo {
    center: Vec3,
    radii: Vec3,
    shape: IrregularShape,
    strength: f32,
}

impl EdemaHalo {
    pub fn around(lesion: &LesionModel, heterogeneity: f32, seed: Seed) -> Self {
        let mut rng = SeededRandom::new(seed.0);
        let scale = rng.range(1.7, 2.0);
        let shape = IrregularShape::new(&mut rng, 0.15, 0.08);
        Self {
            center: lesion.center,
            radii: lesion.radii * scale,
            shape,
            strength: 0.55 + 0.4 * heterogeneity.clamp(0.0, 1.0),
        }
    }

    /// Blend weight in `[0, strength]`; zero outside the halo.
    pub fn weight(&self, p: Vec3) -> f32 {
        let q = (p - self.center) / self.radii;
        let r = q.length();
        if r > self.shape.max_radius() {
            return 0.0;
        }
        let dir = if r > 1e-6 { q / r } else { Vec3::Z };
        let relative = r / self.shape.radius_along(dir);
        (1.0 - smoothstep(0.55, 1.0, relative)) * self.strength
    }
}

/// Lymph node drawn as a small ellipsoid, not through the full lesion model.
#[derive(Debug, Clone)]
pub struct LymphNodeStamp {
    center: Vec3,
    radii: Vec3,
    suspicious: bool,
    hilum_offset: Vec3,
    noise_offset: Vec3,
}

impl LymphNodeStamp {
    pub fn new(spec: &LymphNodeSpec, seed: Seed, dims: Dims) -> Self {
        let extent = dims.as_vec3();
        let mut rng = SeededRandom::new(seed.0);
        let center = (Vec3::from(spec.location) * extent).clamp(Vec3::ZERO, extent - Vec3::ONE);
        let base = (spec.radius * extent).max(Vec3::splat(1.0));
        // benign nodes are flattened ovoids, suspicious ones round and enlarged
        let radii = if spec.suspicious {
            base * 1.3
        } else {
            base * Vec3::new(1.0, 0.65, 1.2)
        };
        let hilum_offset = rng.unit_vector() * 0.45;
        let noise_offset = Vec3::new(rng.range(0.0, 64.0), rng.range(0.0, 64.0), rng.range(0.0, 64.0));
        Self { center, radii, suspicious: spec.suspicious, hilum_offset, noise_offset }
    }

    pub fn suspicious(&self) -> bool {
        self.suspicious
    }

    pub fn bounds(&self, dims: Dims) -> VoxelBounds {
        VoxelBounds::around(self.center, self.radii * 1.2 + Vec3::ONE, dims)
    }

    /// `(intensity, coverage)`; coverage fades to zero across the capsule.
    pub fn sample(&self, p: Vec3) -> Option<(f32, f32)> {
        let q = (p - self.center) / self.radii;
        let wobble = if self.suspicious { 0.08 * smooth_noise(q * 3.0 + self.noise_offset) } else { 0.0 };
        let sd = q.length() - (1.0 + wobble);
        if sd >= 0.0 {
            return None;
        }
        let coverage = 1.0 - smoothstep(-0.15, 0.0, sd);
        let texture = fbm_noise(q * 2.0 + self.noise_offset, 2);
        let value = if self.suspicious {
            // heterogeneous with a thin enhancing capsule
            ct::NODE_SUSPICIOUS + 12.0 * texture + 20.0 * smoothstep(-0.25, 0.0, sd)
        } else if (q - self.hilum_offset).length() < 0.45 {
            ct::FAT_HILUM
        } else {
            ct::NODE + 4.0 * texture
        };
        Some((value, coverage))
    }

    pub fn stamp(&self, slab: &mut Slab<'_>, dims: Dims, bounds: &VoxelBounds) {
        if !bounds.z.contains(&slab.z) {
            return;
        }
        for y in bounds.y.clone() {
            for x in bounds.x.clone() {
                let p = Vec3::new(x as f32, y as f32, slab.z as f32);
                if let Some((value, coverage)) = self.sample(p) {
                    let i = dims.index(x, y, 0);
                    slab.intensity[i] += (value - slab.intensity[i]) * coverage;
                    if self.suspicious && slab.labels[i] == 0 {
                        slab.labels[i] = FindingKind::LymphNode.label();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ellipsoid_sdf;

    fn dims() -> Dims {
        Dims::new(96, 96, 64)
    }

    fn spec() -> LesionSpec {
        LesionSpec {
            location: [0.5, 0.5, 0.5],
            size: [0.2, 0.2, 0.25],
            intensity: 45.0,
            heterogeneity: 0.4,
            necrosis: Some(0.2),
            enhancement: Some(0.8),
            spiculated: false,
            infiltrative: false,
        }
    }

    fn scan(model: &LesionModel) -> Vec<(Vec3, LesionSample)> {
        let bounds = model.bounds(dims());
        let mut out = Vec::new();
        for z in bounds.z.clone() {
            for y in bounds.y.clone() {
                for x in bounds.x.clone() {
                    let p = Vec3::new(x as f32, y as f32, z as f32);
                    if let Some(s) = model.sample(p) {
                        out.push((p, s));
                    }
                }
            }
        }
        out
    }

    fn mean(samples: &[(Vec3, LesionSample)], region: LesionRegion) -> f32 {
        let values: Vec<f32> = samples
            .iter()
            .filter(|(_, s)| s.region == region)
            .map(|(_, s)| s.intensity)
            .collect();
        assert!(!values.is_empty(), "no {region:?} voxels");
        values.iter().sum::<f32>() / values.len() as f32
    }

    #[test]
    fn necrotic_solid_rim_ordering() {
        for modality in [Modality::Ct, Modality::Mri] {
            let mut spec = spec();
            if modality == Modality::Mri {
                spec.intensity = 600.0;
            }
            let model = LesionModel::new(&spec, Seed(1234), dims(), modality, FindingKind::Primary);
            let samples = scan(&model);
            let necrotic = mean(&samples, LesionRegion::Necrotic);
            let solid = mean(&samples, LesionRegion::Solid);
            let rim = mean(&samples, LesionRegion::Rim);
            assert!(necrotic < solid && solid < rim, "{modality:?}: {necrotic} {solid} {rim}");
        }
    }

    #[test]
    fn same_seed_same_lesion() {
        let a = LesionModel::new(&spec(), Seed(99), dims(), Modality::Ct, FindingKind::Primary);
        let b = LesionModel::new(&spec(), Seed(99), dims(), Modality::Ct, FindingKind::Primary);
        let c = LesionModel::new(&spec(), Seed(100), dims(), Modality::Ct, FindingKind::Primary);
        assert_eq!(scan(&a), scan(&b));
        assert_ne!(scan(&a), scan(&c));
    }

    #[test]
    fn lobulated_surface_leaves_the_base_ellipsoid() {
        let model = LesionModel::new(&spec(), Seed(7), dims(), Modality::Ct, FindingKind::Primary);
        let samples = scan(&model);
        let outside = samples
            .iter()
            .filter(|(p, _)| ellipsoid_sdf(*p, model.center(), model.radii()) > 0.0)
            .count();
        assert!(outside > 0);
        assert!(model.shape().max_radius() > 1.0);
    }

    #[test]
    fn spicules_reach_beyond_the_body() {
        let mut spiky = spec();
        spiky.spiculated = true;
        spiky.necrosis = None;
        let model = LesionModel::new(&spiky, Seed(5), dims(), Modality::Ct, FindingKind::Primary);
        let samples = scan(&model);
        assert!(samples.iter().any(|(_, s)| s.region == LesionRegion::Spicule));
        let plain = LesionModel::new(&spec(), Seed(5), dims(), Modality::Ct, FindingKind::Primary);
        assert!(scan(&plain).iter().all(|(_, s)| s.region != LesionRegion::Spicule));
    }

    #[test]
    fn tiny_lesions_still_occupy_their_centre() {
        let mut tiny = spec();
        tiny.size = [0.001, 0.001, 0.001];
        tiny.location = [0.333, 0.777, 0.1];
        let model = LesionModel::new(&tiny, Seed(3), dims(), Modality::Ct, FindingKind::Metastasis);
        let c = model.center().round();
        assert!(model.sample(c).is_some());
    }

    #[test]
    fn oversized_lesions_are_clipped_to_the_volume() {
        let mut huge = spec();
        huge.location = [0.95, 0.05, 0.5];
        huge.size = [0.9, 0.9, 0.9];
        let model = LesionModel::new(&huge, Seed(11), dims(), Modality::Ct, FindingKind::Primary);
        let bounds = model.bounds(dims());
        assert!(bounds.x.end <= 96 && bounds.y.end <= 96 && bounds.z.end <= 64);
        assert!(!bounds.is_empty());
    }

    #[test]
    fn edema_fades_with_distance() {
        let model = LesionModel::new(&spec(), Seed(21), dims(), Modality::Mri, FindingKind::Primary);
        let halo = EdemaHalo::around(&model, 0.5, Seed(22));
        let c = model.center();
        assert!(halo.weight(c) > 0.5);
        assert_eq!(halo.weight(c + Vec3::new(90.0, 0.0, 0.0)), 0.0);
        let near = halo.weight(c + Vec3::new(model.radii().x * 1.1, 0.0, 0.0));
        let far = halo.weight(c + Vec3::new(model.radii().x * 1.9, 0.0, 0.0));
        assert!(near >= far);
    }

    #[test]
    fn benign_nodes_have_a_fatty_hilum() {
        let node = LymphNodeSpec { location: [0.5, 0.5, 0.5], radius: 0.08, suspicious: false };
        let stamp = LymphNodeStamp::new(&node, Seed(4), dims());
        let bounds = stamp.bounds(dims());
        let mut fat = 0;
        for z in bounds.z.clone() {
            for y in bounds.y.clone() {
                for x in bounds.x.clone() {
                    if let Some((v, _)) = stamp.sample(Vec3::new(x as f32, y as f32, z as f32)) {
                        if v == ct::FAT_HILUM {
                            fat += 1;
                        }
                    }
                }
            }
        }
        assert!(fat > 0);
    }
}
