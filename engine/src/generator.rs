//! Volume assembly: picks the anatomical field for a case, fills the voxel
//! buffers slab by slab and stamps lymph nodes, primaries and metastases.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::anatomy::{AnatomicalField, Anatomy, FieldPoint};
use crate::api::{Modality, Seed, SynthError, VolumeType};
use crate::lesion::{EdemaHalo, LesionModel, LesionSpec, LymphNodeStamp};
use crate::math::{voxel_hash, SeededRandom};
use crate::registry::{CaseConfig, CaseRegistry};
use crate::tissue;
use crate::volume::{Dims, FindingKind, Slab, Volume, VolumeBuffers, VolumeMetadata, VoxelBounds};

/// Slice count the nominal slice thicknesses refer to.
const REFERENCE_DEPTH: f32 = 100.0;
const EDEMA_SEED_OFFSET: u32 = 31_337;

/// Synthesizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Fill z-slabs on the rayon pool.
    pub parallel: bool,
    /// Size of a dedicated pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub acquisition_noise: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
            acquisition_noise: true,
        }
    }
}

/// Shared flag checked once per slab. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything drawn from the case seed, fixed before any voxel is written.
struct SynthesisPlan {
    case_id: String,
    seed: Seed,
    dims: Dims,
    anatomy: Anatomy,
    modality: Modality,
    lesions: Vec<(LesionModel, VoxelBounds)>,
    nodes: Vec<(LymphNodeStamp, VoxelBounds)>,
    noise_sigma: f32,
    noise_offset: Vec3,
    body_part: String,
    series_description: String,
}

impl SynthesisPlan {
    fn new(case: &CaseConfig, dims: Dims, acquisition_noise: bool) -> Self {
        let seed = Seed::from_case_id(&case.case_id);
        let anatomy = Anatomy::new(case.volume_type, seed);
        let modality = anatomy.modality();
        if modality != case.modality {
            warn!(
                "Case '{}' declares {} but its volume type renders as {}",
                case.case_id,
                case.modality.as_str(),
                modality.as_str()
            );
        }

        let declared: Vec<(&LesionSpec, Seed, FindingKind)> = case
            .tumors
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec, seed.primary(i), FindingKind::Primary))
            .chain(
                case.metastases
                    .iter()
                    .enumerate()
                    .map(|(i, spec)| (spec, seed.metastasis(i), FindingKind::Metastasis)),
            )
            .collect();

        let models: Vec<LesionModel> = declared
            .iter()
            .map(|&(spec, lesion_seed, kind)| {
                let model = LesionModel::new(spec, lesion_seed, dims, modality, kind);
                debug!(
                    "{:?} lesion at {:?} radii {:?} (seed {:#010x})",
                    kind,
                    model.center(),
                    model.radii(),
                    lesion_seed.0
                );
                model
            })
            .collect();

        let anatomy = if anatomy.wants_edema() {
            let halos = declared
                .iter()
                .zip(&models)
                .map(|(&(spec, lesion_seed, _), model)| {
                    EdemaHalo::around(model, spec.heterogeneity, lesion_seed.offset(EDEMA_SEED_OFFSET))
                })
                .collect();
            anatomy.with_edema(halos)
        } else {
            anatomy
        };

        let nodes = if anatomy.accepts_lymph_nodes() {
            case.lymph_nodes
                .iter()
                .enumerate()
                .map(|(i, spec)| {
                    let stamp = LymphNodeStamp::new(spec, seed.lymph_node(i), dims);
                    let bounds = stamp.bounds(dims);
                    (stamp, bounds)
                })
                .collect()
        } else {
            if !case.lymph_nodes.is_empty() {
                warn!("Case '{}': lymph nodes are not drawn on this volume type", case.case_id);
            }
            Vec::new()
        };

        let lesions = models
            .into_iter()
            .map(|model| {
                let bounds = model.bounds(dims);
                (model, bounds)
            })
            .collect();

        let mut rng = SeededRandom::new(seed.offset(17).0);
        let noise_offset = Vec3::new(rng.range(0.0, 100.0), rng.range(0.0, 100.0), rng.range(0.0, 100.0));

        Self {
            case_id: case.case_id.clone(),
            seed,
            dims,
            modality,
            lesions,
            nodes,
            noise_sigma: if acquisition_noise { tissue::acquisition_noise(modality) } else { 0.0 },
            noise_offset,
            body_part: case.body_part.clone().unwrap_or_else(|| anatomy.body_part().to_string()),
            series_description: case
                .series_description
                .clone()
                .unwrap_or_else(|| anatomy.series_description().to_string()),
            anatomy,
        }
    }

    fn background(&self) -> f32 {
        match self.modality {
            Modality::Ct => tissue::ct::AIR,
            Modality::Mri => tissue::mri::BACKGROUND,
        }
    }

    /// Field, then nodes, then lesions in declaration order. Returns the
    /// number of lesion voxels written.
    fn fill_slab(&self, slab: &mut Slab<'_>) -> usize {
        let dims = self.dims;
        let z = slab.z;
        for y in 0..dims.height {
            for x in 0..dims.width {
                let point = FieldPoint::new(x, y, z, dims, self.noise_offset);
                let mut value = self.anatomy.intensity_at(&point);
                if self.noise_sigma > 0.0 {
                    value += voxel_hash(x, y, z, self.seed.0) * self.noise_sigma;
                }
                if self.modality == Modality::Mri {
                    // magnitude images are never negative
                    value = value.abs();
                }
                slab.intensity[dims.index(x, y, 0)] = value;
            }
        }
        for (node, bounds) in &self.nodes {
            node.stamp(slab, dims, bounds);
        }
        self.lesions
            .iter()
            .map(|(lesion, bounds)| lesion.stamp(slab, dims, bounds))
            .sum()
    }

    fn fill_sequential(&self, buffers: &mut VolumeBuffers, cancel: &CancelToken) -> Result<usize, SynthError> {
        let mut written = 0;
        for mut slab in buffers.slabs_mut(0..self.dims.depth) {
            if cancel.is_cancelled() {
                return Err(SynthError::Cancelled);
            }
            written += self.fill_slab(&mut slab);
        }
        Ok(written)
    }

    fn fill_parallel(&self, buffers: &mut VolumeBuffers, cancel: &CancelToken) -> Result<usize, SynthError> {
        buffers
            .par_slabs_mut(0..self.dims.depth)
            .map(|mut slab| {
                if cancel.is_cancelled() {
                    return Err(SynthError::Cancelled);
                }
                Ok(self.fill_slab(&mut slab))
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))
    }

    fn metadata(&self) -> VolumeMetadata {
        let fov = self.anatomy.field_of_view_mm();
        let thickness = self.anatomy.slice_thickness_mm() * REFERENCE_DEPTH / self.dims.depth as f32;
        VolumeMetadata {
            case_id: self.case_id.clone(),
            shape: [self.dims.depth, self.dims.height, self.dims.width],
            spacing: [thickness, fov / self.dims.height as f32, fov / self.dims.width as f32],
            origin: [-fov / 2.0, -fov / 2.0, 0.0],
            modality: self.modality,
            body_part: self.body_part.clone(),
            series_description: self.series_description.clone(),
            seed: self.seed.0,
        }
    }
}

/// Builds volumes for cases in a registry.
pub struct VolumeSynthesizer {
    registry: CaseRegistry,
    config: SynthConfig,
    pool: Option<rayon::ThreadPool>,
}

impl VolumeSynthesizer {
    pub fn new(registry: CaseRegistry, config: SynthConfig) -> Result<Self, SynthError> {
        let pool = match config.threads {
            Some(threads) if config.parallel => {
                let threads = threads.max(1);
                info!("Creating volume synthesis thread pool with {} threads", threads);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("volume_synthesis_{}", i))
                    .build()?;
                Some(pool)
            }
            _ => None,
        };
        Ok(Self { registry, config, pool })
    }

    pub fn registry(&self) -> &CaseRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn generate(&self, case_id: &str, width: usize, height: usize, depth: usize) -> Result<Volume, SynthError> {
        self.generate_with_cancel(case_id, width, height, depth, &CancelToken::new())
    }

    pub fn generate_with_cancel(
        &self,
        case_id: &str,
        width: usize,
        height: usize,
        depth: usize,
        cancel: &CancelToken,
    ) -> Result<Volume, SynthError> {
        let case = self.registry.resolve(case_id);
        self.generate_case(&case, Dims::new(width, height, depth), cancel)
    }

    /// Generates `case` directly, bypassing the registry lookup.
    pub fn generate_case(&self, case: &CaseConfig, dims: Dims, cancel: &CancelToken) -> Result<Volume, SynthError> {
        let started = Instant::now();
        let case = if case.volume_type == VolumeType::Unrecognized {
            warn!("Case '{}' has an unrecognized volume type, generating the default chest CT", case.case_id);
            Cow::Owned(CaseConfig::fallback(&case.case_id))
        } else {
            Cow::Borrowed(case)
        };
        let dims = Dims::new(dims.width, dims.height, dims.depth);

        info!(
            "Generating '{}' ({:?}) at {}x{}x{} with {} lesions",
            case.case_id,
            case.volume_type,
            dims.width,
            dims.height,
            dims.depth,
            case.lesion_count()
        );
        if cancel.is_cancelled() {
            return Err(SynthError::Cancelled);
        }

        let plan = SynthesisPlan::new(&case, dims, self.config.acquisition_noise);
        let mut buffers = VolumeBuffers::allocate(dims, plan.background())?;
        let written = match (&self.pool, self.config.parallel) {
            (Some(pool), _) => pool.install(|| plan.fill_parallel(&mut buffers, cancel))?,
            (None, true) => plan.fill_parallel(&mut buffers, cancel)?,
            (None, false) => plan.fill_sequential(&mut buffers, cancel)?,
        };
        if written == 0 && case.lesion_count() > 0 {
            warn!("Case '{}': no lesion voxel landed inside the volume", case.case_id);
        }

        let volume = buffers.into_volume(plan.metadata(), case.default_window)?;
        info!(
            "Generated '{}' in {:.2?} ({} lesion voxels)",
            case.case_id,
            started.elapsed(),
            volume.mask_voxel_count()
        );
        Ok(volume)
    }
}

/// Generates a case from the built-in catalogue with the default configuration.
pub fn generate(case_id: &str, width: usize, height: usize, depth: usize) -> Result<Volume, SynthError> {
    VolumeSynthesizer::new(CaseRegistry::builtin(), SynthConfig::default())?.generate(case_id, width, height, depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(parallel: bool) -> VolumeSynthesizer {
        let config = SynthConfig { parallel, ..SynthConfig::default() };
        VolumeSynthesizer::new(CaseRegistry::builtin(), config).unwrap()
    }

    #[test]
    fn parallel_and_sequential_fills_agree() {
        let a = synth(true).generate("colorectal-msi-h-mets", 40, 36, 24).unwrap();
        let b = synth(false).generate("colorectal-msi-h-mets", 40, 36, 24).unwrap();
        assert_eq!(a.intensity(), b.intensity());
        assert_eq!(a.mask(), b.mask());
        assert_eq!(a.labels(), b.labels());
    }

    #[test]
    fn pre_cancelled_builds_fail() {
        let token = CancelToken::new();
        token.cancel();
        let err = synth(true).generate_with_cancel("lung-nsclc-kras-g12c", 32, 32, 16, &token).unwrap_err();
        assert!(matches!(err, SynthError::Cancelled));
    }

    #[test]
    fn metadata_scales_slice_thickness() {
        let volume = synth(false).generate("lung-nsclc-kras-g12c", 64, 48, 50).unwrap();
        let meta = volume.metadata();
        assert_eq!(meta.shape, [50, 48, 64]);
        assert!((meta.spacing[0] - 5.0).abs() < 1e-4);
        assert!((meta.spacing[2] - 360.0 / 64.0).abs() < 1e-4);
        assert_eq!(meta.origin, [-180.0, -180.0, 0.0]);
        assert_eq!(meta.modality, Modality::Ct);
        assert_eq!(meta.seed, Seed::from_case_id("lung-nsclc-kras-g12c").0);
    }

    #[test]
    fn zero_dimensions_are_clamped() {
        let volume = synth(false).generate("breast-her2-early", 0, 8, 0).unwrap();
        assert_eq!(volume.dims(), Dims::new(1, 8, 1));
        assert_eq!(volume.intensity().len(), 8);
    }

    #[test]
    fn unrecognized_volume_type_renders_the_default_chest() {
        let mut case = CaseConfig::fallback("mystery");
        case.volume_type = VolumeType::Unrecognized;
        case.tumors.clear();
        let volume = synth(false).generate_case(&case, Dims::new(48, 48, 24), &CancelToken::new()).unwrap();
        assert_eq!(volume.metadata().body_part, "CHEST");
        assert!(volume.mask_voxel_count() > 0);
    }

    #[test]
    fn mri_intensities_are_non_negative() {
        let volume = synth(true).generate("pediatric-gbm-brain", 32, 32, 16).unwrap();
        assert!(volume.intensity().iter().all(|&v| v >= 0.0));
        assert_eq!(volume.metadata().modality, Modality::Mri);
    }

    #[test]
    fn dedicated_pool_matches_global_pool() {
        let config = SynthConfig { threads: Some(2), ..SynthConfig::default() };
        let pooled = VolumeSynthesizer::new(CaseRegistry::builtin(), config).unwrap();
        let a = pooled.generate("gastric-stage-iii", 24, 24, 12).unwrap();
        let b = synth(true).generate("gastric-stage-iii", 24, 24, 12).unwrap();
        assert_eq!(a.intensity(), b.intensity());
    }
}
