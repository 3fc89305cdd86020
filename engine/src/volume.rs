use std::fmt;
use std::ops::Range;

use glam::Vec3;
use ndarray::Array3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::api::{Axis, Modality, SynthError, Window};

/// Voxel extent of a volume. Every axis is at least one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dims {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dims {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self { width: width.max(1), height: height.max(1), depth: depth.max(1) }
    }

    pub fn checked_voxel_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)?.checked_mul(self.depth)
    }

    pub fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn plane_len(&self) -> usize {
        self.width * self.height
    }

    /// Row-major z -> y -> x. The only place voxel offsets are computed.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.height + y) * self.width + x
    }

    /// Number of slices along `axis`.
    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::Axial => self.depth,
            Axis::Coronal => self.height,
            Axis::Sagittal => self.width,
        }
    }

    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.width as f32, self.height as f32, self.depth as f32)
    }

    /// `(depth, height, width)`, the ndarray shape of the voxel buffers.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.depth, self.height, self.width)
    }
}

/// Half-open voxel box, already clipped to the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelBounds {
    pub x: Range<usize>,
    pub y: Range<usize>,
    pub z: Range<usize>,
}

impl VoxelBounds {
    pub fn around(center: Vec3, half_extent: Vec3, dims: Dims) -> Self {
        let lo = (center - half_extent).floor().max(Vec3::ZERO);
        let hi = (center + half_extent).ceil() + Vec3::ONE;
        let clip = |lo: f32, hi: f32, extent: usize| {
            let end = (hi.max(0.0) as usize).min(extent);
            (lo as usize).min(end)..end
        };
        Self {
            x: clip(lo.x, hi.x, dims.width),
            y: clip(lo.y, hi.y, dims.height),
            z: clip(lo.z, hi.z, dims.depth),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }
}

/// What a masked (or labelled) voxel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FindingKind {
    Primary = 1,
    Metastasis = 2,
    /// Suspicious node. Labelled, never part of the occupancy mask.
    LymphNode = 3,
}

impl FindingKind {
    pub fn from_label(label: u8) -> Option<Self> {
        match label {
            1 => Some(FindingKind::Primary),
            2 => Some(FindingKind::Metastasis),
            3 => Some(FindingKind::LymphNode),
            _ => None,
        }
    }

    pub fn label(self) -> u8 {
        self as u8
    }

    /// Annotation colour used for contours.
    pub fn color(self) -> [u8; 3] {
        match self {
            FindingKind::Primary => [0xFF, 0x32, 0x32],
            FindingKind::Metastasis => [0x99, 0x32, 0xFF],
            FindingKind::LymphNode => [0xFF, 0xB7, 0x32],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMetadata {
    pub case_id: String,
    /// `[depth, height, width]`
    pub shape: [usize; 3],
    /// mm per voxel, `[z, y, x]`
    pub spacing: [f32; 3],
    /// `[x, y, z]` in mm
    pub origin: [f32; 3],
    pub modality: Modality,
    pub body_part: String,
    pub series_description: String,
    pub seed: u32,
}

/// One z-plane of every buffer, handed to slab workers.
pub struct Slab<'a> {
    pub z: usize,
    pub intensity: &'a mut [f32],
    pub mask: &'a mut [u8],
    pub labels: &'a mut [u8],
}

/// Preallocated flat buffers written during generation. Sized once.
pub struct VolumeBuffers {
    dims: Dims,
    intensity: Vec<f32>,
    mask: Vec<u8>,
    labels: Vec<u8>,
}

fn try_filled<T: Clone>(len: usize, value: T) -> Result<Vec<T>, SynthError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| SynthError::OutOfMemory { voxels: len })?;
    buffer.resize(len, value);
    Ok(buffer)
}

impl VolumeBuffers {
    pub fn allocate(dims: Dims, fill: f32) -> Result<Self, SynthError> {
        let voxels = dims
            .checked_voxel_count()
            .ok_or(SynthError::OutOfMemory { voxels: usize::MAX })?;
        Ok(Self {
            dims,
            intensity: try_filled(voxels, fill)?,
            mask: try_filled(voxels, 0u8)?,
            labels: try_filled(voxels, 0u8)?,
        })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    fn span(&self, z_range: &Range<usize>) -> Range<usize> {
        let plane = self.dims.plane_len();
        let end = z_range.end.min(self.dims.depth);
        let start = z_range.start.min(end);
        start * plane..end * plane
    }

    pub fn slabs_mut(&mut self, z_range: Range<usize>) -> impl Iterator<Item = Slab<'_>> + '_ {
        let plane = self.dims.plane_len();
        let span = self.span(&z_range);
        let first = span.start / plane;
        self.intensity[span.clone()]
            .chunks_mut(plane)
            .zip(self.mask[span.clone()].chunks_mut(plane))
            .zip(self.labels[span].chunks_mut(plane))
            .enumerate()
            .map(move |(i, ((intensity, mask), labels))| Slab { z: first + i, intensity, mask, labels })
    }

    pub fn par_slabs_mut(
        &mut self,
        z_range: Range<usize>,
    ) -> impl IndexedParallelIterator<Item = Slab<'_>> + '_ {
        let plane = self.dims.plane_len();
        let span = self.span(&z_range);
        let first = span.start / plane;
        self.intensity[span.clone()]
            .par_chunks_mut(plane)
            .zip(self.mask[span.clone()].par_chunks_mut(plane))
            .zip(self.labels[span].par_chunks_mut(plane))
            .enumerate()
            .map(move |(i, ((intensity, mask), labels))| Slab { z: first + i, intensity, mask, labels })
    }

    pub(crate) fn into_volume(
        self,
        metadata: VolumeMetadata,
        default_window: Window,
    ) -> Result<Volume, SynthError> {
        let shape = self.dims.shape();
        Ok(Volume {
            dims: self.dims,
            intensity: Array3::from_shape_vec(shape, self.intensity)?,
            mask: Array3::from_shape_vec(shape, self.mask)?,
            labels: Array3::from_shape_vec(shape, self.labels)?,
            metadata,
            default_window,
        })
    }
}

/// A generated volume. Immutable; regenerate instead of mutating.
#[derive(Clone)]
pub struct Volume {
    pub(crate) dims: Dims,
    pub(crate) intensity: Array3<f32>,
    pub(crate) mask: Array3<u8>,
    pub(crate) labels: Array3<u8>,
    pub(crate) metadata: VolumeMetadata,
    pub(crate) default_window: Window,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("dims", &self.dims)
            .field("metadata", &self.metadata)
            .field("default_window", &self.default_window)
            .field("masked_voxels", &self.mask_voxel_count())
            .finish()
    }
}

impl Volume {
    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn metadata(&self) -> &VolumeMetadata {
        &self.metadata
    }

    pub fn default_window(&self) -> Window {
        self.default_window
    }

    /// Intensities indexed `[z, y, x]`.
    pub fn intensity(&self) -> &Array3<f32> {
        &self.intensity
    }

    pub fn mask(&self) -> &Array3<u8> {
        &self.mask
    }

    pub fn labels(&self) -> &Array3<u8> {
        &self.labels
    }

    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<f32> {
        self.intensity.get((z, y, x)).copied()
    }

    pub fn mask_at(&self, x: usize, y: usize, z: usize) -> bool {
        self.mask.get((z, y, x)).map_or(false, |&m| m != 0)
    }

    pub fn finding_at(&self, x: usize, y: usize, z: usize) -> Option<FindingKind> {
        self.labels.get((z, y, x)).and_then(|&l| FindingKind::from_label(l))
    }

    pub fn mask_voxel_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_row_major_z_y_x() {
        let dims = Dims::new(4, 3, 2);
        assert_eq!(dims.index(0, 0, 0), 0);
        assert_eq!(dims.index(1, 0, 0), 1);
        assert_eq!(dims.index(0, 1, 0), 4);
        assert_eq!(dims.index(0, 0, 1), 12);
        assert_eq!(dims.index(3, 2, 1), dims.voxel_count() - 1);
    }

    #[test]
    fn zero_extents_are_clamped() {
        let dims = Dims::new(0, 5, 0);
        assert_eq!((dims.width, dims.height, dims.depth), (1, 5, 1));
    }

    #[test]
    fn slabs_cover_requested_planes() {
        let dims = Dims::new(3, 2, 5);
        let mut buffers = VolumeBuffers::allocate(dims, 0.0).unwrap();
        for mut slab in buffers.slabs_mut(1..3) {
            assert_eq!(slab.intensity.len(), dims.plane_len());
            slab.intensity.iter_mut().for_each(|v| *v = slab.z as f32);
        }
        let zs: Vec<usize> = buffers.par_slabs_mut(0..5).map(|s| s.z).collect();
        assert_eq!(zs, vec![0, 1, 2, 3, 4]);

        let volume = buffers.into_volume(metadata(), Window::default()).unwrap();
        assert_eq!(volume.voxel(2, 1, 1), Some(1.0));
        assert_eq!(volume.voxel(0, 0, 2), Some(2.0));
        assert_eq!(volume.voxel(0, 0, 3), Some(0.0));
        assert_eq!(volume.voxel(3, 0, 0), None);
    }

    #[test]
    fn absurd_sizes_fail_softly() {
        let dims = Dims::new(usize::MAX / 2, 4, 4);
        assert!(matches!(VolumeBuffers::allocate(dims, 0.0), Err(SynthError::OutOfMemory { .. })));
    }

    #[test]
    fn finding_labels_round_trip() {
        for kind in [FindingKind::Primary, FindingKind::Metastasis, FindingKind::LymphNode] {
            assert_eq!(FindingKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(FindingKind::from_label(0), None);
    }

    fn metadata() -> VolumeMetadata {
        VolumeMetadata {
            case_id: "test".into(),
            shape: [5, 2, 3],
            spacing: [1.0; 3],
            origin: [0.0; 3],
            modality: Modality::Ct,
            body_part: "CHEST".into(),
            series_description: "test".into(),
            seed: 0,
        }
    }
}
