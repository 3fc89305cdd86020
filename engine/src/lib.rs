//! Procedural synthetic CT/MRI volumes for oncology cases.
//!
//! A case id resolves to a [`CaseConfig`]; the [`VolumeSynthesizer`] draws a
//! deterministic anatomy for its volume type, stamps the declared lesions and
//! returns a [`Volume`] with intensity, occupancy mask and finding labels.
//! [`Volume`] also renders slices to RGBA for viewers.

pub mod anatomy;
pub mod api;
pub mod generator;
pub mod lesion;
pub mod math;
pub mod registry;
pub mod render;
pub mod storage;
pub mod tissue;
pub mod volume;

pub use api::{Axis, Modality, Seed, SynthError, VolumeType, Window};
pub use generator::{generate, CancelToken, SynthConfig, VolumeSynthesizer};
pub use registry::{CaseConfig, CaseRegistry};
pub use render::{Plane, RenderOptions, SliceImage};
pub use storage::{BuildTicket, VolumeCache, VolumeKey, VolumeSlot};
pub use volume::{Dims, FindingKind, Volume, VolumeMetadata};
