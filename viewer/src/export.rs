use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use log::debug;
use serde::Serialize;
use volsynth_engine::{Axis, RenderOptions, SliceImage, Volume, VolumeMetadata, Window};

use crate::options::SliceSelection;

pub fn slice_file_name(case_id: &str, axis: Axis, index: usize) -> String {
    format!("{}_{}_{}.png", case_id, axis.as_str(), index)
}

pub fn write_png(image: &SliceImage, path: &Path) -> Result<()> {
    let buffer = image::RgbaImage::from_raw(image.width as u32, image.height as u32, image.rgba.clone())
        .context("slice pixels do not match the slice size")?;
    buffer.save(path).with_context(|| format!("failed to write {}", path.display()))
}

/// Renders the selected slices into `dir`, returning the written paths.
pub fn export_slices(
    volume: &Volume,
    axis: Axis,
    slices: SliceSelection,
    render: &RenderOptions,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let extent = volume.dims().extent(axis);
    let case_id = &volume.metadata().case_id;
    let mut written = Vec::new();
    for index in slices.indices(extent) {
        let image = volume.get_slice_as_image_data(axis, index, render);
        let clamped = volsynth_engine::render::clamp_index(index, extent);
        let path = dir.join(slice_file_name(case_id, axis, clamped));
        write_png(&image, &path)?;
        debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataReport<'a> {
    #[serde(flatten)]
    metadata: &'a VolumeMetadata,
    default_window: Window,
    tumor_voxels: usize,
}

pub fn write_metadata(volume: &Volume, dir: &Path) -> Result<PathBuf> {
    let report = MetadataReport {
        metadata: volume.metadata(),
        default_window: volume.default_window(),
        tumor_voxels: volume.mask_voxel_count(),
    };
    let path = dir.join(format!("{}_metadata.json", volume.metadata().case_id));
    let json = serde_json::to_string_pretty(&report).context("failed to serialize volume metadata")?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
