//! Slice extraction and 8-bit rasterization for viewers.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::api::{Axis, Window};
use crate::volume::{FindingKind, Volume};

/// A 2D slice, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Copy> Plane<T> {
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }
}

/// Clamps a signed slice index into `[0, extent - 1]`.
pub fn clamp_index(index: i64, extent: usize) -> usize {
    let last = extent.saturating_sub(1) as i64;
    index.clamp(0, last) as usize
}

/// Axial planes are `height x width`, sagittal `depth x height`, coronal
/// `depth x width`. `view` is indexed `[z, y, x]`.
pub fn extract_slice<T: Copy>(view: ArrayView3<'_, T>, axis: Axis, index: i64) -> Plane<T> {
    let (depth, height, width) = view.dim();
    let (nd_axis, extent) = match axis {
        Axis::Axial => (0, depth),
        Axis::Coronal => (1, height),
        Axis::Sagittal => (2, width),
    };
    let plane = view.index_axis(ndarray::Axis(nd_axis), clamp_index(index, extent));
    let (rows, cols) = plane.dim();
    Plane { rows, cols, data: plane.iter().copied().collect() }
}

/// Linear window to 8-bit gray. Widths `<= 0` are treated as 1.
#[inline]
pub fn apply_window(value: f32, window: Window) -> u8 {
    let width = if window.width > 0.0 { window.width } else { 1.0 };
    let gray = (255.0 * (value - (window.center - width / 2.0)) / width).round();
    gray.clamp(0.0, 255.0) as u8
}

/// Reddens one RGBA pixel.
#[inline]
pub fn tint_overlay(pixel: &mut [u8]) {
    pixel[0] = (pixel[0] as f32 + (255.0 - pixel[0] as f32) * 0.45).round() as u8;
    pixel[1] = (pixel[1] as f32 * 0.65).round() as u8;
    pixel[2] = (pixel[2] as f32 * 0.65).round() as u8;
}

fn on_edge(mask: &[u8], rows: usize, cols: usize, row: usize, col: usize) -> bool {
    for dr in -1i64..=1 {
        for dc in -1i64..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let (r, c) = (row as i64 + dr, col as i64 + dc);
            // neighbours outside the plane do not count
            if r < 0 || c < 0 || r >= rows as i64 || c >= cols as i64 {
                continue;
            }
            if mask[r as usize * cols + c as usize] == 0 {
                return true;
            }
        }
    }
    false
}

/// Paints masked pixels that touch an unmasked 8-neighbour with
/// `colour_of(pixel_index)`.
pub fn draw_contour(rgba: &mut [u8], mask: &[u8], rows: usize, cols: usize, colour_of: impl Fn(usize) -> [u8; 3]) {
    for row in 0..rows {
        for col in 0..cols {
            let i = row * cols + col;
            if mask[i] != 0 && on_edge(mask, rows, cols, row, col) {
                let [r, g, b] = colour_of(i);
                rgba[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, 255]);
            }
        }
    }
}

/// Brightness (percent multiply) then contrast (`-255..=255`) on RGB; alpha
/// is left alone. `(100, 0)` is the identity and returns immediately.
pub fn post_process(rgba: &mut [u8], brightness: f32, contrast: f32) {
    if brightness == 100.0 && contrast == 0.0 {
        return;
    }
    let scale = brightness.max(0.0) / 100.0;
    let c = contrast.clamp(-255.0, 255.0);
    let factor = 259.0 * (c + 255.0) / (255.0 * (259.0 - c));
    for pixel in rgba.chunks_exact_mut(4) {
        for channel in &mut pixel[..3] {
            let v = (*channel as f32 * scale).clamp(0.0, 255.0);
            let v = (factor * (v - 128.0) + 128.0).clamp(0.0, 255.0);
            *channel = v.round() as u8;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// `None` uses the volume's default window.
    pub window: Option<Window>,
    pub show_overlay: bool,
    /// Percent, 100 = unchanged.
    pub brightness: f32,
    pub contrast: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            window: None,
            show_overlay: false,
            brightness: 100.0,
            contrast: 0.0,
        }
    }
}

/// RGBA8 pixels, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl Volume {
    pub fn get_slice(&self, axis: Axis, index: i64) -> Plane<f32> {
        extract_slice(self.intensity.view(), axis, index)
    }

    pub fn get_tumor_mask_slice(&self, axis: Axis, index: i64) -> Plane<u8> {
        extract_slice(self.mask.view(), axis, index)
    }

    pub fn get_label_slice(&self, axis: Axis, index: i64) -> Plane<u8> {
        extract_slice(self.labels.view(), axis, index)
    }

    /// Window, then tint and contour when `show_overlay`, then brightness/contrast.
    /// Only the tumour mask is outlined; lymph nodes stay in the label slice.
    pub fn get_slice_as_image_data(&self, axis: Axis, index: i64, options: &RenderOptions) -> SliceImage {
        let slice = self.get_slice(axis, index);
        let window = options.window.unwrap_or(self.default_window);
        let mut rgba = Vec::with_capacity(slice.data.len() * 4);
        for &value in &slice.data {
            let gray = apply_window(value, window);
            rgba.extend_from_slice(&[gray, gray, gray, 255]);
        }

        if options.show_overlay {
            let mask = self.get_tumor_mask_slice(axis, index);
            let labels = self.get_label_slice(axis, index);
            for (pixel, &m) in rgba.chunks_exact_mut(4).zip(&mask.data) {
                if m != 0 {
                    tint_overlay(pixel);
                }
            }
            draw_contour(&mut rgba, &mask.data, mask.rows, mask.cols, |i| {
                FindingKind::from_label(labels.data[i])
                    .unwrap_or(FindingKind::Primary)
                    .color()
            });
        }

        post_process(&mut rgba, options.brightness, options.contrast);
        SliceImage { width: slice.cols, height: slice.rows, rgba }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn window_is_monotonic_and_clamped() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let window = Window::new(rng.gen_range(-1000.0..1000.0), rng.gen_range(1.0..3000.0));
            let mut values: Vec<f32> = (0..200).map(|_| rng.gen_range(-5000.0..5000.0)).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let grays: Vec<u8> = values.iter().map(|&v| apply_window(v, window)).collect();
            assert!(grays.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(apply_window(window.lower() - 1000.0, window), 0);
            assert_eq!(apply_window(window.center + window.width / 2.0 + 1000.0, window), 255);
        }
    }

    #[test]
    fn lung_window_values() {
        // air sits 350 HU above the lower edge of a 1500 HU window
        assert_eq!(apply_window(-1000.0, Window::LUNG), 60);
        assert_eq!(apply_window(300.0, Window::LUNG), 255);
        assert_eq!(apply_window(-1350.0, Window::LUNG), 0);
        assert_eq!(apply_window(150.0, Window::LUNG), 255);
        assert!(apply_window(-1000.0, Window::LUNG) < apply_window(300.0, Window::LUNG));
    }

    #[test]
    fn degenerate_window_width() {
        let w = Window::new(0.0, 0.0);
        assert_eq!(apply_window(-1.0, w), 0);
        assert_eq!(apply_window(1.0, w), 255);
    }

    #[test]
    fn slice_shapes_and_index_clamping() {
        let volume = Array3::from_shape_fn((4, 3, 2), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let axial = extract_slice(volume.view(), Axis::Axial, 2);
        assert_eq!((axial.rows, axial.cols), (3, 2));
        assert_eq!(axial.get(1, 1), Some(211.0));
        let sagittal = extract_slice(volume.view(), Axis::Sagittal, 1);
        assert_eq!((sagittal.rows, sagittal.cols), (4, 3));
        assert_eq!(sagittal.get(3, 2), Some(321.0));
        let coronal = extract_slice(volume.view(), Axis::Coronal, 99);
        assert_eq!((coronal.rows, coronal.cols), (4, 2));
        assert_eq!(coronal.get(0, 0), Some(20.0));
        let below = extract_slice(volume.view(), Axis::Axial, -5);
        assert_eq!(below.get(0, 0), Some(0.0));
    }

    #[test]
    fn contour_only_on_mask_boundary() {
        let (rows, cols) = (7, 8);
        let mut rng = StdRng::seed_from_u64(3);
        let mask: Vec<u8> = (0..rows * cols).map(|_| u8::from(rng.gen_bool(0.5))).collect();
        let mut rgba = vec![0u8; rows * cols * 4];
        draw_contour(&mut rgba, &mask, rows, cols, |_| [255, 0, 0]);
        for row in 0..rows {
            for col in 0..cols {
                let i = row * cols + col;
                let painted = rgba[i * 4] == 255;
                if mask[i] == 0 {
                    assert!(!painted);
                } else {
                    assert_eq!(painted, on_edge(&mask, rows, cols, row, col));
                }
            }
        }

        // a filled block only has contour pixels on its border
        let mut block = vec![0u8; 25];
        for r in 1..4 {
            for c in 1..4 {
                block[r * 5 + c] = 1;
            }
        }
        let mut rgba = vec![0u8; 100];
        draw_contour(&mut rgba, &block, 5, 5, |_| [1, 2, 3]);
        assert_eq!(rgba[(2 * 5 + 2) * 4], 0);
        assert_eq!(&rgba[(1 * 5 + 1) * 4..(1 * 5 + 1) * 4 + 4], &[1, 2, 3, 255]);
    }

    #[test]
    fn plane_edges_are_not_contours() {
        let mask = vec![1u8; 9];
        let mut rgba = vec![0u8; 36];
        draw_contour(&mut rgba, &mask, 3, 3, |_| [9, 9, 9]);
        assert!(rgba.iter().all(|&b| b == 0));
    }

    #[test]
    fn post_process_identity_and_alpha() {
        let mut rgba = vec![10, 128, 250, 77];
        post_process(&mut rgba, 100.0, 0.0);
        assert_eq!(rgba, vec![10, 128, 250, 77]);
        post_process(&mut rgba, 200.0, 0.0);
        assert_eq!(rgba, vec![20, 255, 255, 77]);
        let mut flat = vec![100, 128, 200, 5];
        post_process(&mut flat, 100.0, -255.0);
        assert_eq!(flat, vec![128, 128, 128, 5]);
    }

    #[test]
    fn tint_keeps_red_dominant() {
        let mut pixel = [120, 120, 120, 255];
        tint_overlay(&mut pixel);
        assert!(pixel[0] > 120 && pixel[1] < 120 && pixel[2] < 120);
        assert_eq!(pixel[3], 255);
    }
}
