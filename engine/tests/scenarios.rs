use glam::Vec3;
use volsynth_engine::lesion::{LesionModel, LesionRegion};
use volsynth_engine::{
    generate, Axis, CancelToken, CaseRegistry, Dims, FindingKind, Modality, Plane, RenderOptions, Seed, SynthConfig,
    VolumeSynthesizer, Window,
};

fn synth() -> VolumeSynthesizer {
    VolumeSynthesizer::new(CaseRegistry::builtin(), SynthConfig::default()).unwrap()
}

#[test]
fn lung_case_places_a_spiculated_mass() {
    let volume = generate("lung-nsclc-kras-g12c", 256, 256, 100).unwrap();
    assert!(volume.mask_at(166, 90, 55));
    assert_eq!(volume.finding_at(166, 90, 55), Some(FindingKind::Primary));
    assert_eq!(volume.metadata().body_part, "CHEST");
    assert_eq!(volume.default_window(), Window::LUNG);

    let center = Vec3::new(0.65 * 256.0, 0.35 * 256.0, 0.55 * 100.0);
    let radii = Vec3::new(0.08 * 256.0, 0.075 * 256.0, 0.08 * 100.0);
    let outside_base = volume
        .mask()
        .indexed_iter()
        .filter(|(_, &m)| m != 0)
        .any(|((z, y, x), _)| ((Vec3::new(x as f32, y as f32, z as f32) - center) / radii).length() > 1.0);
    assert!(outside_base, "mask never leaves the base ellipsoid");
}

#[test]
fn every_volume_type_generates_with_findings() {
    let synth = synth();
    let cases = [
        ("lung-nsclc-kras-g12c", "CHEST", Modality::Ct),
        ("colorectal-msi-h-mets", "ABDOMEN", Modality::Ct),
        ("cervix-locally-advanced", "PELVIS", Modality::Ct),
        ("oral-cavity-locally-advanced", "NECK", Modality::Ct),
        ("pediatric-gbm-brain", "BRAIN", Modality::Mri),
    ];
    for (case_id, body_part, modality) in cases {
        let volume = synth.generate(case_id, 64, 64, 32).unwrap();
        assert_eq!(volume.dims(), Dims::new(64, 64, 32));
        assert_eq!(volume.metadata().modality, modality, "{case_id}");
        assert!(volume.mask_voxel_count() > 0, "{case_id} has an empty mask");
        assert!(!volume.metadata().body_part.is_empty());
        if volume.metadata().body_part != body_part {
            // catalogue entries may override the anatomy's body part
            let declared = synth.registry().get(case_id).unwrap().body_part.clone();
            assert_eq!(declared.as_deref(), Some(volume.metadata().body_part.as_str()));
        }
    }
}

#[test]
fn metastases_carry_their_own_label() {
    let volume = synth().generate("colorectal-msi-h-mets", 96, 96, 48).unwrap();
    assert!(volume.labels().iter().any(|&l| l == FindingKind::Metastasis.label()));
    for (&m, &l) in volume.mask().iter().zip(volume.labels().iter()) {
        assert_eq!(m != 0, l == 1 || l == 2);
    }
}

#[test]
fn suspicious_nodes_are_labelled_but_not_masked() {
    let volume = synth().generate("lung-nsclc-kras-g12c", 128, 128, 64).unwrap();
    let node = FindingKind::LymphNode.label();
    assert!(volume.labels().iter().any(|&l| l == node));
    for (&m, &l) in volume.mask().iter().zip(volume.labels().iter()) {
        if l == node {
            assert_eq!(m, 0);
        }
    }
}

#[test]
fn unknown_case_uses_the_default_chest() {
    let volume = synth().generate("not-in-the-catalogue", 48, 48, 24).unwrap();
    assert_eq!(volume.metadata().case_id, "not-in-the-catalogue");
    assert_eq!(volume.metadata().body_part, "CHEST");
    assert!(volume.mask_voxel_count() > 0);
}

#[test]
fn image_data_matches_plane_size() {
    let volume = synth().generate("gastric-stage-iii", 40, 30, 20).unwrap();
    let options = RenderOptions { show_overlay: true, ..RenderOptions::default() };
    for (axis, rows, cols) in [(Axis::Axial, 30, 40), (Axis::Coronal, 20, 40), (Axis::Sagittal, 20, 30)] {
        let image = volume.get_slice_as_image_data(axis, 10, &options);
        assert_eq!((image.height, image.width), (rows, cols));
        assert_eq!(image.rgba.len(), rows * cols * 4);
        assert!(image.rgba.chunks_exact(4).all(|p| p[3] == 255));
    }
    // out-of-range indices clamp instead of failing
    let last = volume.get_slice(Axis::Axial, 10_000);
    assert_eq!(last, volume.get_slice(Axis::Axial, 19));
}

#[test]
fn overlay_only_changes_masked_pixels() {
    let volume = generate("lung-nsclc-kras-g12c", 128, 128, 50).unwrap();
    let z = 27;
    let plain = volume.get_slice_as_image_data(Axis::Axial, z, &RenderOptions::default());
    let overlay = volume.get_slice_as_image_data(
        Axis::Axial,
        z,
        &RenderOptions { show_overlay: true, ..RenderOptions::default() },
    );
    let mask = volume.get_tumor_mask_slice(Axis::Axial, z);
    assert!(mask.data.iter().any(|&m| m != 0));
    for (i, &m) in mask.data.iter().enumerate() {
        if m == 0 {
            assert_eq!(&plain.rgba[i * 4..i * 4 + 4], &overlay.rgba[i * 4..i * 4 + 4], "pixel {i}");
        }
    }
    assert_ne!(plain.rgba, overlay.rgba);
}

fn has_unmasked_neighbour(mask: &Plane<u8>, row: usize, col: usize) -> bool {
    (-1i64..=1).any(|dr| {
        (-1i64..=1).any(|dc| {
            let (r, c) = (row as i64 + dr, col as i64 + dc);
            (dr, dc) != (0, 0)
                && r >= 0
                && c >= 0
                && mask.get(r as usize, c as usize).map_or(false, |m| m == 0)
        })
    })
}

#[test]
fn overlay_contours_sit_on_the_mask_boundary() {
    let volume = generate("lung-nsclc-kras-g12c", 128, 128, 64).unwrap();
    let contour_colours: Vec<[u8; 3]> = [FindingKind::Primary, FindingKind::Metastasis, FindingKind::LymphNode]
        .iter()
        .map(|k| k.color())
        .collect();
    let options = RenderOptions { show_overlay: true, ..RenderOptions::default() };
    let node = FindingKind::LymphNode.label();
    let mut contour_pixels = 0;
    let mut node_pixels = 0;

    for z in 0..64 {
        let image = volume.get_slice_as_image_data(Axis::Axial, z, &options);
        let mask = volume.get_tumor_mask_slice(Axis::Axial, z);
        let labels = volume.get_label_slice(Axis::Axial, z);
        node_pixels += labels.data.iter().filter(|&&l| l == node).count();
        for row in 0..mask.rows {
            for col in 0..mask.cols {
                let i = row * mask.cols + col;
                let pixel = &image.rgba[i * 4..i * 4 + 4];
                let coloured = pixel[3] == 255 && contour_colours.iter().any(|c| &pixel[..3] == c);
                let edge = mask.data[i] != 0 && has_unmasked_neighbour(&mask, row, col);
                assert_eq!(coloured, edge, "z {z} row {row} col {col}");
                if coloured {
                    contour_pixels += 1;
                }
            }
        }
    }
    assert!(contour_pixels > 0);
    // suspicious nodes are present but never outlined
    assert!(node_pixels > 0);
}

#[test]
fn stamped_brain_tumour_keeps_necrotic_solid_rim_ordering() {
    let registry = CaseRegistry::builtin();
    let mut case = registry.resolve("pediatric-gbm-brain");
    // a smaller core leaves room for solid tumour between core and rim
    case.tumors[0].necrosis = Some(0.25);
    case.tumors[0].infiltrative = false;
    let dims = Dims::new(128, 128, 64);
    let volume = synth().generate_case(&case, dims, &CancelToken::new()).unwrap();

    let seed = Seed::from_case_id(&case.case_id).primary(0);
    let model = LesionModel::new(&case.tumors[0], seed, dims, Modality::Mri, FindingKind::Primary);
    let mut sums = [(0.0f64, 0usize); 3];
    for ((z, y, x), &label) in volume.labels().indexed_iter() {
        if label != FindingKind::Primary.label() {
            continue;
        }
        let sample = model
            .sample(Vec3::new(x as f32, y as f32, z as f32))
            .expect("labelled voxel outside the lesion");
        let stored = volume.voxel(x, y, z).unwrap();
        assert_eq!(stored, sample.intensity, "voxel ({x}, {y}, {z})");
        let slot = match sample.region {
            LesionRegion::Necrotic => 0,
            LesionRegion::Solid => 1,
            LesionRegion::Rim => 2,
            LesionRegion::Spicule => continue,
        };
        sums[slot].0 += stored as f64;
        sums[slot].1 += 1;
    }
    let means: Vec<f64> = sums
        .iter()
        .map(|&(sum, count)| {
            assert!(count > 0);
            sum / count as f64
        })
        .collect();
    assert!(means[0] < means[1] && means[1] < means[2], "{means:?}");
}
