use glam::Vec3;

use super::{AnatomicalField, FieldPoint};
use crate::api::Modality;
use crate::lesion::EdemaHalo;
use crate::math::{ellipsoid_sdf, fbm_noise, mix, smoothstep, SeededRandom};
use crate::tissue::mri;

/// Radial layers of the head, as fractions of the skull ellipsoid.
const SCALP: f32 = 0.955;
const OUTER_TABLE: f32 = 0.94;
const DIPLOE: f32 = 0.918;
const INNER_TABLE: f32 = 0.902;
const DURA: f32 = 0.895;
const SUBARACHNOID: f32 = 0.88;

/// Deep structures as `(center, radii, signal)`, mirrored left/right.
const DEEP_NUCLEI: [(Vec3, Vec3, f32); 3] = [
    // caudate head
    (Vec3::new(0.13, -0.12, 0.1), Vec3::new(0.06, 0.1, 0.1), mri::DEEP_GRAY),
    // putamen
    (Vec3::new(0.26, 0.0, 0.05), Vec3::new(0.06, 0.16, 0.12), mri::DEEP_GRAY),
    // thalamus
    (Vec3::new(0.09, 0.12, 0.0), Vec3::new(0.08, 0.1, 0.09), mri::DEEP_GRAY + 20.0),
];

/// T1 post-contrast brain MRI.
#[derive(Debug, Clone)]
pub struct BrainMri {
    head_center: Vec3,
    head_radii: Vec3,
    cortex_offset: Vec3,
    ventricle_scale: f32,
    edema: Vec<EdemaHalo>,
}

impl BrainMri {
    pub fn new(rng: &mut SeededRandom) -> Self {
        Self {
            head_center: Vec3::new(0.0, 0.02, -0.05),
            head_radii: Vec3::new(0.78 * rng.range(0.95, 1.05), 0.92 * rng.range(0.96, 1.04), 0.95),
            cortex_offset: Vec3::new(rng.range(0.0, 64.0), rng.range(0.0, 64.0), rng.range(0.0, 64.0)),
            ventricle_scale: rng.range(0.85, 1.2),
            edema: Vec::new(),
        }
    }

    pub(crate) fn set_edema(&mut self, halos: Vec<EdemaHalo>) {
        self.edema = halos;
    }

    /// `(u, v, w)` with `w` pointing toward the vertex.
    fn frame(p: &FieldPoint) -> Vec3 {
        Vec3::new(p.u, p.v, 1.0 - 2.0 * p.s)
    }

    fn parenchyma(&self, here: Vec3, p: &FieldPoint, depth: f32) -> f32 {
        let grain = p.grain() * mri::TEXTURE;
        let mirrored = Vec3::new(here.x.abs(), here.y, here.z);

        // cerebellum: folia alternate gray and white around the arbor vitae
        let cerebellum_center = Vec3::new(0.0, 0.5, -0.55);
        let cerebellum = ellipsoid_sdf(here, cerebellum_center, Vec3::new(0.55, 0.32, 0.28));
        if cerebellum < 0.0 {
            let r = ((here - cerebellum_center) / Vec3::new(0.55, 0.32, 0.28)).length();
            let folia = (r * 40.0 + 3.0 * fbm_noise(p.texture + self.cortex_offset, 2)).sin();
            let base = if folia > 0.1 || r > 0.85 { mri::GRAY_MATTER } else { mri::WHITE_MATTER };
            return base + grain;
        }
        if cerebellum < 0.08 && here.z > cerebellum_center.z {
            // tentorium
            return mri::DURA + grain;
        }

        if here.z < -0.15 && (here.x * here.x + (here.y - 0.22).powi(2)).sqrt() < 0.1 {
            return mri::WHITE_MATTER * 0.95 + grain;
        }

        // interhemispheric fissure with the falx in the middle
        if here.x.abs() < 0.02 && (here.z > 0.25 || depth > 0.7) {
            return if here.x.abs() < 0.006 { mri::DURA } else { mri::CSF };
        }

        let ventricle_radii = Vec3::new(0.05, 0.34, 0.11) * self.ventricle_scale;
        let ventricle = ellipsoid_sdf(mirrored, Vec3::new(0.09, 0.0, 0.2), ventricle_radii);
        if ventricle < 0.0 {
            let plexus = ellipsoid_sdf(mirrored, Vec3::new(0.1, 0.25, 0.15), Vec3::splat(0.03));
            return if plexus < 0.0 { mri::CHOROID_PLEXUS } else { mri::CSF };
        }
        if ellipsoid_sdf(here, Vec3::new(0.0, 0.05, 0.02), Vec3::new(0.012, 0.12, 0.08)) < 0.0 {
            return mri::CSF;
        }

        for (center, radii, signal) in DEEP_NUCLEI {
            if ellipsoid_sdf(mirrored, center, radii) < 0.0 {
                return signal + grain;
            }
        }

        // cortical ribbon with sulci at the zero crossings of a noise field
        let ribbon = 0.84 + 0.05 * fbm_noise(p.texture * 0.7 + self.cortex_offset, 2);
        if depth > ribbon {
            let sulcus = fbm_noise(p.texture * 1.6 + self.cortex_offset, 3).abs();
            if sulcus < 0.05 {
                return mix(mri::CSF, mri::GRAY_MATTER, smoothstep(0.02, 0.05, sulcus));
            }
            return mri::GRAY_MATTER + grain;
        }
        mri::WHITE_MATTER + grain
    }

    fn edema_weight(&self, voxel: Vec3) -> f32 {
        self.edema.iter().map(|h| h.weight(voxel)).fold(0.0, f32::max)
    }
}

impl AnatomicalField for BrainMri {
    fn modality(&self) -> Modality {
        Modality::Mri
    }

    fn body_part(&self) -> &'static str {
        "BRAIN"
    }

    fn series_description(&self) -> &'static str {
        "MR BRAIN T1 POST GAD"
    }

    fn field_of_view_mm(&self) -> f32 {
        230.0
    }

    fn slice_thickness_mm(&self) -> f32 {
        3.0
    }

    fn accepts_lymph_nodes(&self) -> bool {
        false
    }

    fn intensity_at(&self, p: &FieldPoint) -> f32 {
        let here = Self::frame(p);
        let r = ((here - self.head_center) / self.head_radii).length();
        if r > 1.0 {
            return mri::BACKGROUND;
        }
        if r > SCALP {
            return mri::SCALP_FAT + p.grain() * mri::TEXTURE;
        }
        if r > OUTER_TABLE {
            return mri::SKULL_CORTEX;
        }
        if r > DIPLOE {
            return mri::DIPLOE + p.grain() * mri::TEXTURE;
        }
        if r > INNER_TABLE {
            return mri::SKULL_CORTEX;
        }
        if r > DURA {
            return mri::DURA;
        }
        if r > SUBARACHNOID {
            // superior sagittal sinus rides the vertex in the midline
            if here.x.abs() < 0.025 && here.z > 0.2 {
                return mri::SINUS;
            }
            return mri::CSF;
        }

        let depth = r / SUBARACHNOID;
        let tissue = self.parenchyma(here, p, depth);
        if self.edema.is_empty() || tissue <= mri::CSF + 40.0 {
            return tissue;
        }
        mix(tissue, mri::EDEMA, self.edema_weight(p.voxel))
    }
}
