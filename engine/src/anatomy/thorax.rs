use glam::{Vec2, Vec3};

use super::{paint, paint_body_wall, paint_bone, paint_shell, AnatomicalField, FieldPoint, Vertebra};
use crate::api::Modality;
use crate::math::{cylinder_sdf, ellipse_sdf, ellipsoid_sdf, fbm_noise, smoothstep, SeededRandom};
use crate::tissue::ct;

/// Chest CT: lungs with vessel texture, heart, great vessels, airway and bony cage.
#[derive(Debug, Clone)]
pub struct ThoraxCt {
    body: Vec2,
    lung_scale: Vec2,
    heart_shift: Vec2,
    rib_phase: f32,
    rib_count: f32,
}

impl ThoraxCt {
    pub fn new(rng: &mut SeededRandom) -> Self {
        let habitus = rng.range(0.95, 1.05);
        Self {
            body: Vec2::new(0.86 * habitus, 0.62 * rng.range(0.96, 1.04)),
            lung_scale: Vec2::new(rng.range(0.95, 1.05), rng.range(0.95, 1.05)),
            heart_shift: Vec2::new(rng.range(-0.03, 0.03), rng.range(-0.02, 0.02)),
            rib_phase: rng.range(0.0, 1.0),
            rib_count: rng.range(5.5, 6.5),
        }
    }

    /// Lung cross-section shrinks toward the apex and above the diaphragm.
    fn lung_profile(s: f32) -> f32 {
        let apex = 0.35 + 0.65 * smoothstep(0.0, 0.25, s);
        let base = 1.0 - 0.45 * smoothstep(0.8, 1.0, s);
        apex * base
    }

    fn paint_lungs(&self, f: &mut f32, p: &FieldPoint, q: Vec2) {
        let profile = Self::lung_profile(p.s);
        for side in [-1.0f32, 1.0] {
            let center = Vec2::new(side * 0.37 * self.body.x / 0.86, 0.02);
            let radii = Vec2::new(0.3, 0.5) * self.lung_scale * profile;
            let sd = ellipse_sdf(q, center, radii);
            if sd > 0.02 {
                continue;
            }
            let parenchyma = ct::LUNG + ct::LUNG_TEXTURE * fbm_noise(p.texture * 1.7, 3);
            paint(f, sd, parenchyma);
            if sd < -0.015 {
                // branching vessels thin toward the periphery
                let vessels = fbm_noise(p.texture * 1.1 + Vec3::splat(17.0), 3);
                let hilar = 1.0 - smoothstep(0.0, 0.9, (q - center).length() / radii.max_element());
                let threshold = 0.48 - 0.1 * hilar;
                let weight = smoothstep(threshold, threshold + 0.06, vessels.abs());
                if weight > 0.0 {
                    *f += (ct::SOFT_TISSUE - *f) * weight * (0.5 + 0.5 * hilar);
                }
            }
        }
    }

    fn paint_mediastinum(&self, f: &mut f32, p: &FieldPoint, q: Vec2, grain: f32) {
        let here = Vec3::new(p.u, p.v, p.s);
        let heart_center = Vec3::new(0.08 + self.heart_shift.x, -0.1 + self.heart_shift.y, 0.68);
        let heart = ellipsoid_sdf(here, heart_center, Vec3::new(0.32, 0.28, 0.2));
        paint(f, heart, ct::HEART + ct::TEXTURE * grain);

        // aorta: ascending in front, arch near the top, descending beside the spine
        if p.s > 0.3 && p.s < 0.62 {
            paint(f, cylinder_sdf(q, Vec2::new(0.02, -0.14), 0.065), ct::ARTERY);
        }
        if p.s > 0.24 && p.s < 0.32 {
            let arch = ellipse_sdf(q, Vec2::new(0.06, 0.08), Vec2::new(0.1, 0.24));
            paint_shell(f, arch, 0.1, ct::ARTERY);
        }
        if p.s > 0.26 {
            paint(f, cylinder_sdf(q, Vec2::new(0.13, 0.3), 0.058), ct::ARTERY);
        }
        if p.s > 0.2 && p.s < 0.7 {
            paint(f, cylinder_sdf(q, Vec2::new(-0.1, -0.1), 0.05), ct::VEIN);
        }

        paint(f, cylinder_sdf(q, Vec2::new(0.03, 0.24), 0.032), ct::SOFT_TISSUE + ct::TEXTURE * grain);

        // trachea, then the two main bronchi below the carina
        if p.s < 0.42 {
            let trachea = Vec2::new(0.0, -0.02);
            paint(f, cylinder_sdf(q, trachea, 0.06), ct::SOFT_TISSUE + 30.0);
            paint(f, cylinder_sdf(q, trachea, 0.048), ct::AIR);
        } else if p.s < 0.52 {
            let spread = 0.06 + (p.s - 0.42) * 1.2;
            for side in [-1.0f32, 1.0] {
                let bronchus = Vec2::new(side * spread, 0.0);
                paint(f, cylinder_sdf(q, bronchus, 0.038), ct::SOFT_TISSUE + 30.0);
                paint(f, cylinder_sdf(q, bronchus, 0.028), ct::AIR);
            }
        }
    }

    fn paint_bony_cage(&self, f: &mut f32, p: &FieldPoint, q: Vec2, grain: f32) {
        let sternum = ellipse_sdf(q, Vec2::new(0.0, -self.body.y * 0.84), Vec2::new(0.08, 0.035));
        paint_bone(f, sternum * 0.035, 0.006, grain);

        // ribs cut obliquely: bands in z along an elliptical ring
        let band = ((p.s * self.rib_count + self.rib_phase) * std::f32::consts::TAU + q.y * 3.0).sin();
        if band > 0.55 && q.y > -self.body.y * 0.7 {
            let ring = ellipse_sdf(q, Vec2::new(0.0, 0.02), self.body * 0.895);
            paint_shell(f, ring, 0.035, ct::RIB + 60.0 * grain);
        }

        Vertebra { center: Vec2::new(0.0, self.body.y * 0.62), radius: 0.1 }.paint(f, q, grain);
    }
}

impl AnatomicalField for ThoraxCt {
    fn modality(&self) -> Modality {
        Modality::Ct
    }

    fn body_part(&self) -> &'static str {
        "CHEST"
    }

    fn series_description(&self) -> &'static str {
        "CT CHEST W CONTRAST"
    }

    fn field_of_view_mm(&self) -> f32 {
        360.0
    }

    fn slice_thickness_mm(&self) -> f32 {
        2.5
    }

    fn intensity_at(&self, p: &FieldPoint) -> f32 {
        let q = p.uv();
        let center = Vec2::new(0.0, 0.02);
        if ellipse_sdf(q, center, self.body) > 0.02 {
            return ct::AIR;
        }
        let grain = p.grain();
        let mut f = ct::AIR;
        paint_body_wall(&mut f, q, center, self.body, ct::FAT + 20.0, grain);
        self.paint_lungs(&mut f, p, q);
        self.paint_mediastinum(&mut f, p, q, grain);
        self.paint_bony_cage(&mut f, p, q, grain);
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Dims;

    fn sample(field: &ThoraxCt, x: usize, y: usize, z: usize) -> f32 {
        let dims = Dims::new(128, 128, 100);
        field.intensity_at(&FieldPoint::new(x, y, z, dims, Vec3::ZERO))
    }

    #[test]
    fn lung_fields_are_dark_and_spine_is_bright() {
        let field = ThoraxCt::new(&mut SeededRandom::new(42));
        // right lung, mid chest; vessels may cross a few voxels
        let mut aerated = 0;
        for y in 53..60 {
            for x in 29..36 {
                if sample(&field, x, y, 50) < -500.0 {
                    aerated += 1;
                }
            }
        }
        assert!(aerated > 24, "only {aerated} of 49 lung voxels aerated");
        let spine = sample(&field, 64, 91, 50);
        assert!(spine > 200.0, "spine {spine}");
        assert_eq!(sample(&field, 0, 0, 50), ct::AIR);
    }
}
