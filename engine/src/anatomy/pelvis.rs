use glam::{Vec2, Vec3};

use super::{paint, paint_body_wall, paint_bone, paint_shell, AnatomicalField, FieldPoint};
use crate::api::Modality;
use crate::math::{cylinder_sdf, ellipse_sdf, ellipsoid_sdf, fbm_noise, SeededRandom};
use crate::tissue::ct;

#[derive(Debug, Clone)]
pub struct PelvisCt {
    body: Vec2,
    bladder_fill: f32,
    pelvic_organ: Vec3,
    femoral_level: f32,
    bowel_offset: Vec3,
}

impl PelvisCt {
    pub fn new(rng: &mut SeededRandom) -> Self {
        let habitus = rng.range(0.94, 1.06);
        Self {
            body: Vec2::new(0.92 * habitus, 0.6 * habitus),
            bladder_fill: rng.range(0.8, 1.15),
            pelvic_organ: Vec3::new(rng.range(-0.03, 0.03), rng.range(0.0, 0.05), rng.range(0.5, 0.58)),
            femoral_level: rng.range(0.55, 0.62),
            bowel_offset: Vec3::new(rng.range(0.0, 50.0), rng.range(0.0, 50.0), rng.range(0.0, 50.0)),
        }
    }

    fn paint_bones(&self, f: &mut f32, p: &FieldPoint, q: Vec2, grain: f32) {
        // iliac wings narrow toward the acetabulum
        if p.s < self.femoral_level {
            let taper = 1.0 - 0.5 * p.s;
            for side in [-1.0f32, 1.0] {
                let wing = ellipse_sdf(q, Vec2::new(side * 0.52, 0.12), Vec2::new(0.26, 0.34) * taper);
                if q.y > -0.15 * taper && (q.x * side) > 0.3 {
                    paint_shell(f, wing, 0.12, ct::BONE_CANCELLOUS + 40.0 * grain);
                    paint_shell(f, wing - 0.05, 0.02, ct::BONE_CORTICAL);
                    paint_shell(f, wing + 0.05, 0.02, ct::BONE_CORTICAL);
                }
            }
        }
        if p.s < 0.65 {
            let sacrum = ellipse_sdf(q, Vec2::new(0.0, 0.42), Vec2::new(0.2, 0.09));
            paint_bone(f, sacrum * 0.09, 0.012, grain);
        }
        if p.s > self.femoral_level - 0.06 {
            for side in [-1.0f32, 1.0] {
                let head = Vec2::new(side * 0.56, 0.06);
                paint_shell(f, cylinder_sdf(q, head, 0.165), 0.02, ct::BONE_CORTICAL * 0.8);
                paint_bone(f, cylinder_sdf(q, head, 0.13), 0.015, grain);
            }
        }
    }
}

impl AnatomicalField for PelvisCt {
    fn modality(&self) -> Modality {
        Modality::Ct
    }

    fn body_part(&self) -> &'static str {
        "PELVIS"
    }

    fn series_description(&self) -> &'static str {
        "CT PELVIS W CONTRAST"
    }

    fn field_of_view_mm(&self) -> f32 {
        400.0
    }

    fn slice_thickness_mm(&self) -> f32 {
        3.0
    }

    fn intensity_at(&self, p: &FieldPoint) -> f32 {
        let q = p.uv();
        let center = Vec2::new(0.0, 0.02);
        if ellipse_sdf(q, center, self.body) > 0.02 {
            return ct::AIR;
        }
        let grain = p.grain();
        let here = Vec3::new(p.u, p.v, p.s);
        let mut f = ct::AIR;
        paint_body_wall(&mut f, q, center, self.body, ct::FAT + 10.0, grain);

        for side in [-1.0f32, 1.0] {
            let gluteal = ellipse_sdf(q, Vec2::new(side * 0.55, 0.38), Vec2::new(0.3, 0.2));
            paint(&mut f, gluteal, ct::MUSCLE + ct::TEXTURE * grain);
        }

        // sigmoid and small-bowel loops in the upper pelvis
        if p.s < 0.4 && q.y < 0.25 {
            let loops = fbm_noise(p.texture * 0.9 + self.bowel_offset, 3);
            paint(&mut f, loops.abs() - 0.07, ct::BOWEL_WALL + ct::TEXTURE * grain);
        }

        let bladder_center = Vec3::new(0.0, -0.25, 0.62);
        let bladder_radii = Vec3::new(0.26, 0.2, 0.3) * self.bladder_fill;
        paint(&mut f, ellipsoid_sdf(here, bladder_center, bladder_radii), ct::BOWEL_WALL);
        paint(&mut f, ellipsoid_sdf(here, bladder_center, bladder_radii * 0.9), ct::URINE);

        paint(&mut f, ellipsoid_sdf(here, self.pelvic_organ, Vec3::new(0.15, 0.11, 0.18)), ct::UTERUS + ct::TEXTURE * grain);

        let rectum = Vec2::new(0.0, 0.3);
        paint(&mut f, cylinder_sdf(q, rectum, 0.075), ct::BOWEL_WALL + ct::TEXTURE * grain);
        if p.s < 0.7 {
            paint(&mut f, cylinder_sdf(q, rectum, 0.03), ct::BOWEL_GAS);
        }

        for side in [-1.0f32, 1.0] {
            let drift = 0.08 * p.s;
            paint(&mut f, cylinder_sdf(q, Vec2::new(side * (0.26 + drift), 0.04), 0.032), ct::ARTERY);
            paint(&mut f, cylinder_sdf(q, Vec2::new(side * (0.29 + drift), 0.11), 0.038), ct::VEIN);
        }

        self.paint_bones(&mut f, p, q, grain);
        f
    }
}
