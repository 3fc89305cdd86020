use glam::{Vec2, Vec3};

use super::{paint, paint_body_wall, paint_shell, AnatomicalField, FieldPoint, Vertebra};
use crate::api::Modality;
use crate::math::{cylinder_sdf, ellipse_sdf, ellipsoid_sdf, fbm_noise, smoothstep, SeededRandom};
use crate::tissue::ct;

/// Upper abdomen CT in portal venous phase.
#[derive(Debug, Clone)]
pub struct AbdomenCt {
    body: Vec2,
    liver_center: Vec3,
    liver_radii: Vec3,
    spleen_center: Vec3,
    kidney_drop: [f32; 2],
    bowel_offset: Vec3,
}

impl AbdomenCt {
    pub fn new(rng: &mut SeededRandom) -> Self {
        let habitus = rng.range(0.94, 1.06);
        Self {
            body: Vec2::new(0.88 * habitus, 0.66 * habitus),
            liver_center: Vec3::new(rng.range(-0.4, -0.34), -0.06, rng.range(0.25, 0.32)),
            liver_radii: Vec3::new(0.42, 0.5, 0.45) * rng.range(0.93, 1.07),
            spleen_center: Vec3::new(0.55, 0.25, rng.range(0.25, 0.32)),
            kidney_drop: [rng.range(0.0, 0.06), rng.range(0.0, 0.06)],
            bowel_offset: Vec3::new(rng.range(0.0, 50.0), rng.range(0.0, 50.0), rng.range(0.0, 50.0)),
        }
    }

    /// Small-bowel loops and gas pockets filling the peritoneal space.
    fn paint_bowel(&self, f: &mut f32, p: &FieldPoint, grain: f32) {
        if p.s < 0.35 || p.v > 0.3 {
            return;
        }
        let loops = fbm_noise(p.texture * 0.9 + self.bowel_offset, 3);
        let wall = loops.abs() - 0.07;
        paint(f, wall, ct::BOWEL_WALL + ct::TEXTURE * grain);
        if wall < -0.035 && fbm_noise(p.texture * 2.3 + self.bowel_offset, 2) > 0.35 {
            *f = ct::BOWEL_GAS;
        }
    }

    fn paint_kidney(f: &mut f32, here: Vec3, center: Vec3, grain: f32) {
        let radii = Vec3::new(0.11, 0.15, 0.2);
        let outer = ellipsoid_sdf(here, center, radii);
        if outer > 0.05 {
            return;
        }
        paint(f, outer, ct::KIDNEY_CORTEX + ct::TEXTURE * grain);
        paint(f, ellipsoid_sdf(here, center, radii * 0.68), ct::KIDNEY_MEDULLA + ct::TEXTURE * grain);
        let hilum = center + Vec3::new(-center.x.signum() * 0.06, -0.02, 0.0);
        paint(f, ellipsoid_sdf(here, hilum, radii * Vec3::new(0.35, 0.3, 0.45)), ct::FAT_HILUM);
    }
}

impl AnatomicalField for AbdomenCt {
    fn modality(&self) -> Modality {
        Modality::Ct
    }

    fn body_part(&self) -> &'static str {
        "ABDOMEN"
    }

    fn series_description(&self) -> &'static str {
        "CT ABDOMEN PORTAL VENOUS"
    }

    fn field_of_view_mm(&self) -> f32 {
        380.0
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
        self.paint_bowel(&mut f, p, grain);

        // liver, carved medially so it does not cross the midline
        let liver = ellipsoid_sdf(here, self.liver_center, self.liver_radii).max(p.u - 0.15);
        paint(&mut f, liver, ct::LIVER + ct::TEXTURE * grain);
        if liver < -0.05 {
            let veins = fbm_noise(p.texture * 1.3 + Vec3::splat(5.0), 2).abs();
            let weight = 1.0 - smoothstep(0.025, 0.045, veins);
            f += (ct::VEIN - f) * weight * 0.7;
        }

        paint(&mut f, ellipsoid_sdf(here, self.spleen_center, Vec3::new(0.15, 0.24, 0.24)), ct::SPLEEN + ct::TEXTURE * grain);

        // stomach with an air-fluid level
        let stomach_center = Vec3::new(0.3, -0.2, 0.25);
        let stomach = ellipsoid_sdf(here, stomach_center, Vec3::new(0.25, 0.18, 0.22));
        paint(&mut f, stomach, ct::BOWEL_WALL + ct::TEXTURE * grain);
        let lumen = ellipsoid_sdf(here, stomach_center, Vec3::new(0.21, 0.14, 0.18));
        paint(&mut f, lumen, if p.v < -0.26 { ct::BOWEL_GAS } else { ct::WATER + 10.0 });

        paint(&mut f, ellipsoid_sdf(here, Vec3::new(0.05, 0.14, 0.45), Vec3::new(0.3, 0.06, 0.1)), ct::PANCREAS + ct::TEXTURE * grain);

        for (i, side) in [-1.0f32, 1.0].into_iter().enumerate() {
            let kidney = Vec3::new(side * 0.38, 0.36, 0.55 + self.kidney_drop[i]);
            Self::paint_kidney(&mut f, here, kidney, grain);
            // psoas widens caudally
            let psoas = Vec2::new(0.07, 0.08) * (0.6 + 0.6 * p.s);
            paint(&mut f, ellipse_sdf(q, Vec2::new(side * 0.17, 0.46), psoas), ct::MUSCLE + ct::TEXTURE * grain);
        }

        paint(&mut f, cylinder_sdf(q, Vec2::new(0.06, 0.22), 0.045), ct::ARTERY);
        paint(&mut f, cylinder_sdf(q, Vec2::new(-0.1, 0.21), 0.05), ct::VEIN);
        if p.s < 0.55 {
            let portal = cylinder_sdf(q, Vec2::new(-0.14, 0.06), 0.035);
            paint_shell(&mut f, portal, 0.01, ct::FAT);
            paint(&mut f, portal, ct::VEIN);
        }

        Vertebra { center: Vec2::new(0.0, self.body.y * 0.6), radius: 0.11 }.paint(&mut f, q, grain);
        f
    }
}
