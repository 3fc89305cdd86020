use glam::Vec2;

use super::{paint, paint_body_wall, paint_shell, AnatomicalField, FieldPoint, Vertebra};
use crate::api::Modality;
use crate::math::{cylinder_sdf, ellipse_sdf, smoothstep, SeededRandom};
use crate::tissue::ct;

/// Neck CT from the oral cavity down to the thyroid.
#[derive(Debug, Clone)]
pub struct HeadNeckCt {
    neck: Vec2,
    tongue_scale: f32,
    larynx_level: f32,
    airway_shift: f32,
}

impl HeadNeckCt {
    pub fn new(rng: &mut SeededRandom) -> Self {
        Self {
            neck: Vec2::new(0.6 * rng.range(0.94, 1.06), 0.58 * rng.range(0.95, 1.05)),
            tongue_scale: rng.range(0.9, 1.1),
            larynx_level: rng.range(0.4, 0.48),
            airway_shift: rng.range(-0.02, 0.02),
        }
    }

    /// Outline widens cranially where the mandible and face join the neck.
    fn outline(&self, s: f32) -> Vec2 {
        self.neck * (1.0 + 0.25 * (1.0 - smoothstep(0.15, 0.4, s)))
    }
}

impl AnatomicalField for HeadNeckCt {
    fn modality(&self) -> Modality {
        Modality::Ct
    }

    fn body_part(&self) -> &'static str {
        "NECK"
    }

    fn series_description(&self) -> &'static str {
        "CT NECK SOFT TISSUE W CONTRAST"
    }

    fn field_of_view_mm(&self) -> f32 {
        240.0
    }

    fn slice_thickness_mm(&self) -> f32 {
        2.0
    }

    fn intensity_at(&self, p: &FieldPoint) -> f32 {
        let q = p.uv();
        let center = Vec2::new(0.0, 0.02);
        let outline = self.outline(p.s);
        if ellipse_sdf(q, center, outline) > 0.02 {
            return ct::AIR;
        }
        let grain = p.grain();
        let mut f = ct::AIR;
        paint_body_wall(&mut f, q, center, outline, ct::FAT + 20.0, grain);

        for side in [-1.0f32, 1.0] {
            let scm = ellipse_sdf(q, Vec2::new(side * 0.4, 0.0), Vec2::new(0.1, 0.22));
            paint(&mut f, scm, ct::MUSCLE + ct::TEXTURE * grain);
            let paraspinal = ellipse_sdf(q, Vec2::new(side * 0.18, 0.4), Vec2::new(0.15, 0.13));
            paint(&mut f, paraspinal, ct::MUSCLE + ct::TEXTURE * grain);
            paint(&mut f, cylinder_sdf(q, Vec2::new(side * 0.24, 0.04), 0.035), ct::ARTERY);
            paint(&mut f, cylinder_sdf(q, Vec2::new(side * 0.33, 0.08), 0.05), ct::VEIN);
        }

        if p.s < 0.32 {
            let tongue = ellipse_sdf(q, Vec2::new(0.0, -0.3), Vec2::new(0.28, 0.22) * self.tongue_scale);
            paint(&mut f, tongue, ct::MUSCLE + 10.0 + ct::TEXTURE * grain);
            // mandible: a U-shaped arch open posteriorly
            if q.y < 0.05 {
                let arch = ellipse_sdf(q, Vec2::new(0.0, -0.1), Vec2::new(0.5, 0.55));
                paint_shell(&mut f, arch, 0.11, ct::BONE_CANCELLOUS + 40.0 * grain);
                paint_shell(&mut f, arch, 0.06, ct::BONE_CORTICAL);
            }
        }

        let airway = Vec2::new(self.airway_shift, if p.s < self.larynx_level { -0.02 } else { -0.16 });
        if p.s >= self.larynx_level {
            // cartilage ring around the larynx and trachea
            paint(&mut f, cylinder_sdf(q, airway, 0.085), ct::SOFT_TISSUE + 80.0);
        }
        paint(&mut f, cylinder_sdf(q, airway, 0.065), ct::AIR);

        if p.s > 0.62 {
            for side in [-1.0f32, 1.0] {
                let lobe = ellipse_sdf(q, Vec2::new(side * 0.15, -0.16), Vec2::new(0.08, 0.09));
                paint(&mut f, lobe, ct::THYROID + ct::TEXTURE * grain);
            }
        }

        Vertebra { center: Vec2::new(0.0, 0.22), radius: 0.11 }.paint(&mut f, q, grain);
        f
    }
}
