//! Shape and noise primitives shared by the anatomy and lesion code.
//!
//! Everything here is pure and may be called from parallel voxel loops.

use glam::{Vec2, Vec3};

/// Normalized radial proxy: negative inside, zero on the surface.
#[inline]
pub fn ellipsoid_sdf(p: Vec3, center: Vec3, radii: Vec3) -> f32 {
    ((p - center) / radii).length() - 1.0
}

/// 2D ellipse proxy for cross-sections extruded along z.
#[inline]
pub fn ellipse_sdf(p: Vec2, center: Vec2, radii: Vec2) -> f32 {
    ((p - center) / radii).length() - 1.0
}

#[inline]
pub fn cylinder_sdf(p: Vec2, center: Vec2, radius: f32) -> f32 {
    (p - center).length() - radius
}

/// Distance to the segment `a..b` minus a radius tapering from `radius_a` to `radius_b`.
#[inline]
pub fn segment_sdf(p: Vec3, a: Vec3, b: Vec3, radius_a: f32, radius_b: f32) -> f32 {
    let pa = p - a;
    let ba = b - a;
    let len_sq = ba.length_squared();
    let h = if len_sq > 0.0 { (pa.dot(ba) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
    (pa - ba * h).length() - (radius_a + (radius_b - radius_a) * h)
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Linear congruential generator (`s = (s*9301 + 49297) mod 233280`).
///
/// Small and fully specified so the same seed yields the same sequence on any
/// platform.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: u64,
}

impl SeededRandom {
    const MULTIPLIER: u64 = 9_301;
    const INCREMENT: u64 = 49_297;
    const MODULUS: u64 = 233_280;

    pub fn new(seed: u32) -> Self {
        Self { state: seed as u64 % Self::MODULUS }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.state = (self.state * Self::MULTIPLIER + Self::INCREMENT) % Self::MODULUS;
        (self.state as f64 / Self::MODULUS as f64) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.next_f32()
    }

    /// Inclusive integer range.
    pub fn range_usize(&mut self, lo: usize, hi: usize) -> usize {
        let span = (hi - lo + 1) as f32;
        (lo + (self.next_f32() * span) as usize).min(hi)
    }

    /// Direction drawn from spherical angles.
    pub fn unit_vector(&mut self) -> Vec3 {
        let theta = self.range(0.0, std::f32::consts::TAU);
        let cos_phi = self.range(-1.0, 1.0);
        let sin_phi = (1.0 - cos_phi * cos_phi).max(0.0).sqrt();
        Vec3::new(sin_phi * theta.cos(), sin_phi * theta.sin(), cos_phi)
    }
}

#[inline]
fn hash_u32(x: i32, y: i32, z: i32, seed: u32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x8DA6_B343)
        ^ (y as u32).wrapping_mul(0xD816_3841)
        ^ (z as u32).wrapping_mul(0xCB1A_B31F)
        ^ seed.wrapping_mul(0x9E37_79B9);
    h ^= h >> 13;
    h = h.wrapping_mul(0x5BD1_E995);
    h ^= h >> 15;
    h
}

/// Lattice value in `[-1, 1]`.
#[inline]
fn lattice(x: i32, y: i32, z: i32) -> f32 {
    (hash_u32(x, y, z, 0) & 0xFFFF) as f32 / 32_767.5 - 1.0
}

/// Per-voxel white noise in `[-1, 1]`.
#[inline]
pub fn voxel_hash(x: usize, y: usize, z: usize, seed: u32) -> f32 {
    (hash_u32(x as i32, y as i32, z as i32, seed) & 0xFFFF) as f32 / 32_767.5 - 1.0
}

/// Value noise: trilinear interpolation of hashed lattice values with
/// Hermite-faded weights. Output in `[-1, 1]`.
pub fn smooth_noise(p: Vec3) -> f32 {
    let base = p.floor();
    let f = p - base;
    let w = f * f * (Vec3::splat(3.0) - 2.0 * f);
    let (x, y, z) = (base.x as i32, base.y as i32, base.z as i32);

    let c000 = lattice(x, y, z);
    let c100 = lattice(x + 1, y, z);
    let c010 = lattice(x, y + 1, z);
    let c110 = lattice(x + 1, y + 1, z);
    let c001 = lattice(x, y, z + 1);
    let c101 = lattice(x + 1, y, z + 1);
    let c011 = lattice(x, y + 1, z + 1);
    let c111 = lattice(x + 1, y + 1, z + 1);

    let x00 = mix(c000, c100, w.x);
    let x10 = mix(c010, c110, w.x);
    let x01 = mix(c001, c101, w.x);
    let x11 = mix(c011, c111, w.x);
    mix(mix(x00, x10, w.y), mix(x01, x11, w.y), w.z)
}

/// Fractal Brownian motion: octaves at doubling frequency and halving
/// amplitude, normalized back into `[-1, 1]`.
pub fn fbm_noise(p: Vec3, octaves: u32) -> f32 {
    let mut sum = 0.0;
    let mut norm = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for _ in 0..octaves.max(1) {
        sum += smooth_noise(p * frequency) * amplitude;
        norm += amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }
    sum / norm
}
