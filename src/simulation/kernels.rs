//! SPH smoothing kernels
//!
//! Poly6 for density estimation, spiky gradient for the constraint gradient,
//! both parameterized by the neighbor radius `h` (the grid cell size). The
//! WGSL solver uses the same formulas with coefficients precomputed here and
//! passed through the uniform buffer, so CPU and GPU agree bit-for-bit on the
//! kernel shape.

use glam::Vec3;
use std::f32::consts::PI;

/// Poly6 normalization: `315 / (64 pi h^9)`
pub fn poly6_coef(h: f32) -> f32 {
    315.0 / (64.0 * PI * h.powi(9))
}

/// Spiky gradient magnitude factor: `45 / (pi h^6)`
pub fn spiky_coef(h: f32) -> f32 {
    45.0 / (PI * h.powi(6))
}

/// Poly6 density kernel, evaluated on the squared distance
pub fn poly6(r_sq: f32, h: f32) -> f32 {
    let h_sq = h * h;
    if r_sq >= h_sq {
        return 0.0;
    }
    let d = h_sq - r_sq;
    poly6_coef(h) * d * d * d
}

/// Spiky kernel gradient; points from the neighbor toward the particle
pub fn spiky_grad(r: Vec3, h: f32) -> Vec3 {
    let len = r.length();
    if len >= h || len < 1.0e-8 {
        return Vec3::ZERO;
    }
    let d = h - len;
    -spiky_coef(h) * d * d * (r / len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poly6_support() {
        let h = 1.0;
        assert!(poly6(0.0, h) > 0.0);
        assert_eq!(poly6(h * h, h), 0.0);
        assert_eq!(poly6(4.0, h), 0.0);
    }

    #[test]
    fn test_poly6_monotonic_in_distance() {
        let h = 1.0;
        let near = poly6(0.1, h);
        let far = poly6(0.8, h);
        assert!(near > far);
    }

    #[test]
    fn test_spiky_grad_direction() {
        let h = 1.0;
        let g = spiky_grad(Vec3::new(0.5, 0.0, 0.0), h);
        // Gradient pushes down the kernel: negative x for a neighbor at -x
        assert!(g.x < 0.0);
        assert_eq!(g.y, 0.0);
        assert_eq!(g.z, 0.0);
    }

    #[test]
    fn test_spiky_grad_vanishes_at_support_and_origin() {
        let h = 1.0;
        assert_eq!(spiky_grad(Vec3::new(1.0, 0.0, 0.0), h), Vec3::ZERO);
        assert_eq!(spiky_grad(Vec3::ZERO, h), Vec3::ZERO);
    }
}
