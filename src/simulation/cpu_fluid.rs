//! CPU reference implementation of the fluid simulation
//!
//! Mirrors the GPU compute path stage for stage: the same block-structured
//! two-level exclusive scan (including the partial final block), the same
//! counting sort, the same constraint solver kernels, the same substep
//! schedule and pause gate. Runs over flat `Vec` arenas with the identical
//! `(element)` indexing the GPU uses per section; the ring duplication
//! itself is a GPU-overlap concern and has no CPU counterpart.
//!
//! Used for headless validation of the simulation's invariants and for
//! small-scale preview without a GPU device.

use glam::Vec3;
use rayon::prelude::*;

use super::fluid_config::FluidConfig;
use super::grid::{GridParams, SCAN_BLOCK_SIZE};
use super::kernels;

pub struct CpuFluid {
    pub grid: GridParams,
    substeps: u32,
    solver_iterations: u32,

    gravity: Vec3,
    viscosity: f32,
    surface_tension: f32,
    rest_density: f32,
    lambda_epsilon: f32,

    pending_dt: f32,
    armed: bool,
    paused: bool,

    // Particle arenas
    position: Vec<Vec3>,
    velocity: Vec<Vec3>,
    predicted: Vec<Vec3>,
    force: Vec<Vec3>,
    lambda: Vec<f32>,
    delta: Vec<Vec3>,

    // Grid arenas
    cell_count: Vec<u32>,
    cell_offset: Vec<u32>,
    particle_cell: Vec<u32>,
    sorted_index: Vec<u32>,
    sorted_pos: Vec<Vec3>,
    block_sums: Vec<u32>,
}

impl CpuFluid {
    pub fn new(config: &FluidConfig) -> Self {
        let grid = GridParams::new(config);
        let n = grid.num_particles as usize;
        let cells = grid.cell_count as usize;
        let blocks = grid.num_blocks() as usize;

        let mut fluid = Self {
            grid,
            substeps: config.substeps,
            solver_iterations: config.solver_iterations,
            gravity: Vec3::from_array(config.gravity),
            viscosity: config.viscosity,
            surface_tension: config.surface_tension,
            rest_density: config.rest_density,
            lambda_epsilon: config.lambda_epsilon,
            pending_dt: 0.0,
            armed: false,
            paused: false,
            position: vec![Vec3::ZERO; n],
            velocity: vec![Vec3::ZERO; n],
            predicted: vec![Vec3::ZERO; n],
            force: vec![Vec3::ZERO; n],
            lambda: vec![0.0; n],
            delta: vec![Vec3::ZERO; n],
            cell_count: vec![0; cells],
            cell_offset: vec![0; cells],
            particle_cell: vec![0; n],
            sorted_index: vec![0; n],
            sorted_pos: vec![Vec3::ZERO; n],
            block_sums: vec![0; blocks],
        };
        fluid.reset();
        fluid
    }

    /// Rewrite the initial lattice and zero all derived state
    pub fn reset(&mut self) {
        self.position = self.grid.initial_lattice();
        self.predicted.copy_from_slice(&self.position);
        self.velocity.fill(Vec3::ZERO);
        self.force.fill(Vec3::ZERO);
        self.lambda.fill(0.0);
        self.delta.fill(Vec3::ZERO);
        self.armed = false;
    }

    pub fn update(&mut self, dt: f32) {
        self.pending_dt = dt;
        self.armed = true;
    }

    /// Run one full simulation step (all substeps), the CPU counterpart of
    /// `FluidSim::dispatch_compute`
    pub fn dispatch(&mut self) {
        if !self.armed || self.paused {
            return;
        }
        self.armed = false;

        let dt_sub = self.pending_dt / self.substeps as f32;
        if dt_sub <= 0.0 {
            return;
        }

        for _ in 0..self.substeps {
            self.substep(dt_sub);
        }
    }

    pub fn toggle_paused(&mut self) {
        self.paused = !self.paused;
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.viscosity = viscosity;
    }

    pub fn set_surface_tension(&mut self, surface_tension: f32) {
        self.surface_tension = surface_tension;
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.position
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocity
    }

    fn substep(&mut self, dt: f32) {
        self.predict(dt);
        self.clear_cell_counts();
        self.count_cells();
        self.scan_cell_counts();
        self.reindex();
        for _ in 0..self.solver_iterations {
            self.compute_lambdas();
            self.compute_deltas();
            self.apply_deltas();
        }
        self.finalize(dt);
        self.xsph_viscosity();
    }

    fn predict(&mut self, dt: f32) {
        for i in 0..self.position.len() {
            let vel = self.velocity[i] + (self.gravity + self.force[i]) * dt;
            self.predicted[i] = self.position[i] + vel * dt;
            self.force[i] = Vec3::ZERO;
        }
    }

    fn clear_cell_counts(&mut self) {
        self.cell_count.fill(0);
    }

    fn count_cells(&mut self) {
        for (p, &pos) in self.predicted.iter().enumerate() {
            let idx = self.grid.cell_index(self.grid.cell_coord(pos));
            self.cell_count[idx as usize] += 1;
            self.particle_cell[p] = idx;
        }
    }

    /// Two-level exclusive prefix sum, block-structured exactly like the GPU
    /// scan: per-block exclusive scans with totals to `block_sums`, a scan of
    /// the totals, then a combine pass. The final block may be partial.
    fn scan_cell_counts(&mut self) {
        let block = SCAN_BLOCK_SIZE as usize;
        let n = self.grid.cell_count as usize;

        for (b, start) in (0..n).step_by(block).enumerate() {
            let end = (start + block).min(n);
            let mut running = 0u32;
            for i in start..end {
                self.cell_offset[i] = running;
                running += self.cell_count[i];
            }
            self.block_sums[b] = running;
        }

        let mut running = 0u32;
        for b in 0..self.block_sums.len() {
            let total = self.block_sums[b];
            self.block_sums[b] = running;
            running += total;
        }

        for i in 0..n {
            self.cell_offset[i] += self.block_sums[i / block];
        }
    }

    /// Counting-sort bucket fill; consumes `cell_offset` as the running
    /// allocation pointer, leaving it at each cell's END index
    fn reindex(&mut self) {
        for p in 0..self.position.len() {
            let c = self.particle_cell[p] as usize;
            let slot = self.cell_offset[c] as usize;
            self.cell_offset[c] += 1;
            self.sorted_index[slot] = p as u32;
            self.sorted_pos[slot] = self.predicted[p];
        }
    }

    fn compute_lambdas(&mut self) {
        let grid = self.grid;
        let h = grid.cell_size;
        let h_sq = h * h;
        let rho0 = self.rest_density;
        let eps = self.lambda_epsilon;
        let sorted_pos = &self.sorted_pos;
        let cell_count = &self.cell_count;
        let cell_offset = &self.cell_offset;

        self.lambda
            .par_iter_mut()
            .enumerate()
            .for_each(|(s, lambda)| {
                let pi = sorted_pos[s];
                let mut density = 0.0f32;
                let mut grad_self = Vec3::ZERO;
                let mut grad_sq_sum = 0.0f32;

                let c0 = grid.cell_coord(pi);
                for dz in -1..=1 {
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let c = c0 + glam::IVec3::new(dx, dy, dz);
                            if !grid.in_bounds(c) {
                                continue;
                            }
                            let cell = grid.cell_index(c) as usize;
                            let end = cell_offset[cell] as usize;
                            let start = end - cell_count[cell] as usize;
                            for j in start..end {
                                let r = pi - sorted_pos[j];
                                let r_sq = r.length_squared();
                                if r_sq >= h_sq {
                                    continue;
                                }
                                density += kernels::poly6(r_sq, h);
                                if j != s {
                                    let g = kernels::spiky_grad(r, h) / rho0;
                                    grad_self += g;
                                    grad_sq_sum += g.length_squared();
                                }
                            }
                        }
                    }
                }

                let constraint = (density / rho0 - 1.0).max(0.0);
                grad_sq_sum += grad_self.length_squared();
                *lambda = -constraint / (grad_sq_sum + eps);
            });
    }

    fn compute_deltas(&mut self) {
        let grid = self.grid;
        let h = grid.cell_size;
        let h_sq = h * h;
        let rho0 = self.rest_density;
        let k_corr = self.surface_tension;
        let dq = 0.3 * h;
        let w_dq_inv = 1.0 / kernels::poly6(dq * dq, h);
        let sorted_pos = &self.sorted_pos;
        let lambda = &self.lambda;
        let cell_count = &self.cell_count;
        let cell_offset = &self.cell_offset;

        self.delta.par_iter_mut().enumerate().for_each(|(s, delta)| {
            let pi = sorted_pos[s];
            let lambda_i = lambda[s];
            let mut sum = Vec3::ZERO;

            let c0 = grid.cell_coord(pi);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let c = c0 + glam::IVec3::new(dx, dy, dz);
                        if !grid.in_bounds(c) {
                            continue;
                        }
                        let cell = grid.cell_index(c) as usize;
                        let end = cell_offset[cell] as usize;
                        let start = end - cell_count[cell] as usize;
                        for j in start..end {
                            if j == s {
                                continue;
                            }
                            let r = pi - sorted_pos[j];
                            let r_sq = r.length_squared();
                            if r_sq >= h_sq {
                                continue;
                            }
                            let w_ratio = kernels::poly6(r_sq, h) * w_dq_inv;
                            let w2 = w_ratio * w_ratio;
                            let s_corr = -k_corr * w2 * w2;
                            sum += (lambda_i + lambda[j] + s_corr) * kernels::spiky_grad(r, h);
                        }
                    }
                }
            }

            *delta = sum / rho0;
        });
    }

    fn apply_deltas(&mut self) {
        let radius = self.grid.particle_radius;
        let lo = Vec3::splat(radius);
        let hi = self.grid.space_size - Vec3::splat(radius);
        for s in 0..self.sorted_pos.len() {
            let p = (self.sorted_pos[s] + self.delta[s]).clamp(lo, hi);
            self.sorted_pos[s] = p;
            self.predicted[self.sorted_index[s] as usize] = p;
        }
    }

    fn finalize(&mut self, dt: f32) {
        for i in 0..self.position.len() {
            let vel = (self.predicted[i] - self.position[i]) / dt;
            self.position[i] = self.predicted[i];
            self.velocity[i] = vel;
        }
    }

    /// Viscosity hook: XSPH velocity smoothing, gather then apply, with the
    /// delta arena reused as scratch
    fn xsph_viscosity(&mut self) {
        let grid = self.grid;
        let h = grid.cell_size;
        let h_sq = h * h;
        let factor = self.viscosity;
        let sorted_pos = &self.sorted_pos;
        let sorted_index = &self.sorted_index;
        let velocity = &self.velocity;
        let cell_count = &self.cell_count;
        let cell_offset = &self.cell_offset;

        self.delta.par_iter_mut().enumerate().for_each(|(s, out)| {
            let pi = sorted_pos[s];
            let vi = velocity[sorted_index[s] as usize];
            let mut sum = Vec3::ZERO;

            let c0 = grid.cell_coord(pi);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let c = c0 + glam::IVec3::new(dx, dy, dz);
                        if !grid.in_bounds(c) {
                            continue;
                        }
                        let cell = grid.cell_index(c) as usize;
                        let end = cell_offset[cell] as usize;
                        let start = end - cell_count[cell] as usize;
                        for j in start..end {
                            if j == s {
                                continue;
                            }
                            let r = pi - sorted_pos[j];
                            let r_sq = r.length_squared();
                            if r_sq >= h_sq {
                                continue;
                            }
                            let vj = velocity[sorted_index[j] as usize];
                            sum += (vj - vi) * kernels::poly6(r_sq, h);
                        }
                    }
                }
            }

            *out = vi + factor * sum;
        });

        for s in 0..self.sorted_index.len() {
            self.velocity[self.sorted_index[s] as usize] = self.delta[s];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FluidConfig {
        FluidConfig {
            fluid_dim: [4, 4, 4],
            space_size: [8.0, 8.0, 8.0],
            ..FluidConfig::default()
        }
    }

    // Small enough to keep the full solver affordable in debug builds
    fn medium_config() -> FluidConfig {
        FluidConfig {
            fluid_dim: [8, 8, 8],
            space_size: [16.0, 16.0, 16.0],
            ..FluidConfig::default()
        }
    }

    fn resting_config() -> FluidConfig {
        FluidConfig {
            gravity: [0.0, 0.0, 0.0],
            ..medium_config()
        }
    }

    #[test]
    fn test_reset_reproduces_lattice() {
        let mut fluid = CpuFluid::new(&medium_config());
        let r = fluid.grid.particle_radius;
        let dim = fluid.grid.fluid_dim;

        // Scramble, then reset
        fluid.update(1.0 / 60.0);
        fluid.dispatch();
        fluid.reset();

        let mut i = 0;
        for z in 0..dim.z {
            for y in 0..dim.y {
                for x in 0..dim.x {
                    let expected = Vec3::new(x as f32, y as f32, z as f32) * (2.0 * r) + Vec3::splat(r);
                    assert_eq!(fluid.positions()[i], expected);
                    i += 1;
                }
            }
        }
        assert!(fluid.velocities().iter().all(|v| *v == Vec3::ZERO));
    }

    #[test]
    fn test_count_pass_totals() {
        // 64 particles, cell edge 4r: the lattice spans exactly 2 cells per
        // axis, 8 particles in each occupied cell
        let mut fluid = CpuFluid::new(&small_config());
        fluid.predict(0.0);
        fluid.clear_cell_counts();
        fluid.count_cells();

        let total: u32 = fluid.cell_count.iter().sum();
        assert_eq!(total, 64);

        // No cell can exceed what geometrically fits in a (4r)^3 volume at
        // 2r spacing
        let max_fit = 8;
        assert!(fluid.cell_count.iter().all(|&c| c <= max_fit));
        let occupied = fluid.cell_count.iter().filter(|&&c| c > 0).count();
        assert_eq!(occupied, 8);
    }

    #[test]
    fn test_scan_prefix_sum_invariant() {
        let mut fluid = CpuFluid::new(&FluidConfig::default());
        fluid.predict(0.0);
        fluid.clear_cell_counts();
        fluid.count_cells();
        fluid.scan_cell_counts();

        let last = fluid.grid.cell_count as usize - 1;
        assert_eq!(
            fluid.cell_offset[last] + fluid.cell_count[last],
            fluid.grid.num_particles
        );

        // Two-level result matches the naive exclusive prefix sum
        let mut running = 0u32;
        for i in 0..=last {
            assert_eq!(fluid.cell_offset[i], running, "offset mismatch at cell {}", i);
            running += fluid.cell_count[i];
        }
    }

    #[test]
    fn test_scan_handles_partial_final_block() {
        // 10x10x10 grid = 1000 cells, not a multiple of the 256 block size
        let config = FluidConfig {
            fluid_dim: [8, 8, 8],
            space_size: [10.0, 10.0, 10.0],
            ..FluidConfig::default()
        };
        let mut fluid = CpuFluid::new(&config);
        assert_eq!(fluid.grid.cell_count, 1000);
        assert_eq!(fluid.grid.num_blocks(), 4);

        // Craft an uneven histogram touching the partial block
        for i in 0..1000 {
            fluid.cell_count[i] = ((i * 7) % 5) as u32;
        }
        fluid.scan_cell_counts();

        let mut running = 0u32;
        for i in 0..1000 {
            assert_eq!(fluid.cell_offset[i], running);
            running += fluid.cell_count[i];
        }
    }

    #[test]
    fn test_reindex_is_permutation() {
        let mut fluid = CpuFluid::new(&FluidConfig::default());
        fluid.predict(0.0);
        fluid.clear_cell_counts();
        fluid.count_cells();
        fluid.scan_cell_counts();
        fluid.reindex();

        let n = fluid.grid.num_particles as usize;
        let mut seen = vec![false; n];
        for &idx in &fluid.sorted_index {
            assert!(!seen[idx as usize], "particle {} placed twice", idx);
            seen[idx as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_reindex_groups_particles_by_cell() {
        let mut fluid = CpuFluid::new(&FluidConfig::default());
        fluid.predict(0.0);
        fluid.clear_cell_counts();
        fluid.count_cells();
        fluid.scan_cell_counts();
        fluid.reindex();

        // Post-reindex, cell_offset[c] is cell c's END; every particle in
        // [end - count, end) must map back to cell c
        for c in 0..fluid.grid.cell_count as usize {
            let end = fluid.cell_offset[c] as usize;
            let start = end - fluid.cell_count[c] as usize;
            for slot in start..end {
                let p = fluid.sorted_index[slot] as usize;
                assert_eq!(fluid.particle_cell[p] as usize, c);
            }
        }
    }

    #[test]
    fn test_resting_lattice_substep_is_idempotent() {
        let mut fluid = CpuFluid::new(&resting_config());
        let before = fluid.positions().to_vec();

        fluid.update(1.0 / 60.0);
        fluid.dispatch();

        let tolerance = 1.0e-5 * fluid.grid.particle_radius;
        for (a, b) in before.iter().zip(fluid.positions()) {
            assert!((*a - *b).length() <= tolerance);
        }
    }

    #[test]
    fn test_no_drift_over_many_frames_without_gravity() {
        let config = FluidConfig {
            gravity: [0.0, 0.0, 0.0],
            ..small_config()
        };
        let mut fluid = CpuFluid::new(&config);
        let before = fluid.positions().to_vec();

        for _ in 0..100 {
            fluid.update(1.0 / 60.0);
            fluid.dispatch();
        }

        let tolerance = 1.0e-4 * fluid.grid.particle_radius;
        let max_drift = before
            .iter()
            .zip(fluid.positions())
            .map(|(a, b)| (*a - *b).length())
            .fold(0.0f32, f32::max);
        assert!(max_drift <= tolerance, "lattice drifted by {}", max_drift);
    }

    #[test]
    fn test_paused_simulation_never_moves() {
        let mut fluid = CpuFluid::new(&medium_config());
        let before = fluid.positions().to_vec();

        fluid.toggle_paused();
        for _ in 0..10 {
            fluid.update(1.0 / 60.0);
            fluid.dispatch();
        }

        assert_eq!(before, fluid.positions());
    }

    #[test]
    fn test_dispatch_without_update_is_noop() {
        let mut fluid = CpuFluid::new(&FluidConfig::default());
        let before = fluid.positions().to_vec();
        fluid.dispatch();
        assert_eq!(before, fluid.positions());
    }

    #[test]
    fn test_gravity_pulls_fluid_down() {
        let mut fluid = CpuFluid::new(&medium_config());
        let mean_y_before: f32 =
            fluid.positions().iter().map(|p| p.y).sum::<f32>() / fluid.positions().len() as f32;

        for _ in 0..5 {
            fluid.update(1.0 / 60.0);
            fluid.dispatch();
        }

        let mean_y_after: f32 =
            fluid.positions().iter().map(|p| p.y).sum::<f32>() / fluid.positions().len() as f32;
        assert!(mean_y_after < mean_y_before);

        // The boundary clamp keeps everything inside the domain
        let r = fluid.grid.particle_radius;
        for p in fluid.positions() {
            assert!(p.y >= r - 1.0e-4);
        }
    }

    #[test]
    fn test_solver_relieves_compression() {
        // A lattice squeezed to 80% spacing exceeds rest density; the
        // solver drives it back outward
        let mut fluid = CpuFluid::new(&resting_config());
        let center = fluid.position.iter().copied().sum::<Vec3>() / fluid.position.len() as f32;
        for p in fluid.position.iter_mut() {
            *p = center + (*p - center) * 0.8;
        }

        let extent = |fluid: &CpuFluid| {
            let min = fluid
                .positions()
                .iter()
                .copied()
                .fold(Vec3::splat(f32::MAX), Vec3::min);
            let max = fluid
                .positions()
                .iter()
                .copied()
                .fold(Vec3::splat(f32::MIN), Vec3::max);
            (max - min).length()
        };

        let extent_before = extent(&fluid);
        for _ in 0..3 {
            fluid.update(1.0 / 60.0);
            fluid.dispatch();
        }
        let extent_after = extent(&fluid);
        assert!(
            extent_after > extent_before,
            "{} -> {}",
            extent_before,
            extent_after
        );
    }
}
