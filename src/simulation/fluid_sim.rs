//! Fluid simulation scheduler
//!
//! Drives one simulation step per `dispatch_compute` call. Each step runs a
//! fixed number of substeps; each substep walks the stage table (predict,
//! grid build, counting sort, solver iterations, finalize, viscosity hook)
//! and rotates the ring section once. `update` only records the timestep and
//! arms the run flag; all GPU work is recorded in `dispatch_compute`, and the
//! pause gate is the only conditional in the pipeline.

use glam::Vec3;
use winit::keyboard::KeyCode;

use super::fluid_buffers::{FluidBuffers, SimUniforms, SECTION_COUNT};
use super::fluid_config::FluidConfig;
use super::fluid_pipelines::{
    CachedBindGroups, FluidPipelines, WORKGROUP_SIZE_GRID, WORKGROUP_SIZE_PARTICLES,
};
use super::grid::GridParams;
use super::kernels;
use super::stages::{substep_stages, DispatchDomain, StageDesc};

pub struct FluidSim {
    grid: GridParams,
    stages: Vec<StageDesc>,
    substeps: u32,

    // Runtime tunables, folded into the next frame's uniform upload
    gravity: Vec3,
    viscosity: f32,
    surface_tension: f32,
    rest_density: f32,
    lambda_epsilon: f32,

    pending_dt: f32,
    armed: bool,
    paused: bool,

    buffers: FluidBuffers,
    pipelines: FluidPipelines,
    bind_groups: CachedBindGroups,
}

impl FluidSim {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, config: &FluidConfig) -> Self {
        let grid = GridParams::new(config);
        let mut buffers = FluidBuffers::new(device, &grid);
        if let Err(err) = buffers.validate_memory_budget() {
            log::warn!("{}", err);
        }
        let pipelines = FluidPipelines::new(device);
        let bind_groups = CachedBindGroups::new(device, &pipelines, &buffers);

        buffers.reset_all_sections(queue, &grid);

        Self {
            grid,
            stages: substep_stages(config.solver_iterations),
            substeps: config.substeps,
            gravity: Vec3::from_array(config.gravity),
            viscosity: config.viscosity,
            surface_tension: config.surface_tension,
            rest_density: config.rest_density,
            lambda_epsilon: config.lambda_epsilon,
            pending_dt: 0.0,
            armed: false,
            paused: false,
            buffers,
            pipelines,
            bind_groups,
        }
    }

    /// Record the frame timestep and arm the next dispatch. Touches no GPU
    /// state.
    pub fn update(&mut self, dt: f32) {
        self.pending_dt = dt;
        self.armed = true;
    }

    /// Record one full simulation step into `encoder`: `substeps` substeps,
    /// each a stage-table walk followed by a ring rotation. No-op unless a
    /// preceding `update` armed the step and the simulation is not paused.
    pub fn dispatch_compute(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame_index: u64,
    ) {
        if !self.armed || self.paused {
            return;
        }
        self.armed = false;

        let dt_sub = self.pending_dt / self.substeps as f32;
        if dt_sub <= 0.0 {
            return;
        }

        let uniforms = make_uniforms(
            &self.grid,
            self.gravity,
            dt_sub,
            self.rest_density,
            self.lambda_epsilon,
            self.surface_tension,
            self.viscosity,
        );
        self.buffers.write_uniforms(queue, frame_index, &uniforms);
        let uniform_offset = FluidBuffers::uniform_offset(frame_index);

        for substep in 0..self.substeps {
            // The section the rotation below will make current; integration
            // reads the section before it
            let cur = (self.buffers.ring.current() + 1) % SECTION_COUNT;

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(&format!("Fluid Substep {}", substep)),
                    timestamp_writes: None,
                });
                pass.set_bind_group(0, &self.bind_groups.uniforms, &[uniform_offset]);

                for stage in &self.stages {
                    pass.set_pipeline(self.pipelines.pipeline(stage.kernel));
                    pass.set_bind_group(1, self.bind_groups.for_kernel(stage.kernel, cur), &[]);
                    let groups = self.workgroups(stage.domain);
                    pass.dispatch_workgroups(groups, 1, 1);
                }
            }

            self.buffers.ring.rotate();
        }
    }

    /// Rewrite all sections with the initial lattice and rewind the ring
    pub fn reset(&mut self, queue: &wgpu::Queue) {
        self.buffers.reset_all_sections(queue, &self.grid);
        self.armed = false;
        log::info!("fluid simulation reset to initial lattice");
    }

    /// Pause toggle; gates whether `dispatch_compute` records anything
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if key == KeyCode::KeyP {
            self.paused = !self.paused;
            log::info!(
                "fluid simulation {}",
                if self.paused { "paused" } else { "resumed" }
            );
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_gravity_x(&mut self, x: f32) {
        self.gravity.x = x;
    }

    pub fn set_gravity_y(&mut self, y: f32) {
        self.gravity.y = y;
    }

    pub fn set_gravity_z(&mut self, z: f32) {
        self.gravity.z = z;
    }

    pub fn set_viscosity(&mut self, viscosity: f32) {
        self.viscosity = viscosity;
    }

    pub fn set_surface_tension(&mut self, surface_tension: f32) {
        self.surface_tension = surface_tension;
    }

    pub fn particle_radius(&self) -> f32 {
        self.grid.particle_radius
    }

    pub fn num_particles(&self) -> u32 {
        self.grid.num_particles
    }

    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    /// Bind the current section's position and color buffers and draw all
    /// particles as points. The caller has already set a point-list pipeline
    /// and its camera bind group.
    pub fn draw_geometry(&self, pass: &mut wgpu::RenderPass<'_>) {
        let section = self.buffers.current_section();
        pass.set_vertex_buffer(0, section.position.slice(..));
        pass.set_vertex_buffer(1, section.color.slice(..));
        pass.draw(0..self.grid.num_particles, 0..1);
    }

    fn workgroups(&self, domain: DispatchDomain) -> u32 {
        match domain {
            DispatchDomain::Particles => {
                workgroup_count(self.grid.num_particles, WORKGROUP_SIZE_PARTICLES)
            }
            DispatchDomain::Cells => workgroup_count(self.grid.cell_count, WORKGROUP_SIZE_GRID),
            DispatchDomain::Single => 1,
        }
    }
}

pub(crate) fn workgroup_count(total: u32, workgroup_size: u32) -> u32 {
    total.div_ceil(workgroup_size)
}

/// Build the per-frame uniform block; kernel coefficients are precomputed
/// here so the CPU reference and the WGSL kernels agree on them exactly
pub(crate) fn make_uniforms(
    grid: &GridParams,
    gravity: Vec3,
    dt_sub: f32,
    rest_density: f32,
    lambda_epsilon: f32,
    surface_tension: f32,
    viscosity: f32,
) -> SimUniforms {
    let h = grid.cell_size;
    let dq = 0.3 * h;
    let w_dq = kernels::poly6(dq * dq, h);

    SimUniforms {
        grid_dims: [
            grid.dims.x as i32,
            grid.dims.y as i32,
            grid.dims.z as i32,
            0,
        ],
        counts: [grid.num_particles, grid.cell_count, grid.num_blocks(), 0],
        gravity_dt: [gravity.x, gravity.y, gravity.z, dt_sub],
        kernel: [h, rest_density, lambda_epsilon, surface_tension],
        coefs: [
            kernels::poly6_coef(h),
            kernels::spiky_coef(h),
            1.0 / w_dq,
            viscosity,
        ],
        domain: [
            grid.space_size.x,
            grid.space_size.y,
            grid.space_size.z,
            grid.cell_size,
        ],
        misc: [grid.particle_radius, 0.0, 0.0, 0.0],
        _padding: [0.0; 36],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(4096, 128), 32);
        assert_eq!(workgroup_count(4097, 128), 33);
        assert_eq!(workgroup_count(1, 256), 1);
        assert_eq!(workgroup_count(256, 256), 1);
    }

    #[test]
    fn test_uniforms_reflect_grid_and_tunables() {
        let config = FluidConfig::default();
        let grid = GridParams::new(&config);
        let u = make_uniforms(
            &grid,
            Vec3::new(0.0, -9.8, 0.0),
            0.002,
            config.rest_density,
            config.lambda_epsilon,
            config.surface_tension,
            config.viscosity,
        );
        assert_eq!(u.counts[0], 4096);
        assert_eq!(u.counts[1], 32 * 32 * 32);
        assert_eq!(u.counts[2], 128);
        assert_eq!(u.gravity_dt[3], 0.002);
        assert_eq!(u.kernel[0], grid.cell_size);
        // 1/W(dq) inverts the artificial-pressure reference weight
        let dq = 0.3 * grid.cell_size;
        let w = kernels::poly6(dq * dq, grid.cell_size);
        assert!((u.coefs[2] * w - 1.0).abs() < 1.0e-6);
    }
}
