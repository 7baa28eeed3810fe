//! GPU buffer management for the fluid simulation
//!
//! All particle and grid state lives in flat fixed-capacity arenas, one
//! complete duplicate per ring section, addressed by `(section, element)`.
//! Everything is allocated once at construction and never resized;
//! `reset_all_sections` rewrites the initial lattice in place.
//!
//! ## Buffer Layout (per section)
//!
//! | Buffer | Element | Count |
//! |--------|---------|-------|
//! | `position` | vec4 (xyz + 1) | particles |
//! | `velocity` | vec4 | particles |
//! | `predicted` | vec4 | particles |
//! | `force` | vec4 | particles |
//! | `lambda` | f32 | particles |
//! | `delta` | vec4 | particles |
//! | `color` | vec4 | particles |
//! | `cell_count` | u32 | grid cells |
//! | `cell_offset` | u32 | grid cells |
//! | `particle_cell` | u32 | particles |
//! | `sorted_index` | u32 | particles |
//! | `sorted_pos` | vec4 | particles |
//! | `block_sums` | u32 | scan blocks |

use bytemuck::{Pod, Zeroable};

use crate::error::FluidError;

use super::grid::GridParams;

/// Ring sections: complete duplicates of the simulation state so GPU work
/// from consecutive frames can overlap without racing the renderer.
pub const SECTION_COUNT: usize = 3;

/// Uniform slots cycled by frame index so a frame's parameters are not
/// overwritten while an earlier frame is still in flight.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Dynamic-offset stride of one uniform slot
pub const UNIFORM_STRIDE: u64 = 256;

/// Memory budget for all sections combined
const MAX_MEMORY_MB: f32 = 256.0;

/// Simulation parameters uniform (256-byte slot, must match the SimUniforms
/// struct in every fluid shader exactly)
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SimUniforms {
    /// xyz = grid cells per axis
    pub grid_dims: [i32; 4],
    /// x = particle count, y = cell count, z = scan block count
    pub counts: [u32; 4],
    /// xyz = gravity, w = substep dt
    pub gravity_dt: [f32; 4],
    /// x = smoothing radius h, y = rest density, z = lambda epsilon,
    /// w = artificial-pressure strength
    pub kernel: [f32; 4],
    /// x = poly6 coefficient, y = spiky coefficient, z = 1/W(dq),
    /// w = xsph factor
    pub coefs: [f32; 4],
    /// xyz = space size, w = cell size
    pub domain: [f32; 4],
    /// x = particle radius
    pub misc: [f32; 4],
    pub _padding: [f32; 36],
}

/// Tracks which ring section is current, in lockstep with the dispatches
/// recorded against it. `rotate` is the only mutator.
///
/// The ring keeps 3 sections while 5 substeps rotate it per frame, so a
/// section is reused within one frame. That reuse is safe: all substeps are
/// recorded into a single encoder and submitted to one queue, which executes
/// dispatches in order with storage hazards tracked. The sections exist for
/// cross-frame overlap (the renderer reads a finalized section while later
/// frames compute), and 3 covers the frames-in-flight depth.
#[derive(Debug, Clone, Copy)]
pub struct SectionRing {
    current: usize,
    previous: usize,
    len: usize,
}

impl SectionRing {
    pub fn new(len: usize) -> Self {
        Self {
            current: 0,
            previous: 0,
            len,
        }
    }

    /// Advance: the old current becomes previous, the next slot current
    pub fn rotate(&mut self) {
        self.previous = self.current;
        self.current = (self.current + 1) % self.len;
    }

    /// Rewind both indices to section 0
    pub fn reset(&mut self) {
        self.current = 0;
        self.previous = 0;
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn previous(&self) -> usize {
        self.previous
    }
}

/// One ring section: a complete duplicate of all particle and grid buffers
pub struct SectionBuffers {
    pub position: wgpu::Buffer,
    pub velocity: wgpu::Buffer,
    pub predicted: wgpu::Buffer,
    pub force: wgpu::Buffer,
    pub lambda: wgpu::Buffer,
    pub delta: wgpu::Buffer,
    pub color: wgpu::Buffer,
    pub cell_count: wgpu::Buffer,
    pub cell_offset: wgpu::Buffer,
    pub particle_cell: wgpu::Buffer,
    pub sorted_index: wgpu::Buffer,
    pub sorted_pos: wgpu::Buffer,
    pub block_sums: wgpu::Buffer,
}

/// Ring-sectioned fluid state plus the parameters uniform
pub struct FluidBuffers {
    pub sections: [SectionBuffers; SECTION_COUNT],
    pub uniforms: wgpu::Buffer,
    pub ring: SectionRing,
    memory_usage: u64,
}

impl FluidBuffers {
    pub fn new(device: &wgpu::Device, grid: &GridParams) -> Self {
        let n = grid.num_particles as u64;
        let cells = grid.cell_count as u64;
        let blocks = grid.num_blocks() as u64;

        let vec4_size = n * 16;
        let scalar_size = n * 4;
        let cell_size = cells * 4;
        let block_size = blocks * 4;

        let sections = std::array::from_fn(|i| SectionBuffers {
            position: Self::create_vertex_storage_buffer(
                device,
                vec4_size,
                &format!("Particle Position Buffer {}", i),
            ),
            velocity: Self::create_storage_buffer(
                device,
                vec4_size,
                &format!("Particle Velocity Buffer {}", i),
            ),
            predicted: Self::create_storage_buffer(
                device,
                vec4_size,
                &format!("Predicted Position Buffer {}", i),
            ),
            force: Self::create_storage_buffer(
                device,
                vec4_size,
                &format!("Particle Force Buffer {}", i),
            ),
            lambda: Self::create_storage_buffer(
                device,
                scalar_size,
                &format!("Lambda Buffer {}", i),
            ),
            delta: Self::create_storage_buffer(
                device,
                vec4_size,
                &format!("Position Delta Buffer {}", i),
            ),
            color: Self::create_vertex_storage_buffer(
                device,
                vec4_size,
                &format!("Particle Color Buffer {}", i),
            ),
            cell_count: Self::create_storage_buffer(
                device,
                cell_size,
                &format!("Cell Count Buffer {}", i),
            ),
            cell_offset: Self::create_storage_buffer(
                device,
                cell_size,
                &format!("Cell Offset Buffer {}", i),
            ),
            particle_cell: Self::create_storage_buffer(
                device,
                scalar_size,
                &format!("Particle Cell Buffer {}", i),
            ),
            sorted_index: Self::create_storage_buffer(
                device,
                scalar_size,
                &format!("Sorted Index Buffer {}", i),
            ),
            sorted_pos: Self::create_storage_buffer(
                device,
                vec4_size,
                &format!("Sorted Position Buffer {}", i),
            ),
            block_sums: Self::create_storage_buffer(
                device,
                block_size,
                &format!("Block Sums Buffer {}", i),
            ),
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Fluid Uniforms"),
            size: UNIFORM_STRIDE * FRAMES_IN_FLIGHT as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // position, velocity, predicted, force, delta, color, sorted_pos
        // are vec4 arrays; lambda, particle_cell, sorted_index are scalar
        let per_section = 7 * vec4_size + 3 * scalar_size + 2 * cell_size + block_size;
        let memory_usage =
            per_section * SECTION_COUNT as u64 + UNIFORM_STRIDE * FRAMES_IN_FLIGHT as u64;

        log::info!(
            "fluid buffers: {} particles, {} cells, {} sections, {:.2} MB",
            grid.num_particles,
            grid.cell_count,
            SECTION_COUNT,
            memory_usage as f32 / (1024.0 * 1024.0)
        );

        Self {
            sections,
            uniforms,
            ring: SectionRing::new(SECTION_COUNT),
            memory_usage,
        }
    }

    fn create_storage_buffer(device: &wgpu::Device, size: u64, label: &str) -> wgpu::Buffer {
        // 16-byte aligned for GPU compatibility
        let aligned_size = (size + 15) & !15;
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: aligned_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Storage buffer also bindable as a vertex buffer (position/color are
    /// pulled directly by the point renderer)
    fn create_vertex_storage_buffer(device: &wgpu::Device, size: u64, label: &str) -> wgpu::Buffer {
        let aligned_size = (size + 15) & !15;
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: aligned_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Rewrite every section with the initial lattice: positions at
    /// `(x, y, z) * 2r + r`, everything else zeroed, and rewind the ring.
    pub fn reset_all_sections(&mut self, queue: &wgpu::Queue, grid: &GridParams) {
        let lattice = grid.initial_lattice();
        let positions: Vec<[f32; 4]> = lattice.iter().map(|p| [p.x, p.y, p.z, 1.0]).collect();
        let zeros_vec4: Vec<[f32; 4]> = vec![[0.0; 4]; grid.num_particles as usize];
        let zeros_f32: Vec<f32> = vec![0.0; grid.num_particles as usize];
        let zeros_particle_u32: Vec<u32> = vec![0; grid.num_particles as usize];
        let zeros_cell_u32: Vec<u32> = vec![0; grid.cell_count as usize];
        let zeros_block_u32: Vec<u32> = vec![0; grid.num_blocks() as usize];
        let colors: Vec<[f32; 4]> =
            vec![[0.12, 0.42, 0.85, 1.0]; grid.num_particles as usize];

        for section in &self.sections {
            queue.write_buffer(&section.position, 0, bytemuck::cast_slice(&positions));
            queue.write_buffer(&section.predicted, 0, bytemuck::cast_slice(&positions));
            queue.write_buffer(&section.velocity, 0, bytemuck::cast_slice(&zeros_vec4));
            queue.write_buffer(&section.force, 0, bytemuck::cast_slice(&zeros_vec4));
            queue.write_buffer(&section.delta, 0, bytemuck::cast_slice(&zeros_vec4));
            queue.write_buffer(&section.lambda, 0, bytemuck::cast_slice(&zeros_f32));
            queue.write_buffer(&section.color, 0, bytemuck::cast_slice(&colors));
            queue.write_buffer(&section.cell_count, 0, bytemuck::cast_slice(&zeros_cell_u32));
            queue.write_buffer(&section.cell_offset, 0, bytemuck::cast_slice(&zeros_cell_u32));
            queue.write_buffer(
                &section.particle_cell,
                0,
                bytemuck::cast_slice(&zeros_particle_u32),
            );
            queue.write_buffer(
                &section.sorted_index,
                0,
                bytemuck::cast_slice(&zeros_particle_u32),
            );
            queue.write_buffer(&section.sorted_pos, 0, bytemuck::cast_slice(&zeros_vec4));
            queue.write_buffer(&section.block_sums, 0, bytemuck::cast_slice(&zeros_block_u32));
        }

        self.ring.reset();
    }

    /// Upload this frame's parameters into the slot owned by `frame_index`
    pub fn write_uniforms(&self, queue: &wgpu::Queue, frame_index: u64, uniforms: &SimUniforms) {
        let slot = frame_index % FRAMES_IN_FLIGHT as u64;
        queue.write_buffer(
            &self.uniforms,
            slot * UNIFORM_STRIDE,
            bytemuck::bytes_of(uniforms),
        );
    }

    /// Dynamic offset of the uniform slot for `frame_index`
    pub fn uniform_offset(frame_index: u64) -> u32 {
        ((frame_index % FRAMES_IN_FLIGHT as u64) * UNIFORM_STRIDE) as u32
    }

    /// Section holding the most recently finalized particle state
    pub fn current_section(&self) -> &SectionBuffers {
        &self.sections[self.ring.current()]
    }

    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    pub fn memory_usage_mb(&self) -> f32 {
        self.memory_usage as f32 / (1024.0 * 1024.0)
    }

    pub fn validate_memory_budget(&self) -> Result<(), FluidError> {
        let used_mb = self.memory_usage_mb();
        if used_mb > MAX_MEMORY_MB {
            Err(FluidError::MemoryBudget {
                used_mb,
                budget_mb: MAX_MEMORY_MB,
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_uniforms_size() {
        // One dynamic-offset uniform slot
        assert_eq!(std::mem::size_of::<SimUniforms>(), 256);
    }

    #[test]
    fn test_ring_rotation_lockstep() {
        let mut ring = SectionRing::new(3);
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.previous(), 0);

        ring.rotate();
        assert_eq!(ring.previous(), 0);
        assert_eq!(ring.current(), 1);

        ring.rotate();
        ring.rotate();
        // Wrapped: 5 substeps reuse slots within one frame
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.previous(), 2);

        ring.reset();
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.previous(), 0);
    }

    #[test]
    fn test_ring_previous_always_trails_current() {
        let mut ring = SectionRing::new(3);
        for _ in 0..17 {
            ring.rotate();
            assert_eq!((ring.previous() + 1) % 3, ring.current());
        }
    }

    #[test]
    fn test_uniform_offsets_cycle() {
        assert_eq!(FluidBuffers::uniform_offset(0), 0);
        assert_eq!(FluidBuffers::uniform_offset(1), 256);
        assert_eq!(FluidBuffers::uniform_offset(2), 512);
        assert_eq!(FluidBuffers::uniform_offset(3), 0);
    }
}
