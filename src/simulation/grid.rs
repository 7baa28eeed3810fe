//! Uniform grid parameters for the spatial hash
//!
//! Pure value type shared by the GPU kernels (through the uniform buffer),
//! the CPU reference simulation, and the tests. The grid volumetrically
//! covers the axis-aligned simulation domain; the cell edge is the neighbor
//! search radius, derived from the particle radius.

use glam::{IVec3, UVec3, Vec3};

use super::fluid_config::FluidConfig;

/// Block width of the two-level exclusive scan. Level 1 scans one block per
/// workgroup; level 2 scans the per-block totals in a single workgroup, which
/// bounds the grid at `SCAN_BLOCK_SIZE^2` cells.
pub const SCAN_BLOCK_SIZE: u32 = 256;

/// Grid parameters (cell size, dimensions, cell count, spatial bounds)
#[derive(Debug, Clone, Copy)]
pub struct GridParams {
    /// Particle radius in world units
    pub particle_radius: f32,
    /// Cell edge length; also the smoothing radius of the solver kernels
    pub cell_size: f32,
    /// Axis-aligned domain extent, origin at zero
    pub space_size: Vec3,
    /// Grid cells per axis, `ceil(space_size / cell_size)`
    pub dims: UVec3,
    /// Total cell count
    pub cell_count: u32,
    /// Particles per axis of the initial lattice
    pub fluid_dim: UVec3,
    /// Total particle count, fixed at construction
    pub num_particles: u32,
}

impl GridParams {
    pub fn new(config: &FluidConfig) -> Self {
        let particle_radius = config.particle_radius;
        let cell_size = 4.0 * particle_radius;
        let space_size = Vec3::from_array(config.space_size);
        let dims = UVec3::new(
            (space_size.x / cell_size).ceil() as u32,
            (space_size.y / cell_size).ceil() as u32,
            (space_size.z / cell_size).ceil() as u32,
        );
        let cell_count = dims.x * dims.y * dims.z;
        let fluid_dim = UVec3::from_array(config.fluid_dim);
        let num_particles = fluid_dim.x * fluid_dim.y * fluid_dim.z;

        // Construction-parameter violations are programmer errors
        debug_assert!(num_particles > 0, "empty fluid block");
        debug_assert!(
            cell_count <= SCAN_BLOCK_SIZE * SCAN_BLOCK_SIZE,
            "grid of {} cells exceeds the two-level scan capacity",
            cell_count
        );

        Self {
            particle_radius,
            cell_size,
            space_size,
            dims,
            cell_count,
            fluid_dim,
            num_particles,
        }
    }

    /// Blocks covered by the level-1 scan (the last one may be partial)
    pub fn num_blocks(&self) -> u32 {
        self.cell_count.div_ceil(SCAN_BLOCK_SIZE)
    }

    /// Integer cell coordinate of a position, clamped into the grid
    pub fn cell_coord(&self, position: Vec3) -> IVec3 {
        let grid_pos = position / self.cell_size;
        IVec3::new(
            (grid_pos.x as i32).clamp(0, self.dims.x as i32 - 1),
            (grid_pos.y as i32).clamp(0, self.dims.y as i32 - 1),
            (grid_pos.z as i32).clamp(0, self.dims.z as i32 - 1),
        )
    }

    /// Linear cell index: `x + y * dims.x + z * dims.x * dims.y`
    pub fn cell_index(&self, coord: IVec3) -> u32 {
        coord.x as u32 + coord.y as u32 * self.dims.x + coord.z as u32 * self.dims.x * self.dims.y
    }

    /// True if `coord` lies inside the grid on every axis
    pub fn in_bounds(&self, coord: IVec3) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && coord.x < self.dims.x as i32
            && coord.y < self.dims.y as i32
            && coord.z < self.dims.z as i32
    }

    /// Initial particle lattice: particle `(x, y, z)` rests at
    /// `(x, y, z) * 2r + r`, a body-filling block touching the domain origin
    pub fn initial_lattice(&self) -> Vec<Vec3> {
        let spacing = 2.0 * self.particle_radius;
        let mut positions = Vec::with_capacity(self.num_particles as usize);
        for z in 0..self.fluid_dim.z {
            for y in 0..self.fluid_dim.y {
                for x in 0..self.fluid_dim.x {
                    positions.push(
                        Vec3::new(x as f32, y as f32, z as f32) * spacing
                            + Vec3::splat(self.particle_radius),
                    );
                }
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GridParams {
        GridParams::new(&FluidConfig::default())
    }

    #[test]
    fn test_cell_size_from_radius() {
        let grid = params();
        assert_eq!(grid.cell_size, 1.0);
        assert_eq!(grid.dims, UVec3::splat(32));
        assert_eq!(grid.cell_count, 32 * 32 * 32);
    }

    #[test]
    fn test_dims_cover_space() {
        // Non-divisible extents round up so the grid volumetrically covers
        // the domain
        let mut config = FluidConfig::default();
        config.space_size = [10.5, 8.0, 9.9];
        config.particle_radius = 0.5; // cell_size 2.0
        let grid = GridParams::new(&config);
        assert_eq!(grid.dims, UVec3::new(6, 4, 5));
    }

    #[test]
    fn test_cell_coord_clamps_to_grid() {
        let grid = params();
        assert_eq!(grid.cell_coord(Vec3::splat(-5.0)), IVec3::ZERO);
        assert_eq!(
            grid.cell_coord(Vec3::splat(1000.0)),
            IVec3::splat(grid.dims.x as i32 - 1)
        );
    }

    #[test]
    fn test_cell_index_linearization() {
        let grid = params();
        assert_eq!(grid.cell_index(IVec3::ZERO), 0);
        assert_eq!(grid.cell_index(IVec3::new(1, 0, 0)), 1);
        assert_eq!(grid.cell_index(IVec3::new(0, 1, 0)), 32);
        assert_eq!(grid.cell_index(IVec3::new(0, 0, 1)), 32 * 32);
        assert_eq!(
            grid.cell_index(IVec3::new(31, 31, 31)),
            grid.cell_count - 1
        );
    }

    #[test]
    fn test_initial_lattice_layout() {
        let grid = params();
        let lattice = grid.initial_lattice();
        assert_eq!(lattice.len(), 4096);

        // Particle (x, y, z) sits at (x, y, z) * 2r + r
        assert_eq!(lattice[0], Vec3::splat(0.25));
        assert_eq!(lattice[1], Vec3::new(0.75, 0.25, 0.25));
        let last = *lattice.last().unwrap();
        assert_eq!(last, Vec3::splat(15.0 * 0.5 + 0.25));
    }

    #[test]
    fn test_partial_scan_block() {
        let mut config = FluidConfig::default();
        config.space_size = [10.0, 10.0, 10.0];
        config.particle_radius = 0.25; // cell_size 1.0 -> 1000 cells
        let grid = GridParams::new(&config);
        assert_eq!(grid.cell_count, 1000);
        // 1000 is not a multiple of 256: the last block is partial
        assert_eq!(grid.num_blocks(), 4);
        assert!(grid.num_blocks() * SCAN_BLOCK_SIZE > grid.cell_count);
    }
}
