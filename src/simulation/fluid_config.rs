use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FluidError;

/// Fluid simulation configuration
///
/// This configuration is shared by the GPU simulation and the CPU reference
/// implementation. All values are plain data owned by the caller; runtime
/// tunables (gravity, viscosity, surface tension) can additionally be changed
/// per frame through the setters on `FluidSim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluidConfig {
    /// Particles per axis; the particle count is the product and is fixed
    /// for the lifetime of the simulation
    pub fluid_dim: [u32; 3],

    /// Particle radius in world units
    pub particle_radius: f32,

    /// Axis-aligned simulation domain, origin at zero
    pub space_size: [f32; 3],

    /// Rest density the constraint solver drives local density toward.
    /// Keep slightly above the resting-lattice density so an undisturbed
    /// lattice produces zero corrections.
    pub rest_density: f32,

    /// Substeps per simulation step
    pub substeps: u32,

    /// Constraint solver iterations per substep
    pub solver_iterations: u32,

    /// Gravity acceleration
    pub gravity: [f32; 3],

    /// XSPH velocity smoothing factor (0 disables the viscosity hook)
    pub viscosity: f32,

    /// Artificial-pressure strength (tensile instability correction).
    /// Off by default: a resting lattice must generate zero corrections.
    pub surface_tension: f32,

    /// Relaxation epsilon added to the constraint gradient sum
    pub lambda_epsilon: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            fluid_dim: [16, 16, 16], // 4096 particles
            particle_radius: 0.25,
            space_size: [32.0, 32.0, 32.0],
            rest_density: 8.2,
            substeps: 5,
            solver_iterations: 3,
            gravity: [0.0, -9.8, 0.0],
            viscosity: 0.05,
            surface_tension: 0.0,
            lambda_epsilon: 100.0,
        }
    }
}

impl FluidConfig {
    /// Total particle count (`fluid_dim.x * fluid_dim.y * fluid_dim.z`)
    pub fn num_particles(&self) -> u32 {
        self.fluid_dim[0] * self.fluid_dim[1] * self.fluid_dim[2]
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FluidError> {
        let text = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&text)?)
    }

    /// Save the configuration as pretty-printed RON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FluidError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_particle_count() {
        let config = FluidConfig::default();
        assert_eq!(config.num_particles(), 4096);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = std::env::temp_dir().join("brine_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fluid.ron");

        let mut config = FluidConfig::default();
        config.gravity = [0.0, -3.7, 0.0];
        config.substeps = 4;
        config.save(&path).unwrap();

        let loaded = FluidConfig::load(&path).unwrap();
        assert_eq!(loaded.gravity, [0.0, -3.7, 0.0]);
        assert_eq!(loaded.substeps, 4);
        assert_eq!(loaded.fluid_dim, config.fluid_dim);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = FluidConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, FluidError::ConfigIo(_)));
    }
}
