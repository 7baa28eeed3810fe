//! Simulation Engine
//!
//! GPU position-based fluid simulation and its CPU reference mirror:
//! - [`grid`] - Spatial hash grid parameters and cell math
//! - [`stages`] - The substep pipeline as an ordered stage-descriptor table
//! - [`fluid_buffers`] - Ring-sectioned GPU buffer arenas
//! - [`fluid_pipelines`] - Compute pipelines and cached bind groups
//! - [`fluid_sim`] - The step scheduler and public simulation API
//! - [`cpu_fluid`] - CPU implementation of the identical algorithm
//! - [`kernels`] - SPH smoothing kernels shared by both paths

pub mod cpu_fluid;
pub mod fluid_buffers;
pub mod fluid_config;
pub mod fluid_pipelines;
pub mod fluid_sim;
pub mod grid;
pub mod kernels;
pub mod stages;

pub use cpu_fluid::CpuFluid;
pub use fluid_buffers::{FluidBuffers, SectionRing, SECTION_COUNT};
pub use fluid_config::FluidConfig;
pub use fluid_sim::FluidSim;
pub use grid::GridParams;
