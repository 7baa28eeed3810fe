//! # Brine: GPU Position-Based Fluid Simulation
//!
//! Brine is the particle-fluid core of a real-time engine: a GPU-resident
//! Position-Based Fluids (PBF) simulation built on a counting-sort spatial
//! hash and an iterative density constraint solver, with its state ring-
//! buffered so several frames of GPU work can be in flight at once.
//!
//! ## Architecture Overview
//!
//! ### 1. Simulation Engine ([`simulation`])
//!
//! The core algorithm and state management:
//! - [`simulation::GridParams`] - Spatial hash grid derived from the
//!   particle radius and domain bounds
//! - [`simulation::stages`] - The substep pipeline declared as an ordered
//!   stage-descriptor table with per-stage read/write buffer sets
//! - [`simulation::FluidBuffers`] - Flat fixed-capacity buffer arenas,
//!   duplicated per ring section
//! - [`simulation::FluidSim`] - The step scheduler and public API
//! - [`simulation::CpuFluid`] - CPU mirror of the identical algorithm for
//!   headless validation and small-scale preview
//!
//! **Key Design**: Structure-of-Arrays layout, allocated once at
//! construction and never resized. Every substep rebuilds the neighbor
//! structure from scratch: atomic histogram, two-level exclusive scan,
//! atomic bucket fill.
//!
//! ### 2. Rendering ([`rendering`])
//!
//! - [`rendering::ParticleRenderer`] - Point-primitive rendering that pulls
//!   vertex data directly from the current ring section
//!
//! The windowing layer, GUI toolkit, render graph, and asset import are
//! external collaborators: the simulation consumes a `wgpu::Device`/`Queue`
//! for allocation, a `wgpu::CommandEncoder` for dispatch recording, and a
//! per-frame index for uniform-slot selection.
//!
//! ## Simulation Step
//!
//! ```text
//! update(dt) -> dispatch_compute(queue, encoder, frame):
//!   for each substep:
//!     predict -> grid clear -> count -> scan -> reindex
//!       -> (lambdas -> deltas -> apply) x iterations
//!       -> finalize -> viscosity hook -> rotate ring section
//! ```
//!
//! ## Dependencies
//!
//! - **Graphics**: `wgpu` (GPU compute and rendering), `winit` (key events)
//! - **Math**: `glam` (SIMD math types), `bytemuck` (safe transmutation)
//! - **Concurrency**: `rayon` (CPU reference parallel loops)
//! - **Configuration**: `serde` + `ron`
//! - **Diagnostics**: `log`, `thiserror`

pub mod error;
pub mod rendering;
pub mod simulation;

pub use error::FluidError;
pub use simulation::{CpuFluid, FluidConfig, FluidSim};
