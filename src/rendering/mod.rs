//! Rendering
//!
//! Visualization of the simulation state. The wider engine's render graph is
//! an external collaborator; this module only carries the particle point
//! renderer that consumes the simulation's draw binding.

pub mod particles;

pub use particles::ParticleRenderer;
