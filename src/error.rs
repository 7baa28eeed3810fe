//! Error types for the ambient crate surface.
//!
//! The simulation itself has no recoverable error taxonomy: once constructed,
//! every step is unconditional and GPU-level failures surface through wgpu's
//! own machinery. The fallible surface is configuration IO and the memory
//! budget check performed at construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluidError {
    #[error("failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] ron::Error),

    #[error("fluid buffers use {used_mb:.2} MB, exceeding the {budget_mb:.2} MB budget")]
    MemoryBudget { used_mb: f32, budget_mb: f32 },
}
