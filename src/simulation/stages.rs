//! Substep stage schedule
//!
//! The simulation substep is a fixed linear pipeline with no branching, so it
//! is declared as data: an ordered list of stage descriptors, each naming its
//! kernel, dispatch domain, and the buffers it reads and writes. The
//! scheduler walks this list to issue dispatches, and the points where the
//! executor must order two stages are derived from write/read overlap instead
//! of being hand-placed.
//!
//! wgpu already serializes dispatches on a queue and tracks storage-buffer
//! hazards, so the derived hazard chain is not re-implemented at runtime; it
//! is the specification the schedule is checked against in tests.

/// Logical buffers of one ring section. Stage read/write sets are expressed
/// against these; the scheduler maps them onto the physical section pair
/// (previous = integration input, current = everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferId {
    Position,
    Velocity,
    Predicted,
    Force,
    Lambda,
    Delta,
    Color,
    CellCount,
    CellOffset,
    ParticleCell,
    SortedIndex,
    SortedPos,
    BlockSums,
}

/// Compute kernel a stage dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Predict,
    GridClear,
    GridCount,
    ScanBlocks,
    ScanBlockSums,
    ScanCombine,
    Reindex,
    Lambdas,
    Deltas,
    ApplyDeltas,
    Finalize,
    XsphGather,
    XsphApply,
}

/// Workgroup-count domain of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDomain {
    /// One invocation per particle
    Particles,
    /// One invocation per grid cell (also one workgroup per scan block)
    Cells,
    /// A single workgroup (level-2 scan)
    Single,
}

#[derive(Debug, Clone, Copy)]
pub struct StageDesc {
    pub name: &'static str,
    pub kernel: Kernel,
    pub domain: DispatchDomain,
    pub reads: &'static [BufferId],
    pub writes: &'static [BufferId],
}

use BufferId::*;
use DispatchDomain::*;

const PREDICT: StageDesc = StageDesc {
    name: "predict",
    kernel: Kernel::Predict,
    domain: Particles,
    reads: &[Position, Velocity, Force],
    writes: &[Predicted, Force],
};

const GRID_CLEAR: StageDesc = StageDesc {
    name: "grid_clear",
    kernel: Kernel::GridClear,
    domain: Cells,
    reads: &[],
    writes: &[CellCount],
};

const GRID_COUNT: StageDesc = StageDesc {
    name: "grid_count",
    kernel: Kernel::GridCount,
    domain: Particles,
    reads: &[Predicted],
    writes: &[CellCount, ParticleCell],
};

const SCAN_BLOCKS: StageDesc = StageDesc {
    name: "scan_blocks",
    kernel: Kernel::ScanBlocks,
    domain: Cells,
    reads: &[CellCount],
    writes: &[CellOffset, BlockSums],
};

const SCAN_BLOCK_SUMS: StageDesc = StageDesc {
    name: "scan_block_sums",
    kernel: Kernel::ScanBlockSums,
    domain: Single,
    reads: &[BlockSums],
    writes: &[BlockSums],
};

const SCAN_COMBINE: StageDesc = StageDesc {
    name: "scan_combine",
    kernel: Kernel::ScanCombine,
    domain: Cells,
    reads: &[BlockSums],
    writes: &[CellOffset],
};

const REINDEX: StageDesc = StageDesc {
    name: "reindex",
    kernel: Kernel::Reindex,
    domain: Particles,
    reads: &[ParticleCell, Predicted],
    writes: &[CellOffset, SortedIndex, SortedPos],
};

const LAMBDAS: StageDesc = StageDesc {
    name: "lambdas",
    kernel: Kernel::Lambdas,
    domain: Particles,
    reads: &[SortedPos, CellCount, CellOffset],
    writes: &[Lambda],
};

const DELTAS: StageDesc = StageDesc {
    name: "deltas",
    kernel: Kernel::Deltas,
    domain: Particles,
    reads: &[SortedPos, Lambda, CellCount, CellOffset],
    writes: &[Delta],
};

const APPLY_DELTAS: StageDesc = StageDesc {
    name: "apply_deltas",
    kernel: Kernel::ApplyDeltas,
    domain: Particles,
    reads: &[Delta, SortedIndex],
    writes: &[SortedPos, Predicted],
};

const FINALIZE: StageDesc = StageDesc {
    name: "finalize",
    kernel: Kernel::Finalize,
    domain: Particles,
    reads: &[Position, Predicted],
    writes: &[Position, Velocity, Color],
};

const XSPH_GATHER: StageDesc = StageDesc {
    name: "xsph_gather",
    kernel: Kernel::XsphGather,
    domain: Particles,
    reads: &[Velocity, SortedPos, SortedIndex, CellCount, CellOffset],
    writes: &[Delta],
};

const XSPH_APPLY: StageDesc = StageDesc {
    name: "xsph_apply",
    kernel: Kernel::XsphApply,
    domain: Particles,
    reads: &[Delta, SortedIndex],
    writes: &[Velocity],
};

/// Build the ordered stage list for one substep: predict, grid build,
/// counting sort, `solver_iterations` solver triads, finalize, and the
/// viscosity hook.
pub fn substep_stages(solver_iterations: u32) -> Vec<StageDesc> {
    let mut stages = vec![
        PREDICT,
        GRID_CLEAR,
        GRID_COUNT,
        SCAN_BLOCKS,
        SCAN_BLOCK_SUMS,
        SCAN_COMBINE,
        REINDEX,
    ];
    for _ in 0..solver_iterations {
        stages.push(LAMBDAS);
        stages.push(DELTAS);
        stages.push(APPLY_DELTAS);
    }
    stages.push(FINALIZE);
    stages.push(XSPH_GATHER);
    stages.push(XSPH_APPLY);
    stages
}

/// True if the executor must order `first` before `second`: `second` touches
/// a buffer `first` writes (read-after-write or write-after-write).
pub fn hazard_between(first: &StageDesc, second: &StageDesc) -> bool {
    first.writes.iter().any(|w| {
        second.reads.contains(w) || second.writes.contains(w)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_linear_and_complete() {
        let stages = substep_stages(3);
        assert_eq!(stages[0].kernel, Kernel::Predict);
        assert_eq!(stages.last().unwrap().kernel, Kernel::XsphApply);
        // 7 fixed stages + 3 solver triads + finalize + 2 viscosity stages
        assert_eq!(stages.len(), 7 + 9 + 3);

        let lambda_count = stages
            .iter()
            .filter(|s| s.kernel == Kernel::Lambdas)
            .count();
        assert_eq!(lambda_count, 3);
    }

    #[test]
    fn test_grid_build_chain_hazards() {
        // Every stage of clear -> count -> scan -> combine -> reindex ->
        // solve writes a buffer the next stage consumes
        let stages = substep_stages(1);
        let from_clear = &stages[1..];
        for pair in from_clear.windows(2) {
            assert!(
                hazard_between(&pair[0], &pair[1]),
                "{} -> {} carries no hazard",
                pair[0].name,
                pair[1].name
            );
        }
    }

    #[test]
    fn test_solver_iterations_chain() {
        // apply_deltas of iteration N writes SortedPos, read by lambdas of
        // iteration N+1
        let stages = substep_stages(2);
        let applies: Vec<usize> = stages
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kernel == Kernel::ApplyDeltas)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(applies.len(), 2);
        assert!(hazard_between(&stages[applies[0]], &stages[applies[0] + 1]));
    }

    #[test]
    fn test_predict_and_clear_are_independent() {
        // The only adjacent pair without a data dependency; everything else
        // is a strict chain
        assert!(!hazard_between(&PREDICT, &GRID_CLEAR));
    }

    #[test]
    fn test_finalize_feeds_next_predict() {
        // Finalize writes Position/Velocity, which the next substep's
        // predict reads from the rotated section
        assert!(hazard_between(&FINALIZE, &PREDICT));
    }
}
