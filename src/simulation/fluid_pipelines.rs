//! Compute pipelines and bind groups for the fluid simulation
//!
//! ## Bind Group Layouts
//!
//! Group 0 is the shared parameters uniform (dynamic offset, one 256-byte
//! slot per frame in flight). Group 1 is per stage family:
//!
//! ### Integrate (predict / finalize)
//! | Binding | Access | Buffer |
//! |---------|--------|--------|
//! | 0 | read | position (previous section) |
//! | 1 | read | velocity (previous section) |
//! | 2 | read_write | position (current section) |
//! | 3 | read_write | velocity (current section) |
//! | 4 | read_write | predicted |
//! | 5 | read_write | force |
//! | 6 | read_write | color |
//!
//! ### Grid (clear / count)
//! | 0 | read_write | cell_count (atomic) |
//! | 1 | read_write | particle_cell |
//! | 2 | read | predicted |
//!
//! ### Scan (scan_blocks / scan_block_sums / scan_combine)
//! | 0 | read | cell_count |
//! | 1 | read_write | cell_offset |
//! | 2 | read_write | block_sums |
//!
//! ### Reindex
//! | 0 | read_write | cell_offset (atomic) |
//! | 1 | read | particle_cell |
//! | 2 | read | predicted |
//! | 3 | read_write | sorted_index |
//! | 4 | read_write | sorted_pos |
//!
//! ### Solver (compute_lambdas / compute_deltas / apply_deltas)
//! | 0 | read_write | predicted |
//! | 1 | read_write | lambda |
//! | 2 | read_write | delta |
//! | 3 | read | sorted_index |
//! | 4 | read_write | sorted_pos |
//! | 5 | read | cell_count |
//! | 6 | read | cell_offset |
//!
//! ### Viscosity (xsph_gather / xsph_apply)
//! | 0 | read_write | velocity (current section) |
//! | 1 | read_write | delta (scratch) |
//! | 2 | read | sorted_index |
//! | 3 | read | sorted_pos |
//! | 4 | read | cell_count |
//! | 5 | read | cell_offset |

use super::fluid_buffers::{FluidBuffers, SECTION_COUNT, UNIFORM_STRIDE};
use super::stages::Kernel;

/// Invocations per workgroup for per-particle passes
pub const WORKGROUP_SIZE_PARTICLES: u32 = 128;

/// Invocations per workgroup for per-cell passes; equals the scan block size
pub const WORKGROUP_SIZE_GRID: u32 = 256;

/// All compute pipelines of the substep schedule
pub struct FluidPipelines {
    pub predict: wgpu::ComputePipeline,
    pub grid_clear: wgpu::ComputePipeline,
    pub grid_count: wgpu::ComputePipeline,
    pub scan_blocks: wgpu::ComputePipeline,
    pub scan_block_sums: wgpu::ComputePipeline,
    pub scan_combine: wgpu::ComputePipeline,
    pub reindex: wgpu::ComputePipeline,
    pub compute_lambdas: wgpu::ComputePipeline,
    pub compute_deltas: wgpu::ComputePipeline,
    pub apply_deltas: wgpu::ComputePipeline,
    pub finalize: wgpu::ComputePipeline,
    pub xsph_gather: wgpu::ComputePipeline,
    pub xsph_apply: wgpu::ComputePipeline,

    pub uniform_layout: wgpu::BindGroupLayout,
    pub integrate_layout: wgpu::BindGroupLayout,
    pub grid_layout: wgpu::BindGroupLayout,
    pub scan_layout: wgpu::BindGroupLayout,
    pub reindex_layout: wgpu::BindGroupLayout,
    pub solver_layout: wgpu::BindGroupLayout,
    pub viscosity_layout: wgpu::BindGroupLayout,
}

impl FluidPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let integrate_layout = Self::create_storage_layout(
            device,
            "Integrate Layout",
            &[true, true, false, false, false, false, false],
        );
        let grid_layout = Self::create_storage_layout(device, "Grid Layout", &[false, false, true]);
        let scan_layout = Self::create_storage_layout(device, "Scan Layout", &[true, false, false]);
        let reindex_layout = Self::create_storage_layout(
            device,
            "Reindex Layout",
            &[false, true, true, false, false],
        );
        let solver_layout = Self::create_storage_layout(
            device,
            "Solver Layout",
            &[false, false, false, true, false, true, true],
        );
        let viscosity_layout = Self::create_storage_layout(
            device,
            "Viscosity Layout",
            &[false, false, true, true, true, true],
        );

        let integrate_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Integrate Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/fluid/integrate.wgsl").into(),
            ),
        });
        let grid_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Grid Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/fluid/grid.wgsl").into()),
        });
        let scan_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Scan Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/fluid/scan.wgsl").into()),
        });
        let reindex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Reindex Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/fluid/reindex.wgsl").into(),
            ),
        });
        let solver_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Solver Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/fluid/solver.wgsl").into(),
            ),
        });
        let viscosity_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Viscosity Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shaders/fluid/viscosity.wgsl").into(),
            ),
        });

        let integrate_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Integrate Pipeline Layout"),
                bind_group_layouts: &[&uniform_layout, &integrate_layout],
                push_constant_ranges: &[],
            });
        let grid_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grid Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &grid_layout],
            push_constant_ranges: &[],
        });
        let scan_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scan Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &scan_layout],
            push_constant_ranges: &[],
        });
        let reindex_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Reindex Pipeline Layout"),
                bind_group_layouts: &[&uniform_layout, &reindex_layout],
                push_constant_ranges: &[],
            });
        let solver_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Solver Pipeline Layout"),
                bind_group_layouts: &[&uniform_layout, &solver_layout],
                push_constant_ranges: &[],
            });
        let viscosity_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Viscosity Pipeline Layout"),
                bind_group_layouts: &[&uniform_layout, &viscosity_layout],
                push_constant_ranges: &[],
            });

        let create = |module: &wgpu::ShaderModule,
                      layout: &wgpu::PipelineLayout,
                      entry: &'static str,
                      label: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Self {
            predict: create(
                &integrate_module,
                &integrate_pipeline_layout,
                "predict",
                "Fluid Predict",
            ),
            finalize: create(
                &integrate_module,
                &integrate_pipeline_layout,
                "finalize",
                "Fluid Finalize",
            ),
            grid_clear: create(&grid_module, &grid_pipeline_layout, "clear", "Grid Clear"),
            grid_count: create(&grid_module, &grid_pipeline_layout, "count", "Grid Count"),
            scan_blocks: create(
                &scan_module,
                &scan_pipeline_layout,
                "scan_blocks",
                "Scan Blocks",
            ),
            scan_block_sums: create(
                &scan_module,
                &scan_pipeline_layout,
                "scan_block_sums",
                "Scan Block Sums",
            ),
            scan_combine: create(
                &scan_module,
                &scan_pipeline_layout,
                "scan_combine",
                "Scan Combine",
            ),
            reindex: create(
                &reindex_module,
                &reindex_pipeline_layout,
                "main",
                "Particle Reindex",
            ),
            compute_lambdas: create(
                &solver_module,
                &solver_pipeline_layout,
                "compute_lambdas",
                "Solver Lambdas",
            ),
            compute_deltas: create(
                &solver_module,
                &solver_pipeline_layout,
                "compute_deltas",
                "Solver Deltas",
            ),
            apply_deltas: create(
                &solver_module,
                &solver_pipeline_layout,
                "apply_deltas",
                "Solver Apply",
            ),
            xsph_gather: create(
                &viscosity_module,
                &viscosity_pipeline_layout,
                "xsph_gather",
                "Xsph Gather",
            ),
            xsph_apply: create(
                &viscosity_module,
                &viscosity_pipeline_layout,
                "xsph_apply",
                "Xsph Apply",
            ),
            uniform_layout,
            integrate_layout,
            grid_layout,
            scan_layout,
            reindex_layout,
            solver_layout,
            viscosity_layout,
        }
    }

    /// Storage-buffer layout builder; `read_only[i]` is binding i's access
    fn create_storage_layout(
        device: &wgpu::Device,
        label: &str,
        read_only: &[bool],
    ) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = read_only
            .iter()
            .enumerate()
            .map(|(i, &ro)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: ro },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
    }

    /// Pipeline driven by a stage-table kernel
    pub fn pipeline(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        match kernel {
            Kernel::Predict => &self.predict,
            Kernel::GridClear => &self.grid_clear,
            Kernel::GridCount => &self.grid_count,
            Kernel::ScanBlocks => &self.scan_blocks,
            Kernel::ScanBlockSums => &self.scan_block_sums,
            Kernel::ScanCombine => &self.scan_combine,
            Kernel::Reindex => &self.reindex,
            Kernel::Lambdas => &self.compute_lambdas,
            Kernel::Deltas => &self.compute_deltas,
            Kernel::ApplyDeltas => &self.apply_deltas,
            Kernel::Finalize => &self.finalize,
            Kernel::XsphGather => &self.xsph_gather,
            Kernel::XsphApply => &self.xsph_apply,
        }
    }
}

fn entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

/// Bind groups pre-created for every ring pairing; index by the substep's
/// current (write) section, the integration input being the section before it
pub struct CachedBindGroups {
    pub uniforms: wgpu::BindGroup,
    pub integrate: [wgpu::BindGroup; SECTION_COUNT],
    pub grid: [wgpu::BindGroup; SECTION_COUNT],
    pub scan: [wgpu::BindGroup; SECTION_COUNT],
    pub reindex: [wgpu::BindGroup; SECTION_COUNT],
    pub solver: [wgpu::BindGroup; SECTION_COUNT],
    pub viscosity: [wgpu::BindGroup; SECTION_COUNT],
}

impl CachedBindGroups {
    pub fn new(
        device: &wgpu::Device,
        pipelines: &FluidPipelines,
        buffers: &FluidBuffers,
    ) -> Self {
        let uniforms = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fluid Uniforms Bind Group"),
            layout: &pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffers.uniforms,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_STRIDE),
                }),
            }],
        });

        let integrate = std::array::from_fn(|cur| {
            let prev = (cur + SECTION_COUNT - 1) % SECTION_COUNT;
            let read = &buffers.sections[prev];
            let write = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Integrate Bind Group"),
                layout: &pipelines.integrate_layout,
                entries: &[
                    entry(0, &read.position),
                    entry(1, &read.velocity),
                    entry(2, &write.position),
                    entry(3, &write.velocity),
                    entry(4, &write.predicted),
                    entry(5, &write.force),
                    entry(6, &write.color),
                ],
            })
        });

        let grid = std::array::from_fn(|cur| {
            let s = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Grid Bind Group"),
                layout: &pipelines.grid_layout,
                entries: &[
                    entry(0, &s.cell_count),
                    entry(1, &s.particle_cell),
                    entry(2, &s.predicted),
                ],
            })
        });

        let scan = std::array::from_fn(|cur| {
            let s = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Scan Bind Group"),
                layout: &pipelines.scan_layout,
                entries: &[
                    entry(0, &s.cell_count),
                    entry(1, &s.cell_offset),
                    entry(2, &s.block_sums),
                ],
            })
        });

        let reindex = std::array::from_fn(|cur| {
            let s = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Reindex Bind Group"),
                layout: &pipelines.reindex_layout,
                entries: &[
                    entry(0, &s.cell_offset),
                    entry(1, &s.particle_cell),
                    entry(2, &s.predicted),
                    entry(3, &s.sorted_index),
                    entry(4, &s.sorted_pos),
                ],
            })
        });

        let solver = std::array::from_fn(|cur| {
            let s = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Solver Bind Group"),
                layout: &pipelines.solver_layout,
                entries: &[
                    entry(0, &s.predicted),
                    entry(1, &s.lambda),
                    entry(2, &s.delta),
                    entry(3, &s.sorted_index),
                    entry(4, &s.sorted_pos),
                    entry(5, &s.cell_count),
                    entry(6, &s.cell_offset),
                ],
            })
        });

        let viscosity = std::array::from_fn(|cur| {
            let s = &buffers.sections[cur];
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Viscosity Bind Group"),
                layout: &pipelines.viscosity_layout,
                entries: &[
                    entry(0, &s.velocity),
                    entry(1, &s.delta),
                    entry(2, &s.sorted_index),
                    entry(3, &s.sorted_pos),
                    entry(4, &s.cell_count),
                    entry(5, &s.cell_offset),
                ],
            })
        });

        Self {
            uniforms,
            integrate,
            grid,
            scan,
            reindex,
            solver,
            viscosity,
        }
    }

    /// Stage-family bind group for a kernel, for the given current section
    pub fn for_kernel(&self, kernel: Kernel, cur: usize) -> &wgpu::BindGroup {
        match kernel {
            Kernel::Predict | Kernel::Finalize => &self.integrate[cur],
            Kernel::GridClear | Kernel::GridCount => &self.grid[cur],
            Kernel::ScanBlocks | Kernel::ScanBlockSums | Kernel::ScanCombine => &self.scan[cur],
            Kernel::Reindex => &self.reindex[cur],
            Kernel::Lambdas | Kernel::Deltas | Kernel::ApplyDeltas => &self.solver[cur],
            Kernel::XsphGather | Kernel::XsphApply => &self.viscosity[cur],
        }
    }
}
