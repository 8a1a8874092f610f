// SPDX-License-Identifier: GPL-3.0-only

//! Compute pipelines built from compiled stages

use tracing::info;

use crate::compute::binding::StageLayout;
use crate::compute::compiler::{CompiledShader, SpecValue};
use crate::compute::mat::MatShape;
use crate::constants::workgroup;
use crate::errors::{FilterError, FilterResult};
use crate::gpu::GpuDevice;

/// Local workgroup shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl LocalSize {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn invocations(&self) -> u32 {
        self.x * self.y * self.z
    }
}

impl Default for LocalSize {
    fn default() -> Self {
        Self::new(workgroup::X, workgroup::Y, workgroup::Z)
    }
}

/// Calculate compute shader dispatch size (workgroups needed)
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}

/// One executable stage
#[derive(Debug)]
pub struct Pipeline {
    name: &'static str,
    local: LocalSize,
    layout: StageLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl Pipeline {
    /// Bake local size and specializations into `shader` and create the
    /// device objects
    pub fn new(
        device: &GpuDevice,
        shader: &CompiledShader,
        local: LocalSize,
        specializations: &[(&str, SpecValue)],
    ) -> FilterResult<Self> {
        let name = shader.name();
        let pipeline_err = |message: String| FilterError::Pipeline {
            name: name.to_string(),
            message,
        };

        let max = device.device().limits().max_compute_invocations_per_workgroup;
        if local.x == 0 || local.y == 0 || local.z == 0 || local.invocations() > max {
            return Err(pipeline_err(format!(
                "local size {}x{}x{} outside device limit of {} invocations",
                local.x, local.y, local.z, max
            )));
        }

        let source = shader.render(local, specializations)?;
        let layout = *shader.layout();
        let wgpu_device = device.device();

        device.push_error_scopes();

        let module = wgpu_device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout =
            wgpu_device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(name),
                entries: &layout.layout_entries(),
            });

        let pipeline_layout = wgpu_device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = wgpu_device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(shader.entry_point()),
            compilation_options: Default::default(),
            cache: None,
        });

        if let Some(message) = device.pop_error_scopes() {
            return Err(pipeline_err(message));
        }

        info!(
            pipeline = name,
            local_x = local.x,
            local_y = local.y,
            local_z = local.z,
            "Compute pipeline created"
        );

        Ok(Self {
            name,
            local,
            layout,
            bind_group_layout,
            pipeline,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_size(&self) -> LocalSize {
        self.local
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub(crate) fn raw(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Workgroups covering every pixel of `shape`
    pub fn dispatch_size(&self, shape: &MatShape) -> (u32, u32, u32) {
        (
            compute_dispatch_size(shape.width, self.local.x),
            compute_dispatch_size(shape.height, self.local.y),
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_dispatch_size() {
        assert_eq!(compute_dispatch_size(640, 16), 40);
        assert_eq!(compute_dispatch_size(641, 16), 41);
        assert_eq!(compute_dispatch_size(16, 16), 1);
        assert_eq!(compute_dispatch_size(1, 16), 1);
    }

    #[test]
    fn test_default_local_size() {
        let local = LocalSize::default();
        assert_eq!((local.x, local.y, local.z), (16, 16, 1));
        assert_eq!(local.invocations(), 256);
    }
}
