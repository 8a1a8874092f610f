// SPDX-License-Identifier: GPL-3.0-only

//! Filter modules
//!
//! Each module owns a [`FilterContext`] (device, allocators, recorder) and
//! its stage pipelines. A call normalizes residency, records the stage
//! graph, submits and waits, downloads into a host destination and resets
//! the recorder, whatever the outcome.

pub mod bilateral;
pub mod gaussian;
pub mod harris;
pub mod kernel;
pub mod star;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::compute::{
    BindingSet, CompileOptions, ComputeCommand, DeviceMat, HostMat, LocalSize, MatDst, MatShape,
    MatSrc, Pipeline, ShaderDescriptor, SpecValue, Transfer, compile_shader,
};
use crate::errors::{FilterError, FilterResult, NotReadyReason};
use crate::gpu::{Allocator, DeviceSelector, GpuDevice, get_gpu_device};

pub use bilateral::Bilateral;
pub use gaussian::GaussianBlur;
pub use harris::{Harris, HarrisParams};
pub use kernel::{KernelCache, gaussian_kernel};
pub use star::Star;

/// Device, allocators and recorder shared by the stages of one module
#[derive(Debug)]
pub struct FilterContext {
    cmd: ComputeCommand,
    transfer: Transfer,
    blob: Allocator,
    staging: Allocator,
    options: CompileOptions,
    device: Arc<GpuDevice>,
}

impl FilterContext {
    pub fn new(selector: DeviceSelector) -> FilterResult<Self> {
        Self::with_options(selector, CompileOptions::default())
    }

    pub fn with_options(selector: DeviceSelector, options: CompileOptions) -> FilterResult<Self> {
        Ok(Self::from_device(get_gpu_device(selector)?, options))
    }

    /// Build on an already opened device
    pub fn from_device(device: Arc<GpuDevice>, options: CompileOptions) -> Self {
        let options = options.sanitize(&device);
        Self {
            cmd: ComputeCommand::new(Arc::clone(&device)),
            transfer: Transfer::new(&device),
            blob: device.acquire_blob_allocator(),
            staging: device.acquire_staging_allocator(),
            options,
            device,
        }
    }

    pub fn device(&self) -> &Arc<GpuDevice> {
        &self.device
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn blob_allocator(&self) -> &Allocator {
        &self.blob
    }

    pub fn staging_allocator(&self) -> &Allocator {
        &self.staging
    }

    /// Compile a stage with the context options and default local size
    pub fn pipeline(&self, desc: &ShaderDescriptor) -> FilterResult<Pipeline> {
        self.pipeline_with(desc, &[])
    }

    pub fn pipeline_with(
        &self,
        desc: &ShaderDescriptor,
        specializations: &[(&str, SpecValue)],
    ) -> FilterResult<Pipeline> {
        let compiled = compile_shader(desc, &self.options)?;
        Pipeline::new(&self.device, &compiled, LocalSize::default(), specializations)
    }

    /// Blocking upload with this context's allocators
    pub fn upload(&self, src: &HostMat) -> FilterResult<DeviceMat> {
        self.transfer.upload(src, &self.blob, &self.staging)
    }

    /// Blocking download with this context's staging allocator
    pub fn download(&self, src: &DeviceMat) -> FilterResult<HostMat> {
        self.transfer.download(src, &self.staging)
    }

    /// `Ready` check done before any recording
    pub fn ensure_ready(&self) -> FilterResult<()> {
        if self.device.is_lost() {
            return Err(FilterError::NotReady(NotReadyReason::DeviceLost));
        }
        if !self.cmd.is_idle() {
            return Err(FilterError::NotReady(NotReadyReason::RecorderBusy));
        }
        Ok(())
    }

    /// Run one stage graph from `src` into `dst`
    ///
    /// `out_shape` is the shape of the final buffer the graph writes. Returns
    /// the elapsed wall time in milliseconds.
    pub(crate) fn run<F>(
        &mut self,
        name: &str,
        src: MatSrc<'_>,
        dst: MatDst<'_>,
        out_shape: MatShape,
        graph: F,
    ) -> FilterResult<f64>
    where
        F: FnOnce(&mut Stages<'_>, &DeviceMat, &DeviceMat) -> FilterResult<()>,
    {
        let start = Instant::now();
        self.ensure_ready()?;

        let result = self.record_and_submit(src, dst, out_shape, graph);
        self.cmd.reset();
        result?;

        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        debug!(filter = name, width = out_shape.width, height = out_shape.height, elapsed_ms = elapsed, "Filter complete");
        Ok(elapsed)
    }

    fn record_and_submit<F>(
        &mut self,
        src: MatSrc<'_>,
        dst: MatDst<'_>,
        out_shape: MatShape,
        graph: F,
    ) -> FilterResult<()>
    where
        F: FnOnce(&mut Stages<'_>, &DeviceMat, &DeviceMat) -> FilterResult<()>,
    {
        src.shape().validate()?;
        out_shape.validate()?;
        self.cmd.begin()?;

        let uploaded;
        let src = match src {
            MatSrc::Host(host) => {
                uploaded = self.cmd.record_upload(host, &self.blob, &self.staging)?;
                &uploaded
            }
            MatSrc::Device(device) => {
                device.require("src")?;
                device
            }
        };

        match dst {
            MatDst::Device(out) => {
                out.create_shape(out_shape, &self.blob)?;
                let mut stages = Stages::new(&mut self.cmd, &self.blob);
                graph(&mut stages, src, out)?;
                let retained = stages.retained;
                self.cmd.submit_and_wait()?;
                drop(retained);
            }
            MatDst::Host(host) => {
                let out = DeviceMat::with_shape(out_shape, &self.blob)?;
                let mut stages = Stages::new(&mut self.cmd, &self.blob);
                graph(&mut stages, src, &out)?;
                let retained = stages.retained;
                let slot = self.cmd.record_download(&out, &self.staging)?;
                let mut downloads = self.cmd.submit_and_wait()?;
                downloads.write_into(slot, host)?;
                drop(retained);
            }
        }
        Ok(())
    }
}

/// Recording handle given to a stage graph
pub(crate) struct Stages<'a> {
    cmd: &'a mut ComputeCommand,
    blob: &'a Allocator,
    retained: Vec<DeviceMat>,
}

impl<'a> Stages<'a> {
    fn new(cmd: &'a mut ComputeCommand, blob: &'a Allocator) -> Self {
        Self {
            cmd,
            blob,
            retained: Vec::new(),
        }
    }

    /// Fresh intermediate buffer, alive until the submission completes
    pub(crate) fn alloc(&mut self, shape: MatShape) -> FilterResult<DeviceMat> {
        let mat = DeviceMat::with_shape(shape, self.blob)?;
        self.retained.push(mat.share());
        Ok(mat)
    }

    /// Record `pipeline` over every pixel of `shape`
    pub(crate) fn dispatch(
        &mut self,
        pipeline: &Pipeline,
        bindings: BindingSet<'_>,
        shape: &MatShape,
    ) -> FilterResult<()> {
        self.cmd.record_pipeline(pipeline, &bindings, shape, self.blob)
    }
}

/// Log construction of a module
fn log_ready(name: &str, ctx: &FilterContext) {
    info!(
        filter = name,
        adapter = %ctx.device().info().adapter_name,
        fp16_storage = ctx.options().use_fp16_storage,
        fp16_arithmetic = ctx.options().use_fp16_arithmetic,
        "Filter module ready"
    );
}
