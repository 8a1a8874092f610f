// SPDX-License-Identifier: GPL-3.0-only

//! Command recorder
//!
//! Uploads, dispatches and downloads are recorded into one encoder and
//! submitted as a single unit of work. The recorder moves through
//! `Idle -> Recording -> Submitted` and only [`ComputeCommand::reset`]
//! brings it back to `Idle`. One recorder must only be used from one
//! thread at a time.

use std::sync::Arc;

use tracing::debug;

use crate::compute::binding::BindingSet;
use crate::compute::mat::{DeviceMat, HostMat, MatShape};
use crate::compute::pipeline::Pipeline;
use crate::errors::{FilterError, FilterResult, NotReadyReason};
use crate::gpu::{Allocator, DeviceBuffer, GpuDevice};

/// Recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Submitted,
}

/// Handle to a download recorded before submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSlot(usize);

#[derive(Debug)]
struct PendingDownload {
    staging: DeviceBuffer,
    shape: MatShape,
}

/// Host copies of every recorded download, available after submission
#[derive(Debug, Default)]
pub struct Downloads {
    items: Vec<Option<(MatShape, Vec<u8>)>>,
}

impl Downloads {
    fn take_raw(&mut self, slot: DownloadSlot) -> FilterResult<(MatShape, Vec<u8>)> {
        self.items
            .get_mut(slot.0)
            .and_then(Option::take)
            .ok_or_else(|| FilterError::Map(format!("download {} already taken", slot.0)))
    }

    /// Move a download into a new host buffer
    pub fn take(&mut self, slot: DownloadSlot) -> FilterResult<HostMat> {
        let (shape, mut bytes) = self.take_raw(slot)?;
        bytes.truncate(shape.byte_len());
        HostMat::from_bytes(shape, bytes)
    }

    /// Copy a download into `dst`, reshaping it if needed
    pub fn write_into(&mut self, slot: DownloadSlot, dst: &mut HostMat) -> FilterResult<()> {
        let (shape, bytes) = self.take_raw(slot)?;
        dst.write_device_bytes(shape, &bytes)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Helper for async buffer readback (map, poll, read, unmap)
pub(crate) async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> FilterResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| FilterError::Device(e.to_string()))?;

    receiver
        .await
        .map_err(|_| FilterError::Map("mapping callback dropped".to_string()))?
        .map_err(|e| FilterError::Map(format!("{:?}", e)))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Single-stream recorder reused across filter calls
#[derive(Debug)]
pub struct ComputeCommand {
    device: Arc<GpuDevice>,
    state: RecorderState,
    encoder: Option<wgpu::CommandEncoder>,
    scope_open: bool,
    // Constant blocks and upload staging kept alive until reset
    transient: Vec<DeviceBuffer>,
    downloads: Vec<PendingDownload>,
    dispatches: usize,
}

impl ComputeCommand {
    pub fn new(device: Arc<GpuDevice>) -> Self {
        Self {
            device,
            state: RecorderState::Idle,
            encoder: None,
            scope_open: false,
            transient: Vec::new(),
            downloads: Vec::new(),
            dispatches: 0,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RecorderState::Idle
    }

    /// Dispatches recorded since the last reset
    pub fn dispatch_count(&self) -> usize {
        self.dispatches
    }

    /// Enter `Recording`
    ///
    /// Opens the validation and out-of-memory error scopes before any
    /// resource of the submission is created. Fails with
    /// `NotReady(RecorderBusy)` once submitted.
    pub(crate) fn begin(&mut self) -> FilterResult<()> {
        match self.state {
            RecorderState::Submitted => Err(FilterError::NotReady(NotReadyReason::RecorderBusy)),
            RecorderState::Recording => Ok(()),
            RecorderState::Idle => {
                self.device.push_error_scopes();
                self.scope_open = true;
                self.encoder = Some(self.device.device().create_command_encoder(
                    &wgpu::CommandEncoderDescriptor {
                        label: Some("vkfilters command"),
                    },
                ));
                self.state = RecorderState::Recording;
                Ok(())
            }
        }
    }

    fn encoder(&mut self) -> FilterResult<&mut wgpu::CommandEncoder> {
        self.begin()?;
        self.encoder
            .as_mut()
            .ok_or(FilterError::NotReady(NotReadyReason::RecorderBusy))
    }

    /// Clone a host buffer up to a fresh device buffer
    pub fn record_upload(
        &mut self,
        src: &HostMat,
        blob: &Allocator,
        staging: &Allocator,
    ) -> FilterResult<DeviceMat> {
        let shape = src.shape();
        shape.validate()?;
        self.begin()?;

        let dst = DeviceMat::with_shape(shape, blob)?;
        let target = dst.require("upload")?;
        let staged = staging.upload_staging(&src.device_bytes(), "vkfilters upload")?;

        self.encoder()?
            .copy_buffer_to_buffer(staged.raw(), 0, target.raw(), 0, shape.device_len());
        self.transient.push(staged);

        debug!(
            width = shape.width,
            height = shape.height,
            bytes = shape.device_len(),
            "Recorded upload"
        );
        Ok(dst)
    }

    /// Record one dispatch of `pipeline` covering `dispatch`
    pub fn record_pipeline(
        &mut self,
        pipeline: &Pipeline,
        bindings: &BindingSet<'_>,
        dispatch: &MatShape,
        blob: &Allocator,
    ) -> FilterResult<()> {
        if bindings.layout() != pipeline.layout() {
            return Err(FilterError::binding(
                bindings.stage(),
                format!("layout does not match pipeline `{}`", pipeline.name()),
            ));
        }
        let resolved = bindings.resolve()?;
        self.begin()?;

        // Zero-sized bindings are invalid
        let mut constant_bytes = resolved.constants.as_bytes().to_vec();
        if constant_bytes.is_empty() {
            constant_bytes.resize(4, 0);
        }
        let constants = blob.storage_init(&constant_bytes, "vkfilters constants")?;

        let mut entries: Vec<wgpu::BindGroupEntry> = resolved
            .buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.raw().as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: pipeline.layout().constants_binding(),
            resource: constants.raw().as_entire_binding(),
        });

        let bind_group = self
            .device
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pipeline.name()),
                layout: pipeline.bind_group_layout(),
                entries: &entries,
            });

        let (x, y, z) = pipeline.dispatch_size(dispatch);
        {
            let encoder = self.encoder()?;
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(pipeline.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline.raw());
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x, y, z);
        }

        self.transient.push(constants);
        self.dispatches += 1;

        debug!(
            pipeline = pipeline.name(),
            groups_x = x,
            groups_y = y,
            "Recorded dispatch"
        );
        Ok(())
    }

    /// Clone a device buffer down once the work has been submitted
    pub fn record_download(
        &mut self,
        src: &DeviceMat,
        staging: &Allocator,
    ) -> FilterResult<DownloadSlot> {
        let shape = src.shape();
        let source = src.require("download")?;
        self.begin()?;
        let readback = staging.download_staging(shape.device_len(), "vkfilters download")?;

        self.encoder()?
            .copy_buffer_to_buffer(source.raw(), 0, readback.raw(), 0, shape.device_len());

        self.downloads.push(PendingDownload {
            staging: readback,
            shape,
        });
        Ok(DownloadSlot(self.downloads.len() - 1))
    }

    /// Submit everything recorded and block until the device finishes
    ///
    /// There is no timeout; a hung device blocks the caller.
    pub fn submit_and_wait(&mut self) -> FilterResult<Downloads> {
        match self.state {
            RecorderState::Submitted => {
                return Err(FilterError::NotReady(NotReadyReason::RecorderBusy));
            }
            RecorderState::Idle => return Ok(Downloads::default()),
            RecorderState::Recording => {}
        }

        let encoder = self
            .encoder
            .take()
            .ok_or(FilterError::NotReady(NotReadyReason::RecorderBusy))?;
        self.device.queue().submit(Some(encoder.finish()));
        self.state = RecorderState::Submitted;

        debug!(dispatches = self.dispatches, downloads = self.downloads.len(), "Submitted");

        self.device.wait_idle()?;

        let scoped = if self.scope_open {
            self.scope_open = false;
            self.device.pop_error_scopes()
        } else {
            None
        };
        if let Some(message) = scoped.or_else(|| self.device.take_uncaptured_error()) {
            return Err(FilterError::Device(message));
        }

        if self.device.is_lost() {
            return Err(FilterError::NotReady(NotReadyReason::DeviceLost));
        }

        let mut items = Vec::with_capacity(self.downloads.len());
        for pending in &self.downloads {
            let bytes = pollster::block_on(read_buffer_async(
                self.device.device(),
                pending.staging.raw(),
            ))?;
            items.push(Some((pending.shape, bytes)));
        }

        Ok(Downloads { items })
    }

    /// Drop recorded state and return to `Idle`
    pub fn reset(&mut self) {
        if self.scope_open {
            self.scope_open = false;
            // Errors of abandoned work are not reported
            let _ = self.device.pop_error_scopes();
        }
        self.encoder = None;
        self.transient.clear();
        self.downloads.clear();
        self.dispatches = 0;
        self.state = RecorderState::Idle;
    }
}

impl Drop for ComputeCommand {
    fn drop(&mut self) {
        self.reset();
    }
}
