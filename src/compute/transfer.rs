// SPDX-License-Identifier: GPL-3.0-only

//! One-shot transfers outside a filter's command stream

use std::sync::Arc;

use tracing::debug;

use crate::compute::command::ComputeCommand;
use crate::compute::mat::{DeviceMat, HostMat};
use crate::errors::FilterResult;
use crate::gpu::{Allocator, GpuDevice};

/// Blocking upload/download helper
///
/// Every call records into its own recorder, submits and waits, so it never
/// interleaves with work a filter is recording.
#[derive(Debug, Clone)]
pub struct Transfer {
    device: Arc<GpuDevice>,
}

impl Transfer {
    pub fn new(device: &Arc<GpuDevice>) -> Self {
        Self {
            device: Arc::clone(device),
        }
    }

    /// Copy `src` into a new device buffer from `blob`
    pub fn upload(
        &self,
        src: &HostMat,
        blob: &Allocator,
        staging: &Allocator,
    ) -> FilterResult<DeviceMat> {
        let mut cmd = ComputeCommand::new(Arc::clone(&self.device));
        let dst = cmd.record_upload(src, blob, staging)?;
        cmd.submit_and_wait()?;
        debug!(bytes = src.as_bytes().len(), "Transfer upload complete");
        Ok(dst)
    }

    /// Read a device buffer back into a new host buffer
    pub fn download(&self, src: &DeviceMat, staging: &Allocator) -> FilterResult<HostMat> {
        let mut cmd = ComputeCommand::new(Arc::clone(&self.device));
        let slot = cmd.record_download(src, staging)?;
        let mut downloads = cmd.submit_and_wait()?;
        downloads.take(slot)
    }
}
