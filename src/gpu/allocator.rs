// SPDX-License-Identifier: GPL-3.0-only

//! Blob and staging allocators
//!
//! A device owns one pool per allocator kind. Filter modules acquire an
//! [`Allocator`] handle at construction and the handle goes back to its pool
//! when dropped, on every exit path. Each [`DeviceBuffer`] keeps its
//! allocator core alive, so a buffer can never outlive the allocator that
//! produced it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use crate::errors::{FilterError, FilterResult};

/// Which memory pool an allocator draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    /// Large device-local storage buffers (stage intermediates, kernels)
    Blob,
    /// Host-visible buffers used to move data across the bus
    Staging,
}

impl AllocatorKind {
    fn label(self) -> &'static str {
        match self {
            AllocatorKind::Blob => "blob",
            AllocatorKind::Staging => "staging",
        }
    }
}

/// Live allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_buffers: usize,
    pub live_bytes: u64,
}

/// Shared state behind an allocator handle
#[derive(Debug)]
pub(crate) struct AllocatorCore {
    kind: AllocatorKind,
    id: usize,
    device: Arc<wgpu::Device>,
    live_buffers: AtomicUsize,
    live_bytes: AtomicU64,
}

impl AllocatorCore {
    fn track(&self, size: u64) {
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(size, Ordering::Relaxed);
    }

    fn untrack(&self, size: u64) {
        self.live_buffers.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(size, Ordering::Relaxed);
    }
}

/// Per-kind pool of allocator cores owned by a device
#[derive(Debug)]
pub(crate) struct AllocatorPool {
    kind: AllocatorKind,
    device: Arc<wgpu::Device>,
    free: Mutex<Vec<Arc<AllocatorCore>>>,
    created: AtomicUsize,
    outstanding: AtomicUsize,
}

impl AllocatorPool {
    pub(crate) fn new(kind: AllocatorKind, device: Arc<wgpu::Device>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            device,
            free: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Hand out a pooled core, creating one when the pool is empty
    pub(crate) fn acquire(self: &Arc<Self>) -> Allocator {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let core = reused.unwrap_or_else(|| {
            let id = self.created.fetch_add(1, Ordering::Relaxed);
            debug!(kind = self.kind.label(), id, "Creating allocator");
            Arc::new(AllocatorCore {
                kind: self.kind,
                id,
                device: Arc::clone(&self.device),
                live_buffers: AtomicUsize::new(0),
                live_bytes: AtomicU64::new(0),
            })
        });

        self.outstanding.fetch_add(1, Ordering::Relaxed);
        Allocator {
            core,
            pool: Arc::clone(self),
        }
    }

    fn reclaim(&self, core: Arc<AllocatorCore>) {
        debug!(kind = self.kind.label(), id = core.id, "Reclaiming allocator");
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(core);
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }
}

/// Scoped allocator handle, returned to the device pool on drop
#[derive(Debug)]
pub struct Allocator {
    core: Arc<AllocatorCore>,
    pool: Arc<AllocatorPool>,
}

impl Allocator {
    pub fn kind(&self) -> AllocatorKind {
        self.core.kind
    }

    /// Pool-local identity; a reacquired handle may reuse an earlier id
    pub fn id(&self) -> usize {
        self.core.id
    }

    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            live_buffers: self.core.live_buffers.load(Ordering::Relaxed),
            live_bytes: self.core.live_bytes.load(Ordering::Relaxed),
        }
    }

    /// Reject sizes the device would refuse; storage buffers must also fit
    /// in a single binding
    fn check_size(&self, size: u64, binding: bool, label: &str) -> FilterResult<()> {
        let limits = self.core.device.limits();
        let max = if binding {
            limits
                .max_buffer_size
                .min(u64::from(limits.max_storage_buffer_binding_size))
        } else {
            limits.max_buffer_size
        };
        if size > max {
            warn!(label, size, max, "Buffer exceeds device limits");
            return Err(FilterError::Shape(format!(
                "{} needs {} bytes, device allows at most {}",
                label, size, max
            )));
        }
        Ok(())
    }

    fn wrap(&self, buffer: wgpu::Buffer, size: u64) -> DeviceBuffer {
        self.core.track(size);
        DeviceBuffer {
            buffer,
            size,
            owner: Arc::clone(&self.core),
        }
    }

    /// Uninitialized storage buffer that can be copied in both directions
    pub(crate) fn storage(&self, size: u64, label: &str) -> FilterResult<DeviceBuffer> {
        self.check_size(size, true, label)?;
        let buffer = self.core.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(self.wrap(buffer, size))
    }

    /// Storage buffer filled with `contents` at creation
    pub(crate) fn storage_init(&self, contents: &[u8], label: &str) -> FilterResult<DeviceBuffer> {
        self.check_size(contents.len() as u64, true, label)?;
        let buffer = self
            .core
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            });
        Ok(self.wrap(buffer, contents.len() as u64))
    }

    /// Host-written staging buffer used as a copy source
    pub(crate) fn upload_staging(&self, contents: &[u8], label: &str) -> FilterResult<DeviceBuffer> {
        self.check_size(contents.len() as u64, false, label)?;
        let buffer = self
            .core
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        Ok(self.wrap(buffer, contents.len() as u64))
    }

    /// Mappable readback buffer used as a copy destination
    pub(crate) fn download_staging(&self, size: u64, label: &str) -> FilterResult<DeviceBuffer> {
        self.check_size(size, false, label)?;
        let buffer = self.core.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(self.wrap(buffer, size))
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        // The pool keeps its own reference; ours goes with `self`
        self.pool.reclaim(Arc::clone(&self.core));
    }
}

/// A device buffer tied to the allocator that created it
#[derive(Debug)]
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    owner: Arc<AllocatorCore>,
}

impl DeviceBuffer {
    pub(crate) fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn allocator_kind(&self) -> AllocatorKind {
        self.owner.kind
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.owner.untrack(self.size);
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::FilterError;
    use crate::gpu::GpuDevice;

    #[test]
    fn test_dropped_handle_returns_to_pool() {
        let device = GpuDevice::noop();
        let blob = device.acquire_blob_allocator();
        let id = blob.id();
        assert_eq!(device.outstanding_allocators(), 1);

        drop(blob);
        assert_eq!(device.outstanding_allocators(), 0);
        assert_eq!(device.acquire_blob_allocator().id(), id);
    }

    #[test]
    fn test_sizes_checked_against_limits() {
        let device = GpuDevice::noop();
        let (max_buffer, max_binding) = device.buffer_limits();
        let blob = device.acquire_blob_allocator();
        let staging = device.acquire_staging_allocator();

        assert!(matches!(
            blob.storage(max_binding.min(max_buffer) + 4, "too big"),
            Err(FilterError::Shape(_))
        ));
        assert!(matches!(
            staging.download_staging(max_buffer + 4, "too big"),
            Err(FilterError::Shape(_))
        ));
        assert_eq!(blob.stats().live_buffers, 0);

        let buffer = blob.storage(64, "fits").unwrap();
        assert_eq!(buffer.size(), 64);
        assert_eq!(blob.stats().live_bytes, 64);
        assert!(device.take_uncaptured_error().is_none());
    }
}
