// SPDX-License-Identifier: GPL-3.0-only

//! GPU device acquisition for compute filters
//!
//! Adapters are requested on the Vulkan backend (the `WGPU_BACKEND`
//! environment variable overrides that). [`get_gpu_device`] keeps one shared
//! device per adapter index for the whole process, [`GpuDevice::open`]
//! creates a private one.

pub mod allocator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{debug, error, info, warn};

use crate::errors::{FilterError, FilterResult};
pub use allocator::{Allocator, AllocatorKind, AllocatorStats, DeviceBuffer};
use allocator::AllocatorPool;

/// Which adapter to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// Best available GPU, software adapters only as a last resort
    #[default]
    Default,
    /// Adapter index as listed by [`enumerate_devices`]
    Index(usize),
}

impl From<i32> for DeviceSelector {
    /// Negative indices mean "default device"
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(i) => DeviceSelector::Index(i),
            Err(_) => DeviceSelector::Default,
        }
    }
}

/// One enumerated adapter
#[derive(Debug, Clone)]
pub struct AdapterSummary {
    pub index: usize,
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Adapter index the device was opened on
    pub index: usize,
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan unless overridden)
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    /// Whether half precision shader arithmetic is available
    pub shader_f16: bool,
}

/// Backends to enumerate
fn instance_backends() -> wgpu::Backends {
    wgpu::Backends::from_env().unwrap_or(wgpu::Backends::VULKAN)
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: instance_backends(),
        ..Default::default()
    })
}

fn summarize(index: usize, adapter: &wgpu::Adapter) -> AdapterSummary {
    let info = adapter.get_info();
    AdapterSummary {
        index,
        name: info.name,
        backend: info.backend,
        device_type: info.device_type,
    }
}

/// List every adapter visible to the compute backend
pub fn enumerate_devices() -> Vec<AdapterSummary> {
    create_instance()
        .enumerate_adapters(instance_backends())
        .iter()
        .enumerate()
        .map(|(index, adapter)| summarize(index, adapter))
        .collect()
}

/// Number of visible adapters
pub fn gpu_count() -> usize {
    enumerate_devices().len()
}

/// Pick the default adapter index
///
/// Real hardware first, then virtual/other adapters, then whatever exists
/// (software Vulkan included).
fn default_index(adapters: &[AdapterSummary]) -> Option<usize> {
    let tier = |t: wgpu::DeviceType| match t {
        wgpu::DeviceType::DiscreteGpu => 0,
        wgpu::DeviceType::IntegratedGpu => 1,
        wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => 2,
        _ => 3,
    };
    adapters
        .iter()
        .min_by_key(|a| (tier(a.device_type), a.index))
        .map(|a| a.index)
}

fn resolve_index(selector: DeviceSelector, adapters: &[AdapterSummary]) -> FilterResult<usize> {
    match selector {
        DeviceSelector::Default => default_index(adapters).ok_or_else(|| {
            FilterError::DeviceUnavailable("no compute adapters found".to_string())
        }),
        DeviceSelector::Index(i) if i < adapters.len() => Ok(i),
        DeviceSelector::Index(i) => Err(FilterError::DeviceUnavailable(format!(
            "adapter index {} out of range ({} available)",
            i,
            adapters.len()
        ))),
    }
}

/// A logical compute device plus its allocator pools
#[derive(Debug)]
pub struct GpuDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    lost: Arc<AtomicBool>,
    // First error raised outside any error scope, reported by the next submit
    uncaptured: Arc<Mutex<Option<String>>>,
    blob_pool: Arc<AllocatorPool>,
    staging_pool: Arc<AllocatorPool>,
}

impl GpuDevice {
    /// Create a private device on the selected adapter
    pub fn open(selector: DeviceSelector) -> FilterResult<Self> {
        let instance = create_instance();
        let adapters = instance.enumerate_adapters(instance_backends());
        let summaries: Vec<AdapterSummary> = adapters
            .iter()
            .enumerate()
            .map(|(index, adapter)| summarize(index, adapter))
            .collect();

        for a in &summaries {
            debug!(index = a.index, name = %a.name, device_type = ?a.device_type, "Compute adapter");
        }

        let index = resolve_index(selector, &summaries)?;
        let adapter = adapters.into_iter().nth(index).ok_or_else(|| {
            FilterError::DeviceUnavailable(format!("adapter {} disappeared", index))
        })?;

        pollster::block_on(Self::from_adapter(index, adapter))
    }

    async fn from_adapter(index: usize, adapter: wgpu::Adapter) -> FilterResult<Self> {
        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();

        info!(
            index,
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "GPU adapter selected for compute"
        );

        let shader_f16 = adapter.features().contains(wgpu::Features::SHADER_F16);
        let required_features = if shader_f16 {
            wgpu::Features::SHADER_F16
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("vkfilters"),
                required_features,
                required_limits: adapter_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| FilterError::DeviceRequest(e.to_string()))?;

        let info = GpuDeviceInfo {
            index,
            adapter_name: adapter_info.name,
            backend: adapter_info.backend,
            device_type: adapter_info.device_type,
            shader_f16,
        };

        Ok(Self::assemble(device, queue, info))
    }

    /// Wrap a created device, hooking up the lost and error callbacks
    fn assemble(device: wgpu::Device, queue: wgpu::Queue, info: GpuDeviceInfo) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!(?reason, %message, "Compute device lost");
            flag.store(true, Ordering::SeqCst);
        });

        let uncaptured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&uncaptured);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            error!(%error, "Uncaptured compute device error");
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert_with(|| error.to_string());
        }));

        let device = Arc::new(device);
        Self {
            blob_pool: AllocatorPool::new(AllocatorKind::Blob, Arc::clone(&device)),
            staging_pool: AllocatorPool::new(AllocatorKind::Staging, Arc::clone(&device)),
            device,
            queue: Arc::new(queue),
            info,
            lost,
            uncaptured,
        }
    }

    /// Host-only stub device with default limits
    #[cfg(test)]
    pub(crate) fn noop() -> Self {
        let (device, queue) = wgpu::Device::noop(&wgpu::DeviceDescriptor {
            label: Some("vkfilters noop"),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        });
        let info = GpuDeviceInfo {
            index: 0,
            adapter_name: "noop".to_string(),
            backend: wgpu::Backend::Noop,
            device_type: wgpu::DeviceType::Cpu,
            shader_f16: false,
        };
        Self::assemble(device, queue, info)
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn supports_shader_f16(&self) -> bool {
        self.info.shader_f16
    }

    /// Set once the device-lost callback fired
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    pub fn acquire_blob_allocator(&self) -> Allocator {
        self.blob_pool.acquire()
    }

    pub fn acquire_staging_allocator(&self) -> Allocator {
        self.staging_pool.acquire()
    }

    /// Allocator handles currently held by callers, across both pools
    pub fn outstanding_allocators(&self) -> usize {
        self.blob_pool.outstanding() + self.staging_pool.outstanding()
    }

    /// Open validation and out-of-memory error scopes
    pub(crate) fn push_error_scopes(&self) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    }

    /// Close the scopes opened by [`Self::push_error_scopes`]
    pub(crate) fn pop_error_scopes(&self) -> Option<String> {
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        oom.or(validation).map(|e| e.to_string())
    }

    /// Take the error recorded by the uncaptured error handler, if any
    pub(crate) fn take_uncaptured_error(&self) -> Option<String> {
        self.uncaptured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Largest buffer the device accepts, and the largest storage binding
    pub(crate) fn buffer_limits(&self) -> (u64, u64) {
        let limits = self.device.limits();
        (
            limits.max_buffer_size,
            u64::from(limits.max_storage_buffer_binding_size),
        )
    }

    /// Block until all submitted work has finished
    pub(crate) fn wait_idle(&self) -> FilterResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| FilterError::Device(e.to_string()))
    }
}

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<GpuDevice>>>> = OnceLock::new();

/// Shared device for the selected adapter
///
/// Devices are created lazily and reused by every caller asking for the same
/// adapter. A device that was lost is replaced on the next request.
pub fn get_gpu_device(selector: DeviceSelector) -> FilterResult<Arc<GpuDevice>> {
    let index = match selector {
        DeviceSelector::Index(i) => i,
        DeviceSelector::Default => resolve_index(selector, &enumerate_devices())?,
    };

    let registry = DEVICES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut devices = registry.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(device) = devices.get(&index) {
        if !device.is_lost() {
            return Ok(Arc::clone(device));
        }
        warn!(index, "Replacing lost compute device");
    }

    let device = Arc::new(GpuDevice::open(DeviceSelector::Index(index))?);
    devices.insert(index, Arc::clone(&device));
    Ok(device)
}
