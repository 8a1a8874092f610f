// SPDX-License-Identifier: GPL-3.0-only

//! vkfilters - multi-stage GPU compute image filters
//!
//! The crate is organized into several modules:
//!
//! - [`gpu`]: Adapter selection, shared devices and buffer allocators
//! - [`compute`]: Matrices, shader compilation, pipelines, binding and recording
//! - [`shaders`]: WGSL sources for every compute stage
//! - [`filters`]: Harris, bilateral, star and Gaussian blur
//! - [`config`]: Persistent defaults
//!
//! # Example
//!
//! ```ignore
//! use vkfilters::{ElemType, Harris, HostMat, DeviceSelector};
//!
//! let mut harris = Harris::new(DeviceSelector::Default)?;
//! let mut dst = HostMat::empty(ElemType::Int8);
//! harris.filter_with_defaults(&src, &mut dst)?;
//! ```

pub mod compute;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod shaders;

// Re-export commonly used types
pub use compute::{ColorFormat, DeviceMat, ElemType, HostMat, MatShape};
pub use config::Config;
pub use errors::{FilterError, FilterResult};
pub use filters::{Bilateral, FilterContext, GaussianBlur, Harris, HarrisParams, Star};
pub use gpu::{DeviceSelector, GpuDevice, get_gpu_device};
