// SPDX-License-Identifier: GPL-3.0-only

//! Discrete Gaussian kernels for the separable blur stages

use tracing::debug;

use crate::compute::mat::{ColorFormat, DeviceMat, ElemType, HostMat, MatShape};
use crate::errors::{FilterError, FilterResult};
use crate::filters::FilterContext;

/// Spread used when none is given, derived from the kernel size
pub fn default_sigma(ksize: u32) -> f32 {
    ((ksize as f32 - 1.0) * 0.5 - 1.0) * 0.3 + 0.8
}

/// Normalized Gaussian weights of size `2 * radius + 1`
///
/// A non-positive `sigma` is derived from the size.
pub fn gaussian_kernel(radius: u32, sigma: f32) -> Vec<f32> {
    let ksize = 2 * radius + 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        default_sigma(ksize)
    };
    let scale = -0.5 / (sigma * sigma);

    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (x * x * scale as f64).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Device copy of the last kernel, rebuilt only when its inputs change
#[derive(Debug, Default)]
pub struct KernelCache {
    key: Option<(u32, u32)>,
    kernel: Option<DeviceMat>,
    uploads: usize,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel for `radius` and `sigma`, uploading it when they differ from
    /// the cached one
    pub fn prepare(
        &mut self,
        ctx: &FilterContext,
        radius: u32,
        sigma: f32,
    ) -> FilterResult<&DeviceMat> {
        let bytes = (2 * u64::from(radius) + 1) * std::mem::size_of::<f32>() as u64;
        let (max_buffer, max_binding) = ctx.device().buffer_limits();
        if bytes > max_buffer.min(max_binding) {
            return Err(FilterError::Shape(format!(
                "blur radius {} needs a {} byte kernel, device allows at most {}",
                radius,
                bytes,
                max_buffer.min(max_binding)
            )));
        }

        // Non-positive spreads all mean "derive from size"
        let sigma_key = if sigma > 0.0 { sigma.to_bits() } else { 0 };
        let key = (radius, sigma_key);

        let kernel = match self.kernel.take() {
            Some(kernel) if self.key == Some(key) => kernel,
            _ => {
                let weights = gaussian_kernel(radius, sigma);
                let shape = MatShape::new(
                    weights.len() as u32,
                    1,
                    1,
                    ElemType::Float32,
                    ColorFormat::Gray,
                );
                let host = HostMat::from_values(shape, &weights)?;
                let kernel = ctx.upload(&host)?;
                self.key = Some(key);
                self.uploads += 1;
                debug!(radius, ksize = weights.len(), "Uploaded blur kernel");
                kernel
            }
        };

        Ok(self.kernel.insert(kernel))
    }

    /// Kernel size of the cached kernel
    pub fn ksize(&self) -> Option<u32> {
        self.key.map(|(radius, _)| 2 * radius + 1)
    }

    /// Times a kernel has been uploaded
    pub fn uploads(&self) -> usize {
        self.uploads
    }
}
