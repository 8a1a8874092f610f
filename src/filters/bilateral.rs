// SPDX-License-Identifier: GPL-3.0-only

//! Bilateral filter: single-stage edge preserving smoothing

use crate::compute::{BindingSet, MatDst, MatSrc, Pipeline};
use crate::constants::MAX_KERNEL_RADIUS;
use crate::errors::FilterResult;
use crate::filters::{FilterContext, log_ready};
use crate::gpu::DeviceSelector;
use crate::shaders;

/// Sanitized `(ksize, sigma_spatial, sigma_color)`
///
/// Non-positive sigmas become 1. A non-positive size is derived from the
/// spatial sigma, even sizes grow to the next odd one and the window is
/// capped at the largest supported radius.
pub fn bilateral_params(ksize: i32, sigma_spatial: f32, sigma_color: f32) -> (i32, f32, f32) {
    let sigma_spatial = if sigma_spatial > 0.0 { sigma_spatial } else { 1.0 };
    let sigma_color = if sigma_color > 0.0 { sigma_color } else { 1.0 };

    let ksize = if ksize > 0 {
        ksize
    } else {
        let radius = ((sigma_spatial * 1.5).round() as i32).max(1);
        radius * 2 + 1
    };
    let ksize = (ksize | 1).min(2 * MAX_KERNEL_RADIUS as i32 + 1);

    (ksize, sigma_spatial, sigma_color)
}

#[derive(Debug)]
pub struct Bilateral {
    ctx: FilterContext,
    pipeline: Pipeline,
}

impl Bilateral {
    pub fn new(selector: DeviceSelector) -> FilterResult<Self> {
        Self::from_context(FilterContext::new(selector)?)
    }

    pub fn from_context(ctx: FilterContext) -> FilterResult<Self> {
        let pipeline = ctx.pipeline(&shaders::BILATERAL)?;
        log_ready("bilateral", &ctx);
        Ok(Self { ctx, pipeline })
    }

    pub fn context(&self) -> &FilterContext {
        &self.ctx
    }

    /// Smooth `src` into `dst`, keeping shape and channels of the source
    pub fn filter<'s, 'd>(
        &mut self,
        src: impl Into<MatSrc<'s>>,
        dst: impl Into<MatDst<'d>>,
        ksize: i32,
        sigma_spatial: f32,
        sigma_color: f32,
    ) -> FilterResult<f64> {
        let src = src.into();
        let dst = dst.into();
        let (ksize, sigma_spatial, sigma_color) = bilateral_params(ksize, sigma_spatial, sigma_color);
        let out_shape = src.shape().with_elem(dst.elem());
        let pipeline = &self.pipeline;

        self.ctx.run("bilateral", src, dst, out_shape, |stages, src, out| {
            stages.dispatch(
                pipeline,
                BindingSet::new(pipeline.name(), pipeline.layout())
                    .mat("dst", out)
                    .mat("src", src)
                    .int("ksize", ksize)
                    .float("sigma_spatial", sigma_spatial)
                    .float("sigma_color", sigma_color),
                &out_shape,
            )
        })
    }
}
