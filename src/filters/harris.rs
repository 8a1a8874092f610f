// SPDX-License-Identifier: GPL-3.0-only

//! Harris corner / edge response
//!
//! Five stages:
//!
//! 1. Prewitt gradients of luminance, written as (Ix², Iy², IxIy, 1)
//! 2. Gaussian blur along columns
//! 3. Gaussian blur along rows
//! 4. Response `|det - k * trace²| * sensitivity`
//! 5. 3x3 non-maximum suppression against `threshold`
//!
//! The output is `src.w x src.h x 4` RGBA in the destination's element
//! type, 1.0 on detected points and 0 elsewhere.

use serde::{Deserialize, Serialize};

use crate::compute::{BindingSet, ColorFormat, ElemType, MatDst, MatShape, MatSrc, Pipeline};
use crate::constants::defaults;
use crate::errors::FilterResult;
use crate::filters::kernel::KernelCache;
use crate::filters::{FilterContext, log_ready};
use crate::gpu::DeviceSelector;
use crate::shaders;

/// Per-call parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarrisParams {
    /// Radius of the structure tensor blur
    pub blur_radius: u32,
    pub edge_strength: f32,
    pub threshold: f32,
    /// Trace weight `k`
    pub harris: f32,
    pub sensitivity: f32,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            blur_radius: defaults::HARRIS_BLUR_RADIUS,
            edge_strength: defaults::HARRIS_EDGE_STRENGTH,
            threshold: defaults::HARRIS_THRESHOLD,
            harris: defaults::HARRIS_K,
            sensitivity: defaults::HARRIS_SENSITIVITY,
        }
    }
}

#[derive(Debug)]
pub struct Harris {
    ctx: FilterContext,
    prewitt: Pipeline,
    blur_column: Pipeline,
    blur_row: Pipeline,
    response: Pipeline,
    nms: Pipeline,
    kernel: KernelCache,
    edge_strength: f32,
}

impl Harris {
    pub fn new(selector: DeviceSelector) -> FilterResult<Self> {
        Self::from_context(FilterContext::new(selector)?)
    }

    pub fn from_context(ctx: FilterContext) -> FilterResult<Self> {
        let harris = Self {
            prewitt: ctx.pipeline(&shaders::PREWITT)?,
            blur_column: ctx.pipeline(&shaders::FILTER_COLUMN)?,
            blur_row: ctx.pipeline(&shaders::FILTER_ROW)?,
            response: ctx.pipeline(&shaders::HARRIS_RESPONSE)?,
            nms: ctx.pipeline(&shaders::HARRIS_NMS)?,
            kernel: KernelCache::new(),
            edge_strength: defaults::HARRIS_EDGE_STRENGTH,
            ctx,
        };
        log_ready("harris", &harris.ctx);
        Ok(harris)
    }

    pub fn context(&self) -> &FilterContext {
        &self.ctx
    }

    /// Edge strength used by [`Harris::filter_with_defaults`]
    pub fn set_param(&mut self, edge_strength: f32) {
        self.edge_strength = edge_strength;
    }

    pub fn edge_strength(&self) -> f32 {
        self.edge_strength
    }

    /// Blur kernel uploads so far
    pub fn kernel_uploads(&self) -> usize {
        self.kernel.uploads()
    }

    /// Size of the cached blur kernel, if any call ran yet
    pub fn kernel_size(&self) -> Option<u32> {
        self.kernel.ksize()
    }

    /// Default parameters with the stored edge strength
    pub fn filter_with_defaults<'s, 'd>(
        &mut self,
        src: impl Into<MatSrc<'s>>,
        dst: impl Into<MatDst<'d>>,
    ) -> FilterResult<f64> {
        let params = HarrisParams {
            edge_strength: self.edge_strength,
            ..HarrisParams::default()
        };
        self.filter(src, dst, &params)
    }

    pub fn filter<'s, 'd>(
        &mut self,
        src: impl Into<MatSrc<'s>>,
        dst: impl Into<MatDst<'d>>,
        params: &HarrisParams,
    ) -> FilterResult<f64> {
        let src = src.into();
        let dst = dst.into();
        self.ctx.ensure_ready()?;

        let kernel = self.kernel.prepare(&self.ctx, params.blur_radius, 0.0)?;
        let ksize = kernel.width() as i32;
        let anchor = ksize / 2;

        let in_shape = src.shape();
        let inter = self.ctx.options().intermediate_elem();
        let tensor_shape = MatShape::new(in_shape.width, in_shape.height, 4, inter, ColorFormat::Rgba);
        let response_shape = MatShape::new(
            in_shape.width,
            in_shape.height,
            1,
            ElemType::Float32,
            ColorFormat::Gray,
        );
        let out_shape = MatShape::new(in_shape.width, in_shape.height, 4, dst.elem(), ColorFormat::Rgba);

        let (prewitt, blur_column, blur_row, response, nms) = (
            &self.prewitt,
            &self.blur_column,
            &self.blur_row,
            &self.response,
            &self.nms,
        );

        self.ctx.run("harris", src, dst, out_shape, |stages, src, out| {
            let gradients = stages.alloc(tensor_shape)?;
            stages.dispatch(
                prewitt,
                BindingSet::new(prewitt.name(), prewitt.layout())
                    .mat("dst", &gradients)
                    .mat("src", src)
                    .float("edge_strength", params.edge_strength),
                &tensor_shape,
            )?;

            let column = stages.alloc(tensor_shape)?;
            stages.dispatch(
                blur_column,
                BindingSet::new(blur_column.name(), blur_column.layout())
                    .mat("dst", &column)
                    .mat("src", &gradients)
                    .mat("kernel", kernel)
                    .int("xksize", ksize)
                    .int("yksize", ksize)
                    .int("xanchor", anchor)
                    .int("yanchor", anchor),
                &tensor_shape,
            )?;

            let tensor = stages.alloc(tensor_shape)?;
            stages.dispatch(
                blur_row,
                BindingSet::new(blur_row.name(), blur_row.layout())
                    .mat("dst", &tensor)
                    .mat("src", &column)
                    .mat("kernel", kernel)
                    .int("xksize", ksize)
                    .int("yksize", ksize)
                    .int("xanchor", anchor)
                    .int("yanchor", anchor),
                &tensor_shape,
            )?;

            let scores = stages.alloc(response_shape)?;
            stages.dispatch(
                response,
                BindingSet::new(response.name(), response.layout())
                    .mat("dst", &scores)
                    .mat("src", &tensor)
                    .float("harris", params.harris)
                    .float("sensitivity", params.sensitivity),
                &response_shape,
            )?;

            stages.dispatch(
                nms,
                BindingSet::new(nms.name(), nms.layout())
                    .mat("dst", out)
                    .mat("response", &scores)
                    .float("threshold", params.threshold),
                &out_shape,
            )
        })
    }
}
