// SPDX-License-Identifier: GPL-3.0-only

//! Separable Gaussian blur, the column/row stage pair on its own

use crate::compute::{BindingSet, MatDst, MatSrc, Pipeline};
use crate::errors::FilterResult;
use crate::filters::kernel::KernelCache;
use crate::filters::{FilterContext, log_ready};
use crate::gpu::DeviceSelector;
use crate::shaders;

#[derive(Debug)]
pub struct GaussianBlur {
    ctx: FilterContext,
    column: Pipeline,
    row: Pipeline,
    kernel: KernelCache,
}

impl GaussianBlur {
    pub fn new(selector: DeviceSelector) -> FilterResult<Self> {
        Self::from_context(FilterContext::new(selector)?)
    }

    pub fn from_context(ctx: FilterContext) -> FilterResult<Self> {
        let blur = Self {
            column: ctx.pipeline(&shaders::FILTER_COLUMN)?,
            row: ctx.pipeline(&shaders::FILTER_ROW)?,
            kernel: KernelCache::new(),
            ctx,
        };
        log_ready("gaussian", &blur.ctx);
        Ok(blur)
    }

    pub fn context(&self) -> &FilterContext {
        &self.ctx
    }

    pub fn kernel_uploads(&self) -> usize {
        self.kernel.uploads()
    }

    pub fn kernel_size(&self) -> Option<u32> {
        self.kernel.ksize()
    }

    /// Blur with a `2 * radius + 1` kernel; `sigma <= 0` derives the spread
    pub fn filter<'s, 'd>(
        &mut self,
        src: impl Into<MatSrc<'s>>,
        dst: impl Into<MatDst<'d>>,
        radius: u32,
        sigma: f32,
    ) -> FilterResult<f64> {
        let src = src.into();
        let dst = dst.into();
        self.ctx.ensure_ready()?;

        let kernel = self.kernel.prepare(&self.ctx, radius, sigma)?;
        let ksize = kernel.width() as i32;
        let anchor = ksize / 2;

        let in_shape = src.shape();
        let inter_shape = in_shape.with_elem(self.ctx.options().intermediate_elem());
        let out_shape = in_shape.with_elem(dst.elem());
        let (column, row) = (&self.column, &self.row);

        self.ctx.run("gaussian", src, dst, out_shape, |stages, src, out| {
            let vertical = stages.alloc(inter_shape)?;
            stages.dispatch(
                column,
                BindingSet::new(column.name(), column.layout())
                    .mat("dst", &vertical)
                    .mat("src", src)
                    .mat("kernel", kernel)
                    .int("xksize", ksize)
                    .int("yksize", ksize)
                    .int("xanchor", anchor)
                    .int("yanchor", anchor),
                &inter_shape,
            )?;
            stages.dispatch(
                row,
                BindingSet::new(row.name(), row.layout())
                    .mat("dst", out)
                    .mat("src", &vertical)
                    .mat("kernel", kernel)
                    .int("xksize", ksize)
                    .int("yksize", ksize)
                    .int("xanchor", anchor)
                    .int("yanchor", anchor),
                &out_shape,
            )
        })
    }
}
