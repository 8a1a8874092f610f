// SPDX-License-Identifier: GPL-3.0-only

//! Animated star glow
//!
//! Draws a pulsing star with `RAY_COUNT` rotating rays centered on the
//! image and blends it over the source by the colour's alpha.

use crate::compute::{BindingSet, MatDst, MatSrc, Pipeline, SpecValue};
use crate::constants::defaults;
use crate::errors::FilterResult;
use crate::filters::{FilterContext, log_ready};
use crate::gpu::DeviceSelector;
use crate::shaders;

#[derive(Debug)]
pub struct Star {
    ctx: FilterContext,
    pipeline: Pipeline,
    intensity: f32,
}

impl Star {
    pub fn new(selector: DeviceSelector) -> FilterResult<Self> {
        Self::from_context(FilterContext::new(selector)?, defaults::STAR_RAY_COUNT)
    }

    /// Build with a specific number of rays baked into the pipeline
    pub fn from_context(ctx: FilterContext, ray_count: f32) -> FilterResult<Self> {
        let pipeline = ctx.pipeline_with(&shaders::STAR, &[("RAY_COUNT", SpecValue::F32(ray_count))])?;
        log_ready("star", &ctx);
        Ok(Self {
            ctx,
            pipeline,
            intensity: defaults::STAR_INTENSITY,
        })
    }

    pub fn context(&self) -> &FilterContext {
        &self.ctx
    }

    /// Glow intensity for following calls
    pub fn set_param(&mut self, intensity: f32) {
        self.intensity = intensity;
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Render the effect at `play_time` seconds
    pub fn effect<'s, 'd>(
        &mut self,
        src: impl Into<MatSrc<'s>>,
        dst: impl Into<MatDst<'d>>,
        play_time: f32,
        colour: [f32; 4],
    ) -> FilterResult<f64> {
        let src = src.into();
        let dst = dst.into();
        let out_shape = src.shape().with_elem(dst.elem());
        let intensity = self.intensity;
        let pipeline = &self.pipeline;

        self.ctx.run("star", src, dst, out_shape, |stages, src, out| {
            let [r, g, b, a] = colour;
            stages.dispatch(
                pipeline,
                BindingSet::new(pipeline.name(), pipeline.layout())
                    .mat("dst", out)
                    .mat("src", src)
                    .float("time", play_time)
                    .float("intensity", intensity)
                    .float("r", r)
                    .float("g", g)
                    .float("b", b)
                    .float("a", a),
                &out_shape,
            )
        })
    }
}
