// SPDX-License-Identifier: GPL-3.0-only

//! WGSL stage compilation
//!
//! Stage sources are templates. `{{LOCAL_SIZE_X}}`, `{{LOCAL_SIZE_Y}}`,
//! `{{LOCAL_SIZE_Z}}` and one `{{NAME}}` token per specialization constant
//! are substituted when a [`Pipeline`](super::Pipeline) is created.
//! [`compile_shader`] assembles header, prelude and stage source and
//! validates the result with naga so a broken stage fails before any
//! device object exists.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compute::binding::StageLayout;
use crate::compute::mat::ElemType;
use crate::compute::pipeline::LocalSize;
use crate::errors::{FilterError, FilterResult};
use crate::gpu::GpuDevice;
use crate::shaders;

/// Precision and storage choices applied to every stage of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Keep 4-channel intermediates as half floats
    pub use_fp16_storage: bool,
    /// Accumulate in `f16` (needs `SHADER_F16`)
    pub use_fp16_arithmetic: bool,
    /// Bind images as storage textures instead of buffers
    pub use_image_storage: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            use_fp16_storage: true,
            use_fp16_arithmetic: false,
            use_image_storage: false,
        }
    }
}

impl CompileOptions {
    /// Drop options the device cannot honour
    pub fn sanitize(self, device: &GpuDevice) -> Self {
        let mut opts = self;
        if opts.use_fp16_arithmetic && !device.supports_shader_f16() {
            warn!(
                adapter = %device.info().adapter_name,
                "fp16 arithmetic requested without SHADER_F16 support, using f32"
            );
            opts.use_fp16_arithmetic = false;
        }
        if opts.use_image_storage {
            warn!("image storage is not supported, binding buffers");
            opts.use_image_storage = false;
        }
        opts
    }

    /// Element type for stage intermediates
    pub fn intermediate_elem(&self) -> ElemType {
        if self.use_fp16_storage {
            ElemType::Float16
        } else {
            ElemType::Float32
        }
    }

    fn header(&self) -> String {
        if self.use_fp16_arithmetic {
            "enable f16;\nalias afp = f16;\n".to_string()
        } else {
            "alias afp = f32;\n".to_string()
        }
    }
}

/// Value baked into a stage at pipeline creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecValue {
    I32(i32),
    U32(u32),
    F32(f32),
    Bool(bool),
}

impl SpecValue {
    /// WGSL literal for this value
    pub fn literal(&self) -> FilterResult<String> {
        match *self {
            SpecValue::I32(v) => Ok(format!("({}i)", v)),
            SpecValue::U32(v) => Ok(format!("{}u", v)),
            SpecValue::F32(v) if v.is_finite() => Ok(format!("({:?}f)", v)),
            SpecValue::F32(v) => Err(FilterError::Compile {
                name: "specialization".to_string(),
                message: format!("non-finite float {}", v),
            }),
            SpecValue::Bool(v) => Ok(v.to_string()),
        }
    }
}

/// Static description of one stage
#[derive(Debug, Clone, Copy)]
pub struct ShaderDescriptor {
    pub name: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
    pub layout: StageLayout,
    /// Every specialization the source expects, with its default
    pub specializations: &'static [(&'static str, SpecValue)],
}

/// A validated stage template ready for pipeline creation
#[derive(Debug, Clone)]
pub struct CompiledShader {
    name: &'static str,
    template: String,
    entry_point: &'static str,
    layout: StageLayout,
    specializations: &'static [(&'static str, SpecValue)],
    options: CompileOptions,
}

impl CompiledShader {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entry_point(&self) -> &'static str {
        self.entry_point
    }

    pub fn layout(&self) -> &StageLayout {
        &self.layout
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Final WGSL with local size and specializations substituted
    ///
    /// `overrides` replace defaults by name; names the stage does not
    /// declare are rejected.
    pub fn render(&self, local: LocalSize, overrides: &[(&str, SpecValue)]) -> FilterResult<String> {
        for (name, _) in overrides {
            if !self.specializations.iter().any(|(n, _)| n == name) {
                return Err(FilterError::Pipeline {
                    name: self.name.to_string(),
                    message: format!("unknown specialization `{}`", name),
                });
            }
        }

        let mut values: Vec<(&str, SpecValue)> = Vec::with_capacity(self.specializations.len());
        for (name, default) in self.specializations {
            let value = overrides
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map_or(*default, |(_, v)| *v);
            values.push((name, value));
        }

        substitute(self.name, &self.template, local, &values)
    }
}

fn substitute(
    name: &str,
    template: &str,
    local: LocalSize,
    values: &[(&str, SpecValue)],
) -> FilterResult<String> {
    let mut source = template
        .replace("{{LOCAL_SIZE_X}}", &format!("{}u", local.x))
        .replace("{{LOCAL_SIZE_Y}}", &format!("{}u", local.y))
        .replace("{{LOCAL_SIZE_Z}}", &format!("{}u", local.z));

    for (key, value) in values {
        let literal = value.literal().map_err(|e| match e {
            FilterError::Compile { message, .. } => FilterError::Compile {
                name: name.to_string(),
                message: format!("`{}`: {}", key, message),
            },
            other => other,
        })?;
        source = source.replace(&format!("{{{{{}}}}}", key), &literal);
    }

    if let Some(start) = source.find("{{") {
        let token: String = source[start..].chars().take_while(|c| *c != '\n').collect();
        return Err(FilterError::Compile {
            name: name.to_string(),
            message: format!("unresolved placeholder {}", token.trim()),
        });
    }

    Ok(source)
}

/// Parse and validate WGSL, returning the naga module
pub(crate) fn validate_wgsl(name: &str, source: &str) -> FilterResult<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| FilterError::Compile {
        name: name.to_string(),
        message: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| FilterError::Compile {
        name: name.to_string(),
        message: format!("{:?}", e),
    })?;

    Ok(module)
}

/// Assemble and validate one stage
pub fn compile_shader(
    descriptor: &ShaderDescriptor,
    options: &CompileOptions,
) -> FilterResult<CompiledShader> {
    let template = format!(
        "{}\n{}\n{}",
        options.header(),
        shaders::COMMON,
        descriptor.source
    );

    let sample = substitute(
        descriptor.name,
        &template,
        LocalSize::default(),
        descriptor.specializations,
    )?;
    let module = validate_wgsl(descriptor.name, &sample)?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.name == descriptor.entry_point && ep.stage == naga::ShaderStage::Compute)
    {
        return Err(FilterError::Compile {
            name: descriptor.name.to_string(),
            message: format!("no compute entry point `{}`", descriptor.entry_point),
        });
    }

    debug!(
        shader = descriptor.name,
        fp16_arithmetic = options.use_fp16_arithmetic,
        "Shader validated"
    );

    Ok(CompiledShader {
        name: descriptor.name,
        template,
        entry_point: descriptor.entry_point,
        layout: descriptor.layout,
        specializations: descriptor.specializations,
        options: *options,
    })
}
