// SPDX-License-Identifier: GPL-3.0-only

//! Compute building blocks: typed buffers, stage compilation, pipelines,
//! binding sets and the command recorder

pub mod binding;
pub mod command;
pub mod compiler;
pub mod mat;
pub mod pipeline;
pub mod transfer;

pub use binding::{
    Access, BindingSet, ConstantBlock, ResolvedBindings, Scalar, ScalarKind, ScalarValue, Slot,
    StageLayout,
};
pub use command::{ComputeCommand, DownloadSlot, Downloads, RecorderState};
pub use compiler::{CompileOptions, CompiledShader, ShaderDescriptor, SpecValue, compile_shader};
pub use mat::{ColorFormat, DeviceMat, ElemType, HostMat, MatDst, MatShape, MatSrc};
pub use pipeline::{LocalSize, Pipeline, compute_dispatch_size};
pub use transfer::Transfer;
