// SPDX-License-Identifier: GPL-3.0-only

//! Per-dispatch binding sets
//!
//! A stage declares its buffer slots and scalar parameters once in a
//! [`StageLayout`]. Callers fill a [`BindingSet`] by role name; resolution
//! orders the buffers by slot and lays out the constant block:
//!
//! ```text
//! for each shaped slot:  width, height, channels, color tag, elem tag
//! then each scalar in declared order (i32 or f32 bits)
//! ```
//!
//! Buffers take bindings `0..slots.len()` and the constant block follows
//! at binding `slots.len()`.

use crate::compute::mat::{DeviceMat, MatShape};
use crate::errors::{FilterError, FilterResult};
use crate::gpu::DeviceBuffer;

/// Words a shaped slot contributes to the constant block
pub const MAT_INFO_WORDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One buffer role in a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    pub access: Access,
    /// Whether the shape is written into the constant block
    pub shaped: bool,
}

impl Slot {
    pub const fn read(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Read,
            shaped: true,
        }
    }

    pub const fn write(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Write,
            shaped: true,
        }
    }

    /// Read-only data without shape constants (kernels, lookup tables)
    pub const fn data(name: &'static str) -> Self {
        Self {
            name,
            access: Access::Read,
            shaped: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Float,
}

/// One scalar parameter in a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar {
    pub name: &'static str,
    pub kind: ScalarKind,
}

impl Scalar {
    pub const fn int(name: &'static str) -> Self {
        Self {
            name,
            kind: ScalarKind::Int,
        }
    }

    pub const fn float(name: &'static str) -> Self {
        Self {
            name,
            kind: ScalarKind::Float,
        }
    }
}

/// Buffer and parameter layout shared by a shader and its callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLayout {
    pub slots: &'static [Slot],
    pub scalars: &'static [Scalar],
}

impl StageLayout {
    /// Binding index of the constant block
    pub fn constants_binding(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn shaped_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.shaped).count()
    }

    /// Word offset of a shaped slot's info inside the constant block
    pub fn mat_offset(&self, role: &str) -> Option<usize> {
        self.slots
            .iter()
            .filter(|s| s.shaped)
            .position(|s| s.name == role)
            .map(|i| i * MAT_INFO_WORDS)
    }

    /// Word offset of a scalar inside the constant block
    pub fn scalar_offset(&self, name: &str) -> Option<usize> {
        self.scalars
            .iter()
            .position(|s| s.name == name)
            .map(|i| self.shaped_slots() * MAT_INFO_WORDS + i)
    }

    /// Total words in the constant block
    pub fn constant_words(&self) -> usize {
        self.shaped_slots() * MAT_INFO_WORDS + self.scalars.len()
    }

    pub(crate) fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| storage(i as u32, slot.access == Access::Read))
            .chain(std::iter::once(storage(self.constants_binding(), true)))
            .collect()
    }
}

/// Integer or float scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Int(i32),
    Float(f32),
}

impl ScalarValue {
    fn kind(self) -> ScalarKind {
        match self {
            ScalarValue::Int(_) => ScalarKind::Int,
            ScalarValue::Float(_) => ScalarKind::Float,
        }
    }

    fn word(self) -> u32 {
        match self {
            ScalarValue::Int(v) => v as u32,
            ScalarValue::Float(v) => v.to_bits(),
        }
    }
}

/// Packed constant words for one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConstantBlock {
    words: Vec<u32>,
}

impl ConstantBlock {
    fn push_shape(&mut self, shape: &MatShape) {
        self.words.extend_from_slice(&[
            shape.width,
            shape.height,
            shape.channels,
            shape.color.tag(),
            shape.elem.tag(),
        ]);
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }
}

/// Buffers in slot order plus their constant block
#[derive(Debug)]
pub struct ResolvedBindings<'a> {
    pub buffers: Vec<&'a DeviceBuffer>,
    pub shapes: Vec<MatShape>,
    pub constants: ConstantBlock,
}

/// Bindings for one dispatch, filled by role name
#[derive(Debug)]
pub struct BindingSet<'a> {
    stage: &'a str,
    layout: &'a StageLayout,
    mats: Vec<(&'a str, &'a DeviceMat)>,
    scalars: Vec<(&'a str, ScalarValue)>,
}

impl<'a> BindingSet<'a> {
    pub fn new(stage: &'a str, layout: &'a StageLayout) -> Self {
        Self {
            stage,
            layout,
            mats: Vec::with_capacity(layout.slots.len()),
            scalars: Vec::with_capacity(layout.scalars.len()),
        }
    }

    pub fn mat(mut self, role: &'a str, mat: &'a DeviceMat) -> Self {
        self.mats.push((role, mat));
        self
    }

    pub fn int(mut self, name: &'a str, value: i32) -> Self {
        self.scalars.push((name, ScalarValue::Int(value)));
        self
    }

    pub fn float(mut self, name: &'a str, value: f32) -> Self {
        self.scalars.push((name, ScalarValue::Float(value)));
        self
    }

    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn layout(&self) -> &StageLayout {
        self.layout
    }

    /// Check every role and scalar against the layout and pack constants
    pub fn resolve(&self) -> FilterResult<ResolvedBindings<'a>> {
        let err = |message: String| FilterError::binding(self.stage, message);

        for (i, (role, _)) in self.mats.iter().enumerate() {
            if !self.layout.slots.iter().any(|s| s.name == *role) {
                return Err(err(format!("unknown slot `{}`", role)));
            }
            if self.mats[..i].iter().any(|(r, _)| r == role) {
                return Err(err(format!("slot `{}` bound twice", role)));
            }
        }
        for (i, (name, _)) in self.scalars.iter().enumerate() {
            if !self.layout.scalars.iter().any(|s| s.name == *name) {
                return Err(err(format!("unknown scalar `{}`", name)));
            }
            if self.scalars[..i].iter().any(|(n, _)| n == name) {
                return Err(err(format!("scalar `{}` set twice", name)));
            }
        }

        let mut buffers = Vec::with_capacity(self.layout.slots.len());
        let mut shapes = Vec::with_capacity(self.layout.slots.len());
        let mut constants = ConstantBlock {
            words: Vec::with_capacity(self.layout.constant_words()),
        };

        for slot in self.layout.slots {
            let mat = self
                .mats
                .iter()
                .find(|(role, _)| *role == slot.name)
                .map(|(_, mat)| *mat)
                .ok_or_else(|| err(format!("missing slot `{}`", slot.name)))?;
            let buffer = mat
                .buffer()
                .ok_or_else(|| err(format!("slot `{}` is not allocated", slot.name)))?;
            buffers.push(buffer);
            shapes.push(mat.shape());
            if slot.shaped {
                constants.push_shape(&mat.shape());
            }
        }

        for scalar in self.layout.scalars {
            let value = self
                .scalars
                .iter()
                .find(|(name, _)| *name == scalar.name)
                .map(|(_, value)| *value)
                .ok_or_else(|| err(format!("missing scalar `{}`", scalar.name)))?;
            if value.kind() != scalar.kind {
                return Err(err(format!(
                    "scalar `{}` expects {:?}, got {:?}",
                    scalar.name,
                    scalar.kind,
                    value.kind()
                )));
            }
            constants.words.push(value.word());
        }

        Ok(ResolvedBindings {
            buffers,
            shapes,
            constants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::mat::ElemType;

    const SLOTS: &[Slot] = &[Slot::write("dst"), Slot::read("src"), Slot::data("kernel")];
    const SCALARS: &[Scalar] = &[Scalar::int("ksize"), Scalar::float("strength")];
    const LAYOUT: StageLayout = StageLayout {
        slots: SLOTS,
        scalars: SCALARS,
    };

    #[test]
    fn test_offsets_follow_shaped_slots() {
        assert_eq!(LAYOUT.shaped_slots(), 2);
        assert_eq!(LAYOUT.mat_offset("dst"), Some(0));
        assert_eq!(LAYOUT.mat_offset("src"), Some(5));
        assert_eq!(LAYOUT.mat_offset("kernel"), None);
        assert_eq!(LAYOUT.scalar_offset("ksize"), Some(10));
        assert_eq!(LAYOUT.scalar_offset("strength"), Some(11));
        assert_eq!(LAYOUT.constant_words(), 12);
        assert_eq!(LAYOUT.constants_binding(), 3);
    }

    #[test]
    fn test_layout_entries_access() {
        let entries = LAYOUT.layout_entries();
        assert_eq!(entries.len(), 4);
        let read_only: Vec<bool> = entries
            .iter()
            .map(|e| match e.ty {
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    ..
                } => read_only,
                _ => panic!("unexpected binding type"),
            })
            .collect();
        assert_eq!(read_only, vec![false, true, true, true]);
    }

    #[test]
    fn test_missing_slot_is_error() {
        let src = DeviceMat::empty(ElemType::Int8);
        let set = BindingSet::new("test", &LAYOUT)
            .mat("src", &src)
            .int("ksize", 3)
            .float("strength", 1.0);
        let err = set.resolve().unwrap_err();
        assert!(err.to_string().contains("missing slot `dst`"), "{}", err);
    }

    #[test]
    fn test_unknown_and_duplicate_roles() {
        let m = DeviceMat::empty(ElemType::Int8);
        let err = BindingSet::new("test", &LAYOUT)
            .mat("source", &m)
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("unknown slot `source`"));

        let err = BindingSet::new("test", &LAYOUT)
            .mat("src", &m)
            .mat("src", &m)
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("bound twice"));
    }

    #[test]
    fn test_scalar_kind_mismatch() {
        let err = BindingSet::new("test", &LAYOUT)
            .float("ksize", 3.0)
            .resolve()
            .unwrap_err();
        // Kind is only checked once all slots resolve, unknown roles first
        assert!(matches!(err, FilterError::Binding { .. }));

        let err = BindingSet::new("test", &LAYOUT)
            .int("width", 3)
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("unknown scalar `width`"));
    }

    #[test]
    fn test_scalar_words() {
        assert_eq!(ScalarValue::Int(-1).word(), u32::MAX);
        assert_eq!(ScalarValue::Float(1.0).word(), 0x3f80_0000);
    }

    #[test]
    fn test_constant_block_shape_order() {
        let mut block = ConstantBlock::default();
        block.push_shape(&MatShape::new(
            64,
            32,
            4,
            ElemType::Float16,
            crate::compute::mat::ColorFormat::Rgba,
        ));
        assert_eq!(block.words(), &[64, 32, 4, 6, 2]);
        assert_eq!(block.as_bytes().len(), 20);
    }
}
