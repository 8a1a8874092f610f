// SPDX-License-Identifier: GPL-3.0-only
//! Filter stage sources and their binding layouts
//!
//! Every stage is a WGSL template concatenated with [`COMMON`] at compile
//! time. The layout next to each source is the only contract between the
//! host side and the shader: buffers take bindings in slot order, the
//! constant block follows, and the shader reads constants at the word
//! offsets [`StageLayout`] computes.

use crate::compute::binding::{Scalar, Slot, StageLayout};
use crate::compute::compiler::{ShaderDescriptor, SpecValue};
use crate::constants::defaults;

/// Shared prelude: element codecs, color reordering, constant access
pub const COMMON: &str = include_str!("common.wgsl");

const IMAGE_SLOTS: &[Slot] = &[Slot::write("dst"), Slot::read("src")];

const SEPARABLE_SLOTS: &[Slot] = &[Slot::write("dst"), Slot::read("src"), Slot::data("kernel")];

const SEPARABLE_SCALARS: &[Scalar] = &[
    Scalar::int("xksize"),
    Scalar::int("yksize"),
    Scalar::int("xanchor"),
    Scalar::int("yanchor"),
];

/// Luminance gradient products
pub const PREWITT: ShaderDescriptor = ShaderDescriptor {
    name: "prewitt",
    source: include_str!("filters/prewitt.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: IMAGE_SLOTS,
        scalars: &[Scalar::float("edge_strength")],
    },
    specializations: &[],
};

pub const FILTER_COLUMN: ShaderDescriptor = ShaderDescriptor {
    name: "filter_column",
    source: include_str!("filters/filter_column.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: SEPARABLE_SLOTS,
        scalars: SEPARABLE_SCALARS,
    },
    specializations: &[],
};

pub const FILTER_ROW: ShaderDescriptor = ShaderDescriptor {
    name: "filter_row",
    source: include_str!("filters/filter_row.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: SEPARABLE_SLOTS,
        scalars: SEPARABLE_SCALARS,
    },
    specializations: &[],
};

pub const HARRIS_RESPONSE: ShaderDescriptor = ShaderDescriptor {
    name: "harris_response",
    source: include_str!("filters/harris_response.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: IMAGE_SLOTS,
        scalars: &[Scalar::float("harris"), Scalar::float("sensitivity")],
    },
    specializations: &[],
};

pub const HARRIS_NMS: ShaderDescriptor = ShaderDescriptor {
    name: "harris_nms",
    source: include_str!("filters/harris_nms.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: &[Slot::write("dst"), Slot::read("response")],
        scalars: &[Scalar::float("threshold")],
    },
    specializations: &[],
};

pub const BILATERAL: ShaderDescriptor = ShaderDescriptor {
    name: "bilateral",
    source: include_str!("filters/bilateral.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: IMAGE_SLOTS,
        scalars: &[
            Scalar::int("ksize"),
            Scalar::float("sigma_spatial"),
            Scalar::float("sigma_color"),
        ],
    },
    specializations: &[],
};

pub const STAR: ShaderDescriptor = ShaderDescriptor {
    name: "star",
    source: include_str!("filters/star.wgsl"),
    entry_point: "main",
    layout: StageLayout {
        slots: IMAGE_SLOTS,
        scalars: &[
            Scalar::float("time"),
            Scalar::float("intensity"),
            Scalar::float("r"),
            Scalar::float("g"),
            Scalar::float("b"),
            Scalar::float("a"),
        ],
    },
    specializations: &[("RAY_COUNT", SpecValue::F32(defaults::STAR_RAY_COUNT))],
};

/// Every stage, for validation and tooling
pub const ALL: &[ShaderDescriptor] = &[
    PREWITT,
    FILTER_COLUMN,
    FILTER_ROW,
    HARRIS_RESPONSE,
    HARRIS_NMS,
    BILATERAL,
    STAR,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::binding::Access;
    use crate::compute::compiler::{CompileOptions, compile_shader, validate_wgsl};
    use crate::compute::pipeline::LocalSize;

    fn options(fp16_arithmetic: bool) -> CompileOptions {
        CompileOptions {
            use_fp16_arithmetic: fp16_arithmetic,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_stages_compile() {
        for fp16 in [false, true] {
            for desc in ALL {
                if let Err(e) = compile_shader(desc, &options(fp16)) {
                    panic!("{} (fp16 = {}): {}", desc.name, fp16, e);
                }
            }
        }
    }

    #[test]
    fn test_stage_bindings_match_layout() {
        for desc in ALL {
            let compiled = compile_shader(desc, &options(false)).unwrap();
            let source = compiled.render(LocalSize::default(), &[]).unwrap();
            let module = validate_wgsl(desc.name, &source).unwrap();

            let mut bindings: Vec<(u32, bool)> = module
                .global_variables
                .iter()
                .filter_map(|(_, var)| {
                    let binding = var.binding.as_ref()?;
                    assert_eq!(binding.group, 0, "{}", desc.name);
                    match var.space {
                        naga::AddressSpace::Storage { access } => {
                            Some((binding.binding, access.contains(naga::StorageAccess::STORE)))
                        }
                        _ => panic!("{}: binding {} is not storage", desc.name, binding.binding),
                    }
                })
                .collect();
            bindings.sort();

            let mut expected: Vec<(u32, bool)> = desc
                .layout
                .slots
                .iter()
                .enumerate()
                .map(|(i, slot)| (i as u32, slot.access == Access::Write))
                .collect();
            expected.push((desc.layout.constants_binding(), false));

            assert_eq!(bindings, expected, "{}", desc.name);
        }
    }

    #[test]
    fn test_star_ray_count_specialization() {
        let compiled = compile_shader(&STAR, &options(false)).unwrap();
        let source = compiled
            .render(LocalSize::default(), &[("RAY_COUNT", SpecValue::F32(6.0))])
            .unwrap();
        assert!(source.contains("const RAY_COUNT: f32 = (6.0f);"));
        validate_wgsl("star", &source).unwrap();
    }

    #[test]
    fn test_scalar_offsets_used_by_stages() {
        // Stages read their first scalar right after the shaped slots
        assert_eq!(PREWITT.layout.scalar_offset("edge_strength"), Some(10));
        assert_eq!(FILTER_ROW.layout.scalar_offset("xksize"), Some(10));
        assert_eq!(FILTER_COLUMN.layout.scalar_offset("yksize"), Some(11));
        assert_eq!(FILTER_ROW.layout.scalar_offset("xanchor"), Some(12));
        assert_eq!(FILTER_COLUMN.layout.scalar_offset("yanchor"), Some(13));
        assert_eq!(HARRIS_RESPONSE.layout.scalar_offset("sensitivity"), Some(11));
        assert_eq!(HARRIS_NMS.layout.scalar_offset("threshold"), Some(10));
        assert_eq!(BILATERAL.layout.scalar_offset("sigma_color"), Some(12));
        assert_eq!(STAR.layout.scalar_offset("a"), Some(15));
    }
}
