// SPDX-License-Identifier: GPL-3.0-only

//! Bilateral, Gaussian blur and star effect on real hardware
//!
//! Every test returns early when no compute adapter is present.

use std::sync::Arc;

use vkfilters::compute::CompileOptions;
use vkfilters::{
    Bilateral, ColorFormat, DeviceMat, DeviceSelector, ElemType, FilterContext, GaussianBlur,
    GpuDevice, HostMat, MatShape, Star,
};

fn context() -> Option<FilterContext> {
    match GpuDevice::open(DeviceSelector::Default) {
        Ok(device) => Some(FilterContext::from_device(
            Arc::new(device),
            CompileOptions::default(),
        )),
        Err(e) => {
            println!("Skipping test (no GPU): {}", e);
            None
        }
    }
}

/// Diagonal gradient with opaque alpha
fn gradient(width: u32, height: u32) -> HostMat {
    let mut mat = HostMat::new(width, height, 4, ElemType::Int8, ColorFormat::Rgba).unwrap();
    for y in 0..height {
        for x in 0..width {
            let v = (x + y) as f32 / (width + height) as f32;
            mat.set(x, y, 0, v);
            mat.set(x, y, 1, 1.0 - v);
            mat.set(x, y, 2, 0.25);
            mat.set(x, y, 3, 1.0);
        }
    }
    mat
}

#[test]
fn test_bilateral_keeps_constant_image() {
    let Some(ctx) = context() else { return };
    let mut bilateral = Bilateral::from_context(ctx).unwrap();

    let mut src = HostMat::new(33, 17, 4, ElemType::Int8, ColorFormat::Rgba).unwrap();
    src.fill(0.5);
    let mut dst = HostMat::empty(ElemType::Int8);
    bilateral.filter(&src, &mut dst, 5, 10.0, 10.0).unwrap();

    assert_eq!(dst.shape(), src.shape());
    for (a, b) in src.values().iter().zip(dst.values()) {
        assert!((a - b).abs() <= 1.0 / 255.0 + 1e-6);
    }
}

#[test]
fn test_bilateral_keeps_channels_and_derives_window() {
    let Some(ctx) = context() else { return };
    let mut bilateral = Bilateral::from_context(ctx).unwrap();

    let shape = MatShape::new(20, 12, 1, ElemType::Float32, ColorFormat::Gray);
    let values: Vec<f32> = (0..shape.element_count()).map(|i| (i % 7) as f32 / 7.0).collect();
    let src = HostMat::from_values(shape, &values).unwrap();

    let mut dst = DeviceMat::empty(ElemType::Float32);
    bilateral.filter(&src, &mut dst, 0, 2.0, 0.0).unwrap();
    assert_eq!(dst.shape(), shape);

    let out = bilateral.context().download(&dst).unwrap();
    assert!(out.values().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_gaussian_radius_change_reuploads_kernel() {
    let Some(ctx) = context() else { return };
    let mut blur = GaussianBlur::from_context(ctx).unwrap();
    let src = gradient(48, 32);

    let mut narrow = HostMat::empty(ElemType::Float32);
    blur.filter(&src, &mut narrow, 1, 0.0).unwrap();
    assert_eq!(blur.kernel_uploads(), 1);
    assert_eq!(blur.kernel_size(), Some(3));

    let mut again = HostMat::empty(ElemType::Float32);
    blur.filter(&src, &mut again, 1, 0.0).unwrap();
    assert_eq!(blur.kernel_uploads(), 1);
    assert_eq!(narrow, again);

    let mut wide = HostMat::empty(ElemType::Float32);
    blur.filter(&src, &mut wide, 6, 4.0).unwrap();
    assert_eq!(blur.kernel_uploads(), 2);
    assert_eq!(blur.kernel_size(), Some(13));
    assert_ne!(narrow, wide);
}

#[test]
fn test_gaussian_keeps_constant_image() {
    let Some(ctx) = context() else { return };
    let mut blur = GaussianBlur::from_context(ctx).unwrap();

    let mut src = HostMat::new(16, 16, 3, ElemType::Int8, ColorFormat::Rgb).unwrap();
    src.fill(0.25);
    let mut dst = HostMat::empty(ElemType::Int8);
    blur.filter(&src, &mut dst, 3, 0.0).unwrap();

    assert_eq!(dst.shape(), src.shape());
    for (a, b) in src.values().iter().zip(dst.values()) {
        assert!((a - b).abs() <= 1.0 / 255.0 + 1e-6);
    }
}

#[test]
fn test_star_shape_and_zero_intensity() {
    let Some(ctx) = context() else { return };
    let mut star = Star::from_context(ctx, 6.0).unwrap();
    star.set_param(0.0);
    assert_eq!(star.intensity(), 0.0);

    let src = gradient(40, 24);
    let mut dst = HostMat::empty(ElemType::Int8);
    star.effect(&src, &mut dst, 1.5, [1.0, 1.0, 1.0, 1.0]).unwrap();

    assert_eq!(dst.shape(), src.shape());
    assert_eq!(dst, src);
}

#[test]
fn test_star_changes_over_time() {
    let Some(ctx) = context() else { return };
    let mut star = Star::from_context(ctx, 4.0).unwrap();

    let src = HostMat::new(64, 64, 4, ElemType::Int8, ColorFormat::Rgba).unwrap();
    let mut early = HostMat::empty(ElemType::Int8);
    let mut late = HostMat::empty(ElemType::Int8);
    star.effect(&src, &mut early, 0.0, [1.0, 1.0, 1.0, 1.0]).unwrap();
    star.effect(&src, &mut late, 0.5, [1.0, 1.0, 1.0, 1.0]).unwrap();

    assert_ne!(early, late);
    assert!(early.values().iter().any(|v| *v > 0.0));
}
