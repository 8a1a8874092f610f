// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use vkfilters::constants::{MAX_KERNEL_RADIUS, defaults};
use vkfilters::filters::bilateral::bilateral_params;
use vkfilters::filters::kernel::default_sigma;

#[test]
fn test_harris_defaults() {
    assert_eq!(defaults::HARRIS_K, 0.04);
    assert_eq!(defaults::HARRIS_SENSITIVITY, 5.0);
    assert_eq!(defaults::HARRIS_THRESHOLD, 0.2);
    assert!(defaults::HARRIS_BLUR_RADIUS > 0);
}

#[test]
fn test_bilateral_default_window_is_odd() {
    let (ksize, _, _) = bilateral_params(
        defaults::BILATERAL_KSIZE,
        defaults::BILATERAL_SIGMA_SPATIAL,
        defaults::BILATERAL_SIGMA_COLOR,
    );
    assert_eq!(ksize % 2, 1);
}

#[test]
fn test_derived_sigma_is_positive() {
    for radius in 0..=MAX_KERNEL_RADIUS {
        assert!(default_sigma(2 * radius + 1) > 0.0);
    }
}

#[test]
fn test_star_colour_is_normalized() {
    for c in defaults::STAR_COLOUR {
        assert!((0.0..=1.0).contains(&c));
    }
}
