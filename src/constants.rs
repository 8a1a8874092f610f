// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

/// Preferred local workgroup shape for 2-D image stages
pub mod workgroup {
    pub const X: u32 = 16;
    pub const Y: u32 = 16;
    pub const Z: u32 = 1;
}

/// Limits on typed buffers
pub mod mat {
    /// Channels per pixel handled by the shader prelude
    pub const MAX_CHANNELS: u32 = 4;
    /// Device buffers are viewed as 32-bit words by every shader
    pub const WORD_BYTES: u64 = 4;
}

/// Default filter parameters
pub mod defaults {
    pub const HARRIS_BLUR_RADIUS: u32 = 2;
    pub const HARRIS_EDGE_STRENGTH: f32 = 1.0;
    pub const HARRIS_THRESHOLD: f32 = 0.2;
    pub const HARRIS_K: f32 = 0.04;
    pub const HARRIS_SENSITIVITY: f32 = 5.0;

    pub const BILATERAL_KSIZE: i32 = 5;
    pub const BILATERAL_SIGMA_SPATIAL: f32 = 10.0;
    pub const BILATERAL_SIGMA_COLOR: f32 = 10.0;

    pub const GAUSSIAN_RADIUS: u32 = 3;
    /// Non-positive sigma derives the spread from the kernel size
    pub const GAUSSIAN_SIGMA: f32 = 0.0;

    pub const STAR_INTENSITY: f32 = 1.0;
    pub const STAR_RAY_COUNT: f32 = 4.0;
    pub const STAR_COLOUR: [f32; 4] = [1.0, 0.85, 0.4, 1.0];
}

/// Upper bound for bilateral window radii
///
/// Gaussian blur radii are not capped; only device buffer limits apply.
pub const MAX_KERNEL_RADIUS: u32 = 32;

/// Configuration file lookup
pub mod config {
    pub const APP_DIR: &str = "vkfilters";
    pub const FILE_NAME: &str = "config.json";
    /// Overrides the configured device index
    pub const DEVICE_ENV: &str = "VKFILTERS_DEVICE";
}

/// Application info
pub mod app_info {
    /// Version string embedded by build.rs
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
