// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing compute adapters
//! - Running a filter over an image file

use std::path::Path;

use vkfilters::compute::{ElemType, HostMat};
use vkfilters::config::{BilateralSettings, GaussianSettings, StarSettings};
use vkfilters::filters::{Bilateral, FilterContext, GaussianBlur, Harris, HarrisParams, Star};
use vkfilters::Config;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// List all available compute adapters
pub fn list_devices() -> CliResult {
    let devices = vkfilters::gpu::enumerate_devices();

    if devices.is_empty() {
        println!("No compute adapters found.");
        return Ok(());
    }

    println!("Available compute adapters:");
    println!();
    for device in &devices {
        println!(
            "  [{}] {} ({:?}, {:?})",
            device.index, device.name, device.backend, device.device_type
        );
    }

    Ok(())
}

fn context(config: &Config) -> Result<FilterContext, Box<dyn std::error::Error>> {
    Ok(FilterContext::with_options(
        config.device_selector(),
        config.compile,
    )?)
}

fn load(input: &Path) -> Result<HostMat, Box<dyn std::error::Error>> {
    let image = image::open(input)?.to_rgba8();
    Ok(HostMat::from_rgba8(&image)?)
}

fn save(output: &Path, result: &HostMat, elapsed: f64) -> CliResult {
    result.to_rgba8()?.save(output)?;
    println!(
        "{}x{} written to {} in {:.2} ms",
        result.width(),
        result.height(),
        output.display(),
        elapsed
    );
    Ok(())
}

pub fn run_harris(config: &Config, input: &Path, output: &Path, params: &HarrisParams) -> CliResult {
    let src = load(input)?;
    let mut harris = Harris::from_context(context(config)?)?;
    let mut dst = HostMat::empty(ElemType::Int8);
    let elapsed = harris.filter(&src, &mut dst, params)?;
    save(output, &dst, elapsed)
}

pub fn run_bilateral(
    config: &Config,
    input: &Path,
    output: &Path,
    settings: &BilateralSettings,
) -> CliResult {
    let src = load(input)?;
    let mut bilateral = Bilateral::from_context(context(config)?)?;
    let mut dst = HostMat::empty(ElemType::Int8);
    let elapsed = bilateral.filter(
        &src,
        &mut dst,
        settings.ksize,
        settings.sigma_spatial,
        settings.sigma_color,
    )?;
    save(output, &dst, elapsed)
}

pub fn run_gaussian(
    config: &Config,
    input: &Path,
    output: &Path,
    settings: &GaussianSettings,
) -> CliResult {
    let src = load(input)?;
    let mut blur = GaussianBlur::from_context(context(config)?)?;
    let mut dst = HostMat::empty(ElemType::Int8);
    let elapsed = blur.filter(&src, &mut dst, settings.radius, settings.sigma)?;
    save(output, &dst, elapsed)
}

pub fn run_star(
    config: &Config,
    input: &Path,
    output: &Path,
    time: f32,
    settings: &StarSettings,
) -> CliResult {
    let src = load(input)?;
    let mut star = Star::from_context(context(config)?, settings.ray_count)?;
    star.set_param(settings.intensity);
    let mut dst = HostMat::empty(ElemType::Int8);
    let elapsed = star.effect(&src, &mut dst, time, settings.colour)?;
    save(output, &dst, elapsed)
}
