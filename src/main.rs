// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "vkfilters")]
#[command(about = "GPU compute image filters")]
#[command(version = vkfilters::constants::app_info::version())]
struct Cli {
    /// Adapter index (from 'vkfilters devices'), overrides the config file
    #[arg(short, long, global = true)]
    device: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

/// Input and output image paths
#[derive(clap::Args)]
struct Io {
    /// Input image
    #[arg(short, long)]
    input: PathBuf,

    /// Output image
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List available compute adapters
    Devices,

    /// Harris corner / edge detection
    Harris {
        #[command(flatten)]
        io: Io,

        /// Structure tensor blur radius
        #[arg(long)]
        blur_radius: Option<u32>,

        #[arg(long)]
        edge_strength: Option<f32>,

        #[arg(long)]
        threshold: Option<f32>,

        /// Trace weight k
        #[arg(long)]
        harris: Option<f32>,

        #[arg(long)]
        sensitivity: Option<f32>,
    },

    /// Edge preserving bilateral smoothing
    Bilateral {
        #[command(flatten)]
        io: Io,

        /// Window size, 0 derives it from the spatial sigma
        #[arg(long)]
        ksize: Option<i32>,

        #[arg(long)]
        sigma_spatial: Option<f32>,

        #[arg(long)]
        sigma_color: Option<f32>,
    },

    /// Separable Gaussian blur
    Gaussian {
        #[command(flatten)]
        io: Io,

        #[arg(long)]
        radius: Option<u32>,

        /// 0 derives the spread from the radius
        #[arg(long)]
        sigma: Option<f32>,
    },

    /// Star glow effect
    Star {
        #[command(flatten)]
        io: Io,

        /// Animation time in seconds
        #[arg(short, long, default_value = "0")]
        time: f32,

        #[arg(long)]
        intensity: Option<f32>,

        /// Colour as r,g,b,a in 0..1
        #[arg(long, value_delimiter = ',', num_args = 4)]
        colour: Option<Vec<f32>>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=vkfilters=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = vkfilters::Config::load();
    if let Some(device) = cli.device {
        config.device = device;
    }

    match cli.command {
        Commands::Devices => cli::list_devices(),
        Commands::Harris {
            io,
            blur_radius,
            edge_strength,
            threshold,
            harris,
            sensitivity,
        } => {
            let mut params = config.harris;
            params.blur_radius = blur_radius.unwrap_or(params.blur_radius);
            params.edge_strength = edge_strength.unwrap_or(params.edge_strength);
            params.threshold = threshold.unwrap_or(params.threshold);
            params.harris = harris.unwrap_or(params.harris);
            params.sensitivity = sensitivity.unwrap_or(params.sensitivity);
            cli::run_harris(&config, &io.input, &io.output, &params)
        }
        Commands::Bilateral {
            io,
            ksize,
            sigma_spatial,
            sigma_color,
        } => {
            let mut settings = config.bilateral;
            settings.ksize = ksize.unwrap_or(settings.ksize);
            settings.sigma_spatial = sigma_spatial.unwrap_or(settings.sigma_spatial);
            settings.sigma_color = sigma_color.unwrap_or(settings.sigma_color);
            cli::run_bilateral(&config, &io.input, &io.output, &settings)
        }
        Commands::Gaussian { io, radius, sigma } => {
            let mut settings = config.gaussian;
            settings.radius = radius.unwrap_or(settings.radius);
            settings.sigma = sigma.unwrap_or(settings.sigma);
            cli::run_gaussian(&config, &io.input, &io.output, &settings)
        }
        Commands::Star {
            io,
            time,
            intensity,
            colour,
        } => {
            let mut settings = config.star;
            settings.intensity = intensity.unwrap_or(settings.intensity);
            if let Some(c) = colour {
                if let [r, g, b, a] = c[..] {
                    settings.colour = [r, g, b, a];
                }
            }
            cli::run_star(&config, &io.input, &io.output, time, &settings)
        }
    }
}
