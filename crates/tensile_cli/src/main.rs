//! Tensile CLI
//!
//! Simulate spring configs offline, list presets, and validate config files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tensile_animation::{ConfigFile, Preset};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod simulate;

use simulate::{Simulation, SpringArgs};

#[derive(Parser)]
#[command(name = "tensile")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Spring animation tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a spring from one value to another and print every frame
    Simulate {
        /// Starting value
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        from: f32,

        /// Goal value
        #[arg(long, default_value = "100", allow_hyphen_values = true)]
        to: f32,

        #[command(flatten)]
        spring: SpringArgs,

        /// Frames per second used to step the frameloop
        #[arg(long, default_value = "60")]
        fps: u32,

        /// Give up after this many frames
        #[arg(long, default_value = "10000")]
        max_frames: u32,

        /// Print frames as CSV
        #[arg(long)]
        csv: bool,
    },

    /// List the built-in presets
    Presets,

    /// Resolve every key of a spring config file
    Check {
        /// TOML config file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Simulate {
            from,
            to,
            spring,
            fps,
            max_frames,
            csv,
        } => cmd_simulate(from, to, &spring, fps, max_frames, csv),

        Commands::Presets => cmd_presets(),

        Commands::Check { file } => cmd_check(&file),
    }
}

fn cmd_simulate(from: f32, to: f32, spring: &SpringArgs, fps: u32, max_frames: u32, csv: bool) -> Result<()> {
    if fps == 0 {
        anyhow::bail!("--fps must be at least 1");
    }
    let config = spring.resolve()?;
    info!(
        "Simulating {} -> {} (tension {}, friction {}, mass {}, {:.2}x critical damping)",
        from,
        to,
        config.tension,
        config.friction,
        config.mass,
        config.damping_ratio()
    );

    let report = Simulation::new(config, from, to, fps).run(max_frames)?;

    if csv {
        println!("frame,time,value,velocity");
    }
    for frame in &report.frames {
        if csv {
            println!(
                "{},{:.4},{},{}",
                frame.index, frame.time, frame.value, frame.velocity
            );
        } else {
            println!(
                "{:>5}  t={:>7.3}s  value={:>12.4}  velocity={:>12.4}",
                frame.index, frame.time, frame.value, frame.velocity
            );
        }
    }

    match report.settled_at {
        Some(frame) => info!(
            "Settled at frame {} ({:.3}s), peak {:.4}",
            frame,
            frame as f32 / fps as f32,
            report.peak
        ),
        None => anyhow::bail!("Spring did not settle within {} frames", max_frames),
    }
    Ok(())
}

fn cmd_presets() -> Result<()> {
    println!(
        "{:<10} {:>8} {:>8} {:>6} {:>7}  {:<18} {:>8}",
        "preset", "tension", "friction", "mass", "ratio", "damping", "frames"
    );
    for preset in Preset::ALL {
        let config = preset.config();
        let damping = if config.is_critically_damped() {
            "critically damped"
        } else if config.is_overdamped() {
            "overdamped"
        } else {
            "underdamped"
        };
        let settle = Simulation::new(config, 0.0, 100.0, 60)
            .run(10_000)?
            .settled_at
            .map(|frame| frame.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:>8} {:>8} {:>6} {:>7.3}  {:<18} {:>8}",
            preset.name(),
            config.tension,
            config.friction,
            config.mass,
            config.damping_ratio(),
            damping,
            settle
        );
    }
    Ok(())
}

fn cmd_check(file: &Path) -> Result<()> {
    let config = ConfigFile::load(file)?;
    info!("Checking {}", file.display());

    let mut failures = 0;
    for (key, resolved) in config.resolve_all() {
        match resolved {
            Ok(spring) => println!(
                "  ok     {:<16} tension={} friction={} mass={} clamp={} immediate={}",
                key, spring.tension, spring.friction, spring.mass, spring.clamp, spring.immediate
            ),
            Err(err) => {
                failures += 1;
                println!("  error  {:<16} {}", key, err);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} key(s) in {} failed to resolve", failures, file.display());
    }
    info!("All keys resolved");
    Ok(())
}
