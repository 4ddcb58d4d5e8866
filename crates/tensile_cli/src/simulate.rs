//! Offline spring simulation
//!
//! Drives a private frameloop from a manual clock, one fixed frame at a
//! time, and records every frame.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tensile_animation::{
    ConfigFile, FrameLoop, FrameLoopConfig, ManualClock, PartialConfig, SpringConfig, SpringValue,
};

/// Spring configuration flags shared by commands
#[derive(Args, Debug, Default)]
pub struct SpringArgs {
    /// Named preset (default, gentle, wobbly, stiff, slow, molasses)
    #[arg(long)]
    pub preset: Option<String>,

    /// TOML config file with `[default]` and `[keys.<name>]` tables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Key to read from the config file
    #[arg(long, default_value = "value")]
    pub key: String,

    #[arg(long)]
    pub mass: Option<f32>,

    #[arg(long)]
    pub tension: Option<f32>,

    #[arg(long)]
    pub friction: Option<f32>,

    /// Fraction of critical damping, used when --friction is absent
    #[arg(long)]
    pub damping_ratio: Option<f32>,

    #[arg(long)]
    pub precision: Option<f32>,

    /// Stop at the goal instead of overshooting
    #[arg(long)]
    pub clamp: bool,

    /// Jump to the goal without animating
    #[arg(long)]
    pub immediate: bool,
}

impl SpringArgs {
    /// Flags layered over the config file entry for `--key`
    pub fn partial(&self) -> Result<PartialConfig> {
        let base = match &self.config {
            Some(path) => ConfigFile::load(path)?.partial_for(&self.key),
            None => PartialConfig::default(),
        };
        let flags = PartialConfig {
            preset: self.preset.clone(),
            mass: self.mass,
            tension: self.tension,
            friction: self.friction,
            damping_ratio: self.damping_ratio,
            precision: self.precision,
            clamp: self.clamp.then_some(true),
            immediate: self.immediate.then_some(true),
        };
        Ok(base.merge(&flags))
    }

    pub fn resolve(&self) -> Result<SpringConfig> {
        Ok(self.partial()?.resolve()?)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    pub index: u32,
    /// Seconds since the start
    pub time: f32,
    pub value: f32,
    pub velocity: f32,
}

#[derive(Debug)]
pub struct Report {
    pub frames: Vec<Frame>,
    /// Frame on which the spring came to rest
    pub settled_at: Option<u32>,
    /// Furthest value reached in the direction of travel
    pub peak: f32,
}

pub struct Simulation {
    config: SpringConfig,
    from: f32,
    to: f32,
    fps: u32,
}

impl Simulation {
    pub fn new(config: SpringConfig, from: f32, to: f32, fps: u32) -> Self {
        Self {
            config,
            from,
            to,
            fps: fps.max(1),
        }
    }

    pub fn run(&self, max_frames: u32) -> Result<Report> {
        let clock = ManualClock::new();
        let frameloop = FrameLoop::with_clock(clock.clone()).with_config(FrameLoopConfig {
            stall_tick_limit: max_frames,
            ..Default::default()
        });
        let spring = SpringValue::new(frameloop.handle(), self.from, self.config);
        let completion = spring.start(self.to)?;

        let frame_time = Duration::from_secs_f64(1.0 / self.fps as f64);
        let upward = self.to >= self.from;
        let mut frames = Vec::new();
        let mut peak = self.from;

        for index in 1..=max_frames {
            if !frameloop.is_running() {
                break;
            }
            clock.advance(frame_time);
            frameloop.tick();

            let value = spring.get().as_number().unwrap_or_default();
            let velocity = spring.velocity().as_number().unwrap_or_default();
            peak = if upward { peak.max(value) } else { peak.min(value) };
            frames.push(Frame {
                index,
                time: index as f32 / self.fps as f32,
                value,
                velocity,
            });
        }

        if frameloop.is_running() {
            // Resolve the completion as cancelled instead of waiting forever
            spring.stop();
            frameloop.advance(Duration::ZERO);
        }
        let result = pollster::block_on(completion);

        Ok(Report {
            settled_at: result.finished.then_some(frames.len() as u32),
            frames,
            peak,
        })
    }
}
