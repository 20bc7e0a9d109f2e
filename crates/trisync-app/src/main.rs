// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use trisync_core::{init_tracing, AppConfig, ValidationMode};
use trisync_platform::Platform;
use trisync_render::{FrameBackend, FrameScheduler, RenderSize};
use trisync_render_vk::VkRenderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; missing means defaults
    #[arg(long, default_value = "trisync.toml")]
    config: PathBuf,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Dump every device capability category
    #[arg(long)]
    log_all: bool,

    /// Exit after this many presented frames (0 = until the window closes)
    #[arg(long, default_value_t = 0)]
    frames: u64,

    #[arg(long, value_enum)]
    validation: Option<ValidationArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValidationArg {
    Auto,
    On,
    Off,
}

impl From<ValidationArg> for ValidationMode {
    fn from(v: ValidationArg) -> Self {
        match v {
            ValidationArg::Auto => ValidationMode::Auto,
            ValidationArg::On => ValidationMode::On,
            ValidationArg::Off => ValidationMode::Off,
        }
    }
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
        if let Some(v) = self.validation {
            cfg.render.validation = v.into();
        }
        if self.log_all {
            cfg.set_log_profile_all();
        }
    }

    fn frame_limit(&self) -> Option<u64> {
        (self.frames > 0).then_some(self.frames)
    }
}

fn run(args: &Args) -> Result<()> {
    let mut cfg = AppConfig::load(&args.config)?;
    args.apply(&mut cfg);

    let mut platform = Platform::create_window(
        cfg.window.width,
        cfg.window.height,
        &cfg.window.title,
        cfg.window.resizable,
    )?;
    let window = platform.window().context("no window")?;
    let size = window.inner_size();
    let mut renderer = VkRenderer::new(
        window,
        window,
        RenderSize::new(size.width, size.height),
        &cfg,
    )?;

    let mut scheduler = FrameScheduler::new(renderer.slot_count());
    let resized = scheduler.resize_flag();
    platform.on_resize(move |_| resized.notify());

    let stats = scheduler.run(&mut renderer, &mut platform, args.frame_limit())?;
    info!(
        "exiting: {} frames presented on '{}', {} swapchain rebuilds",
        stats.frames_presented,
        renderer.device_name(),
        stats.recreations
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
