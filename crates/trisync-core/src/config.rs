// SPDX-License-Identifier: CEPL-1.0
//! `trisync.toml` configuration.
//!
//! Every section is optional; a missing file yields [`AppConfig::default`].
//! The parsed value is immutable after startup and is threaded by reference
//! into device selection and swapchain negotiation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::Deserialize;

use crate::error::ConfigError;

bitflags! {
    /// Which capability dumps the device selector emits while it scores
    /// candidates.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LogProfile: u32 {
        const PROPS           = 1 << 0;
        const LIMITS          = 1 << 1;
        const SPARSE_PROPS    = 1 << 2;
        const FEATURES        = 1 << 3;
        const GRAPHICS_QUEUE  = 1 << 4;
        const COMPUTE_QUEUE   = 1 << 5;
        const TRANSFER_QUEUE  = 1 << 6;
        const SURFACE_CAPS    = 1 << 7;
        const SURFACE_FORMATS = 1 << 8;
        const PRESENT_MODES   = 1 << 9;
        const EXTENSIONS      = 1 << 10;

        const QUEUES = Self::GRAPHICS_QUEUE.bits()
            | Self::COMPUTE_QUEUE.bits()
            | Self::TRANSFER_QUEUE.bits();
        const SURFACE = Self::SURFACE_CAPS.bits()
            | Self::SURFACE_FORMATS.bits()
            | Self::PRESENT_MODES.bits();
    }
}

impl Default for LogProfile {
    fn default() -> Self {
        LogProfile::PROPS | LogProfile::QUEUES
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum LogFlag {
    All,
    Props,
    Limits,
    SparseProps,
    Features,
    Queues,
    GraphicsQueue,
    ComputeQueue,
    TransferQueue,
    Surface,
    SurfaceCaps,
    SurfaceFormats,
    PresentModes,
    Extensions,
}

impl LogFlag {
    fn bits(self) -> LogProfile {
        match self {
            LogFlag::All => LogProfile::all(),
            LogFlag::Props => LogProfile::PROPS,
            LogFlag::Limits => LogProfile::LIMITS,
            LogFlag::SparseProps => LogProfile::SPARSE_PROPS,
            LogFlag::Features => LogProfile::FEATURES,
            LogFlag::Queues => LogProfile::QUEUES,
            LogFlag::GraphicsQueue => LogProfile::GRAPHICS_QUEUE,
            LogFlag::ComputeQueue => LogProfile::COMPUTE_QUEUE,
            LogFlag::TransferQueue => LogProfile::TRANSFER_QUEUE,
            LogFlag::Surface => LogProfile::SURFACE,
            LogFlag::SurfaceCaps => LogProfile::SURFACE_CAPS,
            LogFlag::SurfaceFormats => LogProfile::SURFACE_FORMATS,
            LogFlag::PresentModes => LogProfile::PRESENT_MODES,
            LogFlag::Extensions => LogProfile::EXTENSIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePolicy {
    /// MAILBOX on platforms where it lowers latency (Windows), FIFO elsewhere.
    #[default]
    Auto,
    Fifo,
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageCountPolicy {
    #[default]
    #[serde(rename = "fixed3")]
    Fixed3,
    MinPlusOne,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStageRequirement {
    #[default]
    Geometry,
    Tessellation,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Enabled in debug builds only.
    #[default]
    Auto,
    On,
    Off,
}

impl ValidationMode {
    pub fn enabled(self) -> bool {
        match self {
            ValidationMode::Auto => cfg!(debug_assertions),
            ValidationMode::On => true,
            ValidationMode::Off => false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 800,
            height: 600,
            title: "Vulkan".to_owned(),
            resizable: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePolicy,
    pub image_count: ImageCountPolicy,
    pub shader_stage: ShaderStageRequirement,
    pub require_compute_queue: bool,
    /// 0 waits forever.
    pub fence_timeout_ms: u64,
    pub validation: ValidationMode,
    /// Directory holding `triangle.vert.spv` / `triangle.frag.spv`.
    /// When unset the SPIR-V compiled at build time is used.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentModePolicy::Auto,
            image_count: ImageCountPolicy::Fixed3,
            shader_stage: ShaderStageRequirement::Geometry,
            require_compute_queue: true,
            fence_timeout_ms: 0,
            validation: ValidationMode::Auto,
            shader_dir: None,
        }
    }
}

impl RenderCfg {
    /// Fence timeout in nanoseconds as `vkWaitForFences` expects it.
    pub fn fence_timeout_ns(&self) -> u64 {
        match self.fence_timeout_ms {
            0 => u64::MAX,
            ms => ms.saturating_mul(1_000_000),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
struct LoggingCfg {
    profile: Option<Vec<LogFlag>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowCfg,
    pub render: RenderCfg,
    logging: LoggingCfg,
}

impl AppConfig {
    /// Reads `path`; a missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(s) => Self::parse(&s).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn log_profile(&self) -> LogProfile {
        match &self.logging.profile {
            None => LogProfile::default(),
            Some(flags) => flags
                .iter()
                .fold(LogProfile::empty(), |acc, f| acc | f.bits()),
        }
    }

    pub fn set_log_profile_all(&mut self) {
        self.logging.profile = Some(vec![LogFlag::All]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.image_count, ImageCountPolicy::Fixed3);
        assert_eq!(cfg.render.present_mode, PresentModePolicy::Auto);
        assert!(cfg.render.require_compute_queue);
        assert_eq!(cfg.log_profile(), LogProfile::default());
    }

    #[test]
    fn parses_render_section() {
        let cfg = AppConfig::parse(
            r#"
            [render]
            present_mode = "mailbox"
            image_count = "min_plus_one"
            shader_stage = "tessellation"
            require_compute_queue = false
            fence_timeout_ms = 250
            shader_dir = "shaders"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.render.present_mode, PresentModePolicy::Mailbox);
        assert_eq!(cfg.render.image_count, ImageCountPolicy::MinPlusOne);
        assert_eq!(cfg.render.shader_stage, ShaderStageRequirement::Tessellation);
        assert!(!cfg.render.require_compute_queue);
        assert_eq!(cfg.render.fence_timeout_ns(), 250_000_000);
        assert_eq!(cfg.render.shader_dir, Some(PathBuf::from("shaders")));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        assert_eq!(RenderCfg::default().fence_timeout_ns(), u64::MAX);
    }

    #[test]
    fn log_profile_folds_flags() {
        let cfg = AppConfig::parse(
            r#"
            [logging]
            profile = ["limits", "surface"]
            "#,
        )
        .unwrap();
        let p = cfg.log_profile();
        assert!(p.contains(LogProfile::LIMITS));
        assert!(p.contains(LogProfile::SURFACE_CAPS | LogProfile::PRESENT_MODES));
        assert!(!p.contains(LogProfile::PROPS));

        let none = AppConfig::parse("[logging]\nprofile = []\n").unwrap();
        assert!(none.log_profile().is_empty());
    }

    #[test]
    fn log_all_sets_every_flag() {
        let mut cfg = AppConfig::default();
        cfg.set_log_profile_all();
        assert_eq!(cfg.log_profile(), LogProfile::all());
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        assert!(AppConfig::parse("[render]\npresent_mode = \"immediate\"\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Path::new("does/not/exist/trisync.toml")).unwrap();
        assert_eq!(cfg.window.title, "Vulkan");
    }
}
