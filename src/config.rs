//! Recipe configuration: YAML file with defaults matching the stock recipes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use log::{debug, info};
use serde::Deserialize;

use crate::traits::FourCC;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeConfig {
    /// V4L2 device index (`/dev/video<N>`).
    pub device: u32,
    /// Directory every output file is written to.
    pub output_dir: PathBuf,
    /// Base name for single stills.
    pub image_name: String,
    /// Extension for stills, including the dot.
    pub image_extension: String,
    /// Base name for single recordings.
    pub video_name: String,
    /// Extension for recordings, including the dot.
    pub video_extension: String,
    /// Pixel format requested for stills.
    pub still_format: String,
    /// Pixel format requested for recordings.
    pub video_format: String,
    /// Driver buffers per stream.
    pub buffer_count: u32,
    /// Frames dropped after a stream starts before a still is taken.
    pub skip_frames: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Preview time before stills.
    pub warm_up_secs: f64,
    /// Log level when `--debug` is not given.
    pub log_level: Option<String>,
    /// Timelapse settings.
    pub timelapse: TimelapseConfig,
    /// Long exposure settings.
    pub low_light: LowLightConfig,
    /// Recording settings.
    pub video: VideoConfig,
    /// Overlay preview settings.
    pub overlay: OverlayConfig,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            device: 0,
            output_dir: PathBuf::from("."),
            image_name: "image".to_owned(),
            image_extension: ".jpg".to_owned(),
            video_name: "video".to_owned(),
            video_extension: ".h264".to_owned(),
            still_format: "YUYV".to_owned(),
            video_format: "H264".to_owned(),
            buffer_count: 4,
            skip_frames: 2,
            jpeg_quality: 90,
            warm_up_secs: 2.0,
            log_level: None,
            timelapse: TimelapseConfig::default(),
            low_light: LowLightConfig::default(),
            video: VideoConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

/// Timelapse settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimelapseConfig {
    /// Gap between continuous captures.
    pub interval_secs: f64,
    /// Stop after this many captures; unbounded when absent.
    pub max_frames: Option<u32>,
}

impl Default for TimelapseConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30.0,
            max_frames: None,
        }
    }
}

/// Long exposure settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LowLightConfig {
    /// Shutter time in microseconds.
    pub exposure_us: u64,
    /// ISO sensitivity.
    pub iso: u32,
    /// Time given to auto white balance before the capture.
    pub settle_secs: f64,
}

impl Default for LowLightConfig {
    fn default() -> Self {
        Self {
            exposure_us: 6_000_000,
            iso: 800,
            settle_secs: 10.0,
        }
    }
}

/// Recording settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Length of the recording to file.
    pub file_secs: f64,
    /// Length of the recording to memory.
    pub stream_secs: f64,
    /// H.264 quantisation parameter for the recording to memory.
    pub quality: u8,
    /// Number of files in the multi-file recording.
    pub segments: u32,
    /// Length of each file in the multi-file recording.
    pub segment_secs: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            file_secs: 60.0,
            stream_secs: 15.0,
            quality: 23,
            segments: 10,
            segment_secs: 5.0,
        }
    }
}

/// Overlay preview settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Image laid over the preview. Relative paths resolve against the working directory.
    pub path: PathBuf,
    /// Overlay opacity.
    pub alpha: u8,
    /// Overlay layer; the preview is on layer 2.
    pub layer: u32,
    /// File the composited preview is written to, inside `output_dir`.
    pub preview_path: PathBuf,
    /// Minimum time between preview file rewrites.
    pub refresh_secs: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("overlay.png"),
            alpha: 128,
            layer: 3,
            preview_path: PathBuf::from("preview.jpg"),
            refresh_secs: 1.0,
        }
    }
}

impl RecipeConfig {
    /// Read, parse and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse YAML configuration '{}'", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in '{}'", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check values. The filesystem is left alone; see [`Self::prepare_output_dir`].
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.image_name.is_empty(), "image_name cannot be empty");
        ensure!(!self.video_name.is_empty(), "video_name cannot be empty");
        for (field, extension) in [
            ("image_extension", &self.image_extension),
            ("video_extension", &self.video_extension),
        ] {
            ensure!(
                extension.starts_with('.') && extension.len() > 1,
                "{field} must start with '.' (got '{extension}')"
            );
        }
        self.still_fourcc()?;
        self.video_fourcc()?;
        ensure!(self.buffer_count >= 1, "buffer_count must be at least 1");
        ensure!(
            (1..=100).contains(&self.jpeg_quality),
            "jpeg_quality must be between 1 and 100"
        );
        ensure!(
            self.video.segments >= 1,
            "video.segments must be at least 1"
        );
        ensure!(
            self.video.quality <= 51,
            "video.quality must be between 0 and 51"
        );

        for (field, secs) in [
            ("warm_up_secs", self.warm_up_secs),
            ("timelapse.interval_secs", self.timelapse.interval_secs),
            ("low_light.settle_secs", self.low_light.settle_secs),
            ("video.file_secs", self.video.file_secs),
            ("video.stream_secs", self.video.stream_secs),
            ("video.segment_secs", self.video.segment_secs),
            ("overlay.refresh_secs", self.overlay.refresh_secs),
        ] {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("{field} must be a non-negative number of seconds"))?;
        }
        Ok(())
    }

    /// Create the output directory if it is missing.
    ///
    /// Run once every override has been applied.
    pub fn prepare_output_dir(&self) -> Result<()> {
        if self.output_dir.exists() {
            if !self.output_dir.is_dir() {
                bail!(
                    "output_dir '{}' exists but is not a directory",
                    self.output_dir.display()
                );
            }
        } else {
            fs::create_dir_all(&self.output_dir).with_context(|| {
                format!("Cannot create output_dir '{}'", self.output_dir.display())
            })?;
            info!("Created output directory {}", self.output_dir.display());
        }
        Ok(())
    }

    /// Pixel format for stills.
    pub fn still_fourcc(&self) -> Result<FourCC> {
        parse_fourcc("still_format", &self.still_format)
    }

    /// Pixel format for recordings.
    pub fn video_fourcc(&self) -> Result<FourCC> {
        parse_fourcc("video_format", &self.video_format)
    }

    /// Path of a file inside the output directory.
    #[must_use]
    pub fn output_path<P: AsRef<Path>>(&self, file_name: P) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// `<output_dir>/<image_name><image_extension>`.
    #[must_use]
    pub fn image_path(&self) -> PathBuf {
        self.output_path(format!("{}{}", self.image_name, self.image_extension))
    }

    /// `<output_dir>/<video_name><video_extension>`.
    #[must_use]
    pub fn video_path(&self) -> PathBuf {
        self.output_path(format!("{}{}", self.video_name, self.video_extension))
    }
}

fn parse_fourcc(field: &str, value: &str) -> Result<FourCC> {
    value
        .parse()
        .map_err(|err: String| anyhow::anyhow!("{field}: {err}"))
}

/// Seconds from a validated configuration value.
#[must_use]
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
