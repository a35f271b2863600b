//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::RecipeConfig;

/// Menu of camera capture recipes for V4L2 cameras.
#[derive(Debug, Parser)]
#[command(name = "pi-cam-recipes", version, about)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Camera index, as in /dev/videoN
    #[arg(long, value_name = "N")]
    pub device: Option<u32>,

    /// Directory captures are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Apply flags that take precedence over the configuration file.
    pub fn apply_overrides(&self, config: &mut RecipeConfig) {
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
    }
}
