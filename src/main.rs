//! pi-cam-recipes binary: the capture recipe menu on stdin/stdout.

use std::io;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use pi_cam_recipes::cli::Cli;
use pi_cam_recipes::config::RecipeConfig;
use pi_cam_recipes::{logging, operation_registry, Dispatcher, Recipes, V4L2Provider};

fn main() {
    if let Err(err) = run() {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let loaded = cli.config.as_deref().map(RecipeConfig::load).transpose();
    let mut config = match loaded {
        Ok(config) => {
            let level = config.as_ref().and_then(|c| c.log_level.as_deref());
            logging::init(cli.debug, level);
            config.unwrap_or_default()
        }
        Err(err) => {
            logging::init(cli.debug, None);
            return Err(err);
        }
    };
    if let Some(path) = &cli.config {
        info!("Using configuration from {}", path.display());
    }

    cli.apply_overrides(&mut config);
    config.validate().context("Invalid settings")?;
    config.prepare_output_dir()?;
    info!(
        "Camera /dev/video{}, writing to {}",
        config.device,
        config.output_dir.display()
    );

    let recipes = Rc::new(Recipes::new(V4L2Provider::new(config.device), config));
    let registry = operation_registry(recipes).context("Failed to build the recipe menu")?;

    Dispatcher::new(&registry, io::stdin(), io::stdout()).run()?;
    info!("Bye");
    Ok(())
}
