//! Logger setup. Logs go to stderr; stdout belongs to the menu.

use std::str::FromStr;

use env_logger::{Builder, Target};
use log::LevelFilter;

/// Pick the log level: `--debug` wins, then the configured level, then `info`.
#[must_use]
pub fn resolve_level(debug: bool, configured: Option<&str>) -> (LevelFilter, Option<String>) {
    if debug {
        return (LevelFilter::Debug, None);
    }
    let Some(name) = configured else {
        return (LevelFilter::Info, None);
    };
    match LevelFilter::from_str(name) {
        Ok(level) => (level, None),
        Err(_) => {
            let warning = format!("Unrecognized log level '{name}', defaulting to info");
            (LevelFilter::Info, Some(warning))
        }
    }
}

/// Install the global logger. A second call only reports that a logger is already set.
pub fn init(debug: bool, configured: Option<&str>) {
    let (level, warning) = resolve_level(debug, configured);

    let mut builder = Builder::new();
    builder.filter_level(level).target(Target::Stderr);
    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {err}");
    }
    if let Some(warning) = warning {
        log::warn!("{warning}");
    }
}
