//! Scrape one page for links and download what they point at.
mod app;
mod config;
mod effects;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use harvest_logging::{harvest_error, harvest_warn};

fn main() -> ExitCode {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match config::load(config_path.as_deref(), |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("harvest: {err}");
            return ExitCode::from(2);
        }
    };
    logging::initialize(
        config.log_destination,
        harvest_logging::parse_level(&config.log_level),
    );

    match app::run(&config) {
        Ok(summary) if summary.failed > 0 && config.fail_on_error => {
            harvest_warn!("{} of {} downloads failed", summary.failed, summary.total);
            ExitCode::from(1)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            harvest_error!("{err:#}");
            ExitCode::from(2)
        }
    }
}
