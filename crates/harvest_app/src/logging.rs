//! Logger initialization for harvest_app.
//!
//! File output goes to `./harvest.log` in the current working directory.

use std::fs::File;
use std::path::PathBuf;

use log::LevelFilter;
use serde::Deserialize;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

const LOG_FILE: &str = "./harvest.log";

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogDestination {
    /// Write to ./harvest.log in current directory.
    File,
    /// Write to terminal (stderr for warnings and errors).
    #[default]
    Terminal,
    /// Write to both file and terminal.
    Both,
}

/// Initialize the global logger. Safe to call more than once; later calls no-op.
pub fn initialize(destination: LogDestination, level: LevelFilter) {
    let loggers = select_loggers(destination, level, build_config(), create_file_logger);
    let _ = CombinedLogger::init(loggers);
}

/// `File` falls back to the terminal when the log file cannot be opened.
fn select_loggers(
    destination: LogDestination,
    level: LevelFilter,
    config: Config,
    open_file: impl FnOnce(LevelFilter, Config) -> Option<Box<dyn SharedLogger>>,
) -> Vec<Box<dyn SharedLogger>> {
    match destination {
        LogDestination::Terminal => vec![terminal_logger(level, config)],
        LogDestination::File => match open_file(level, config.clone()) {
            Some(file_logger) => vec![file_logger],
            None => vec![terminal_logger(level, config)],
        },
        LogDestination::Both => {
            let mut loggers = vec![terminal_logger(level, config.clone())];
            loggers.extend(open_file(level, config));
            loggers
        }
    }
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("rustls")
        .build()
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<dyn SharedLogger> {
    TermLogger::new(level, config, TerminalMode::Mixed, ColorChoice::Auto)
}

fn create_file_logger(level: LevelFilter, config: Config) -> Option<Box<dyn SharedLogger>> {
    let log_path = PathBuf::from(LOG_FILE);
    match File::create(&log_path) {
        Ok(file) => {
            let logger: Box<dyn SharedLogger> = WriteLogger::new(level, config, file);
            Some(logger)
        }
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}
