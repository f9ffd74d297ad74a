//! Run configuration: defaults, then `harvest.ron`, then environment overrides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use harvest_engine::{parse_absolute_url, FilenamePattern};
use serde::Deserialize;
use thiserror::Error;

use crate::logging::LogDestination;

pub const DEFAULT_CONFIG_FILE: &str = "harvest.ron";

pub const ENV_TARGET_URL: &str = "TARGET_URL";
pub const ENV_OUTPUT_PATH: &str = "OUTPUT_PATH";
pub const ENV_SELECTOR: &str = "SELECTOR";
pub const ENV_CONCURRENCY: &str = "CONCURRENCY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Page to scrape for links.
    pub target_url: String,
    pub selector: String,
    pub output_dir: PathBuf,
    pub filename_pattern: FilenamePattern,
    pub concurrency: usize,
    pub timeout_ms: Option<u64>,
    pub max_download_bytes: Option<u64>,
    /// When set, records are also written as JSON into `output_dir`.
    pub records_file: Option<String>,
    pub log_destination: LogDestination,
    pub log_level: String,
    /// Exit non-zero when any download failed.
    pub fail_on_error: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            selector: "a.sample_image".to_string(),
            output_dir: PathBuf::from("./downloads"),
            filename_pattern: FilenamePattern::default(),
            concurrency: 4,
            timeout_ms: None,
            max_download_bytes: None,
            records_file: None,
            log_destination: LogDestination::default(),
            log_level: "info".to_string(),
            fail_on_error: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("no target url; set `target_url` in the config file or TARGET_URL")]
    MissingTargetUrl,
    #[error("target url is not usable: {0}")]
    InvalidTargetUrl(String),
    #[error("concurrency must be a positive integer, got `{0}`")]
    InvalidConcurrency(String),
}

/// Load the config.
///
/// An explicit `path` must exist. Without one, `harvest.ron` in the working
/// directory is read when present. `env` supplies environment overrides.
pub fn load(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<HarvestConfig, ConfigError> {
    let config = match path {
        Some(path) => read_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_file(default_path)?
            } else {
                HarvestConfig::default()
            }
        }
    };
    let config = apply_env_overrides(config, env)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse(content: &str, path: &Path) -> Result<HarvestConfig, ConfigError> {
    ron::from_str(content).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn read_file(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, path)
}

fn apply_env_overrides(
    mut config: HarvestConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<HarvestConfig, ConfigError> {
    let set = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = set(ENV_TARGET_URL) {
        config.target_url = url.trim().to_string();
    }
    if let Some(dir) = set(ENV_OUTPUT_PATH) {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(selector) = set(ENV_SELECTOR) {
        config.selector = selector;
    }
    if let Some(raw) = set(ENV_CONCURRENCY) {
        config.concurrency = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidConcurrency(raw.clone()))?;
    }
    Ok(config)
}

fn validate(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.target_url.trim().is_empty() {
        return Err(ConfigError::MissingTargetUrl);
    }
    parse_absolute_url(&config.target_url)
        .map_err(|err| ConfigError::InvalidTargetUrl(err.reason))?;
    if config.concurrency == 0 {
        return Err(ConfigError::InvalidConcurrency("0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn ron_file_overrides_defaults() {
        let content = r#"(
            target_url: "https://example.com/gallery",
            selector: "img.photo",
            filename_pattern: UrlBasename,
            concurrency: 2,
            timeout_ms: Some(1500),
            records_file: Some("links.json"),
            log_destination: Both,
        )"#;
        let config = parse(content, Path::new("harvest.ron")).unwrap();
        assert_eq!(config.selector, "img.photo");
        assert_eq!(config.filename_pattern, FilenamePattern::UrlBasename);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.timeout_ms, Some(1500));
        assert_eq!(config.records_file.as_deref(), Some("links.json"));
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(config.output_dir, PathBuf::from("./downloads"));
    }

    #[test]
    fn indexed_pattern_parses_with_prefix() {
        let content = r#"(filename_pattern: Indexed(prefix: "photo"))"#;
        let config = parse(content, Path::new("harvest.ron")).unwrap();
        assert_eq!(
            config.filename_pattern,
            FilenamePattern::Indexed {
                prefix: "photo".to_string()
            }
        );
    }

    #[test]
    fn environment_wins_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("harvest.ron");
        fs::write(&path, r#"(target_url: "https://file.example.com", concurrency: 8)"#).unwrap();

        let config = load(
            Some(&path),
            env_of(&[
                (ENV_TARGET_URL, "https://env.example.com/page"),
                (ENV_OUTPUT_PATH, "/tmp/images"),
                (ENV_CONCURRENCY, "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.target_url, "https://env.example.com/page");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/images"));
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = load(Some(&temp.path().join("nope.ron")), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn target_url_is_required_and_absolute() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("harvest.ron");
        fs::write(&path, "()").unwrap();

        let err = load(Some(&path), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTargetUrl));

        let err = load(Some(&path), env_of(&[(ENV_TARGET_URL, "gallery/index.html")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTargetUrl(_)));
    }

    #[test]
    fn concurrency_must_be_positive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("harvest.ron");
        fs::write(&path, r#"(target_url: "https://example.com")"#).unwrap();

        let err = load(Some(&path), env_of(&[(ENV_CONCURRENCY, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency(_)));

        let err = load(Some(&path), env_of(&[(ENV_CONCURRENCY, "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConcurrency(ref raw) if raw == "many"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let err = parse("(concurrency: \"four\")", Path::new("bad.ron")).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, PathBuf::from("bad.ron")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
