use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

pub const DEFAULT_SERVICE_ENDPOINT: &str = "https://bsky.social";
pub const DEFAULT_LANDING_PAGE: &str = "https://githubsky.vercel.app/";

const ENV_SERVICE: &str = "GITHUBSKY_SERVICE";
const ENV_DATABASE_URL: &str = "GITHUBSKY_DATABASE_URL";
const ENV_LOG_LEVEL: &str = "GITHUBSKY_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub service_endpoint: String,
    pub landing_page_uri: String,
    pub embed_title: String,
    pub post_language: String,
    pub hashtag: String,
    pub database_url: Option<String>,
    pub request_timeout_secs: u64,
    pub max_concurrent_jobs: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_endpoint: DEFAULT_SERVICE_ENDPOINT.to_string(),
            landing_page_uri: DEFAULT_LANDING_PAGE.to_string(),
            embed_title: "Githubsky".to_string(),
            post_language: "ja".to_string(),
            hashtag: "#Githubsky".to_string(),
            database_url: None,
            request_timeout_secs: 120,
            max_concurrent_jobs: 4,
            log_level: "info".to_string(),
        }
    }
}

/// Settings the dispatch pipeline needs for every job.
#[derive(Debug, Clone, PartialEq)]
pub struct PostSettings {
    pub default_service: String,
    pub landing_page_uri: String,
    pub embed_title: String,
    pub language: String,
    pub hashtag: String,
    pub max_concurrent_jobs: usize,
}

impl Default for PostSettings {
    fn default() -> Self {
        Config::default().post_settings()
    }
}

impl Config {
    pub fn post_settings(&self) -> PostSettings {
        PostSettings {
            default_service: self.service_endpoint.clone(),
            landing_page_uri: self.landing_page_uri.clone(),
            embed_title: self.embed_title.clone(),
            language: self.post_language.clone(),
            hashtag: self.hashtag.clone(),
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }

    /// Database URL from the config, or a SQLite file in the data directory.
    pub fn resolve_database_url(&self) -> AppResult<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        let db_path = get_data_directory()?.join("githubsky.db");
        Ok(format!("sqlite:{}?mode=rwc", db_path.display()))
    }

    /// Configured log level, `Info` when it does not parse.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(service) = std::env::var(ENV_SERVICE) {
            log::info!("Service endpoint overridden by {}", ENV_SERVICE);
            self.service_endpoint = service;
        }
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.log_level = level.to_lowercase();
        }
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("githubsky");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

pub fn get_data_directory() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::Config("Could not find data directory".to_string()))?
        .join("githubsky");

    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

/// Load the config from `path`, or from the platform config directory.
///
/// A missing file is created with defaults. A file that fails to parse falls
/// back to defaults. Environment overrides are applied before validation.
pub fn load_config(path: Option<&Path>) -> AppResult<Config> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };

    let mut config = if config_path.exists() {
        let config_str = fs::read_to_string(&config_path)?;
        parse_config(&config_str)
    } else {
        let default_config = Config::default();
        save_config(&config_path, &default_config)?;
        default_config
    };

    config.apply_env_overrides();
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(config_str: &str) -> Config {
    serde_json::from_str(config_str).unwrap_or_else(|e| {
        log::warn!("Failed to parse config file: {}. Using defaults.", e);
        Config::default()
    })
}

pub fn save_config(config_path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if !is_http_url(&config.service_endpoint) {
        return Err(AppError::validation("service_endpoint", "Must be an http(s) URL"));
    }

    if !is_http_url(&config.landing_page_uri) {
        return Err(AppError::validation("landing_page_uri", "Must be an http(s) URL"));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation("request_timeout_secs", "Must be greater than 0"));
    }

    if config.max_concurrent_jobs == 0 || config.max_concurrent_jobs > 32 {
        return Err(AppError::validation("max_concurrent_jobs", "Must be between 1 and 32"));
    }

    if !config.hashtag.starts_with('#') || config.hashtag.len() < 2 {
        return Err(AppError::validation("hashtag", "Must start with # and not be empty"));
    }

    if config.post_language.trim().is_empty() {
        return Err(AppError::validation("post_language", "Must not be empty"));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}
