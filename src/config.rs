//! Runtime settings resolved from CLI overrides, the environment and an
//! optional `.env` file, in that order of precedence.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";
pub const DEFAULT_FFPROBE: &str = "ffprobe";
pub const DEFAULT_SOCKET_TIMEOUT: u64 = 30;

const DOWNLOADER_KEY: &str = "YTARCHIVE_DOWNLOADER";
const FFPROBE_KEY: &str = "YTARCHIVE_FFPROBE";
const SOCKET_TIMEOUT_KEY: &str = "YTARCHIVE_SOCKET_TIMEOUT";
const MAX_PASSES_KEY: &str = "YTARCHIVE_MAX_PASSES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub downloader: PathBuf,
    pub ffprobe: PathBuf,
    pub socket_timeout: u64,
    /// `None` retries until a pass has no recoverable failures.
    pub max_passes: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub downloader: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub socket_timeout: Option<u64>,
    pub max_passes: Option<usize>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let downloader = overrides
        .downloader
        .or_else(|| lookup_value(DOWNLOADER_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADER));
    let ffprobe = overrides
        .ffprobe
        .or_else(|| lookup_value(FFPROBE_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FFPROBE));
    let socket_timeout = overrides
        .socket_timeout
        .or_else(|| {
            lookup_value(SOCKET_TIMEOUT_KEY, file_vars, &env_lookup)
                .and_then(|value| value.parse::<u64>().ok())
        })
        .filter(|timeout| *timeout > 0)
        .unwrap_or(DEFAULT_SOCKET_TIMEOUT);
    let max_passes = overrides
        .max_passes
        .or_else(|| {
            lookup_value(MAX_PASSES_KEY, file_vars, &env_lookup)
                .and_then(|value| value.parse::<usize>().ok())
        })
        .filter(|passes| *passes > 0);
    RuntimeSettings {
        downloader,
        ffprobe,
        socket_timeout,
        max_passes,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key)
        .or_else(|| file_vars.get(key).cloned())
        .filter(|value| !value.trim().is_empty())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
