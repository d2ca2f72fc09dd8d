use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_WORK_DIR: &str = "downloads";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

const WORK_DIR_KEY: &str = "CLIPFETCH_WORK_DIR";
const YT_DLP_KEY: &str = "CLIPFETCH_YT_DLP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Scratch directory emptied at the start of every request.
    pub work_dir: PathBuf,
    /// Program name or path of the fetch engine.
    pub yt_dlp: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub work_dir: Option<PathBuf>,
    pub yt_dlp: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn load_settings() -> Result<Settings> {
    resolve_settings(SettingsOverrides::default())
}

/// Resolves settings from overrides, then the process environment, then the
/// env file, then built-in defaults.
pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let work_dir = overrides
        .work_dir
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup_value(WORK_DIR_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));
    let yt_dlp = overrides
        .yt_dlp
        .filter(|path| !path.as_os_str().is_empty())
        .or_else(|| lookup_value(YT_DLP_KEY, file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));
    Settings { work_dir, yt_dlp }
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
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

/// Parses a dotenv-style file. A missing file yields an empty map.
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
