use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::rules::DEFAULT_MAX_OPEN_TICKETS;

pub const CONFIG_FILE: &str = "questiond.json";
pub const DEFAULT_TEACHER_PASSWORD: &str = "1234";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub database_url: String,
    pub auth_token: String,
}

fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.contains("YOUR_") || v.contains("your-") || (v.starts_with('<') && v.ends_with('>'))
}

impl RemoteConfig {
    /// Static check: a real database URL and no template credentials.
    pub fn is_configured(&self) -> bool {
        let url = self.database_url.trim();
        !url.is_empty()
            && (url.starts_with("https://") || url.starts_with("http://"))
            && !is_placeholder(url)
            && !is_placeholder(&self.auth_token)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub max_open_tickets: usize,
    pub default_teacher_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            max_open_tickets: DEFAULT_MAX_OPEN_TICKETS,
            default_teacher_password: DEFAULT_TEACHER_PASSWORD.to_string(),
        }
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let cfg = serde_json::from_str(&text)
        .with_context(|| format!("{} is invalid", path.to_string_lossy()))?;
    Ok(Some(cfg))
}

fn apply_env(cfg: &mut Config) {
    if let Ok(v) = std::env::var("QUESTIOND_DATABASE_URL") {
        cfg.remote.database_url = v;
    }
    if let Ok(v) = std::env::var("QUESTIOND_AUTH_TOKEN") {
        cfg.remote.auth_token = v;
    }
    if let Ok(v) = std::env::var("QUESTIOND_MAX_OPEN_TICKETS") {
        match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => cfg.max_open_tickets = n,
            _ => log::warn!("Ignoring QUESTIOND_MAX_OPEN_TICKETS={v}"),
        }
    }
}

/// Loads `questiond.json` from the workspace plus environment overrides.
/// Configuration problems are never fatal: defaults (local mode) are used instead.
pub fn load_config(workspace: &Path) -> Config {
    let mut cfg = match read_config_file(&workspace.join(CONFIG_FILE)) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => Config::default(),
        Err(e) => {
            log::warn!("Using default configuration: {e:#}");
            Config::default()
        }
    };
    apply_env(&mut cfg);
    if cfg.max_open_tickets == 0 {
        cfg.max_open_tickets = DEFAULT_MAX_OPEN_TICKETS;
    }
    if cfg.default_teacher_password.trim().is_empty() {
        cfg.default_teacher_password = DEFAULT_TEACHER_PASSWORD.to_string();
    }
    cfg
}
