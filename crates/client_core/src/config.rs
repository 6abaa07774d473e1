use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use url::Url;

use crate::live::RetryPolicy;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_DELETE_ERROR_TTL: Duration = Duration::from_millis(5000);
pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_url: String,
    pub page_size: u32,
    pub retry: RetryPolicy,
    pub delete_error_ttl: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::Fixed(DEFAULT_RETRY_DELAY),
            delete_error_ttl: DEFAULT_DELETE_ERROR_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub calls: Url,
    pub push: Url,
}

impl ClientSettings {
    pub fn endpoints(&self) -> anyhow::Result<Endpoints> {
        Ok(Endpoints {
            calls: self.api_url("api/calls")?,
            push: self.push_url()?,
        })
    }

    pub fn api_url(&self, path: &str) -> anyhow::Result<Url> {
        let base = self.base_url()?;
        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid api path '{path}' for '{}'", self.server_url))
    }

    pub fn push_url(&self) -> anyhow::Result<Url> {
        let mut url = self.base_url()?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(anyhow!(
                    "server_url must start with http:// or https://, got '{other}://'"
                ))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot switch '{}' to {scheme}", self.server_url))?;
        url.join("ws")
            .with_context(|| format!("invalid push url for '{}'", self.server_url))
    }

    fn base_url(&self) -> anyhow::Result<Url> {
        let raw = self.server_url.trim();
        let mut url =
            Url::parse(raw).with_context(|| format!("invalid server_url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server_url must start with http:// or https://: '{}'",
                self.server_url
            ));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Some(file_cfg) = read_settings_file(Path::new(SETTINGS_FILE)) {
        apply_overrides(&mut settings, |key| file_cfg.get(key).cloned());
    }

    apply_overrides(&mut settings, |key| {
        let env_key = format!("APP__{}", key.to_ascii_uppercase());
        std::env::var(env_key).ok()
    });
    if let Ok(v) = std::env::var("CALLS_SERVER_URL") {
        settings.server_url = v;
    }

    settings
}

fn read_settings_file(path: &Path) -> Option<HashMap<String, String>> {
    let raw = fs::read_to_string(path).ok()?;
    let table = toml::from_str::<toml::Table>(&raw).ok()?;
    Some(
        table
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Integer(i) => i.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect(),
    )
}

pub(crate) fn apply_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("server_url") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("page_size") {
        if let Ok(parsed) = v.trim().parse::<u32>() {
            if parsed > 0 {
                settings.page_size = parsed;
            }
        }
    }
    if let Some(v) = lookup("retry_delay_ms") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.retry = RetryPolicy::Fixed(Duration::from_millis(parsed));
        }
    }
    if let Some(v) = lookup("delete_error_ttl_ms") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.delete_error_ttl = Duration::from_millis(parsed);
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
