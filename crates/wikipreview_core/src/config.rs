use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".wikipreview/config.toml";
pub const DEFAULT_USER_AGENT: &str = "wikipreview/0.1";
pub const DEFAULT_TRANSFER_PROTOCOL: &str = "https://";
pub const DEFAULT_ARTICLE_PATH: &str = "/wiki/";
pub const DEFAULT_API_PATH: &str = "/w/api.php";
pub const DEFAULT_CONTENT_MODEL: &str = "wikitext";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub preview: PreviewSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub host: Option<String>,
    pub transfer_protocol: Option<String>,
    pub article_path: Option<String>,
    pub api_path: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PreviewSection {
    pub enable_javascript: bool,
    pub get_css: bool,
    pub preview_css_style: String,
    pub redirects: bool,
    pub content_model: Option<String>,
}

impl Default for PreviewSection {
    fn default() -> Self {
        Self {
            enable_javascript: false,
            get_css: false,
            preview_css_style: String::new(),
            redirects: true,
            content_model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AuthSection {
    pub user_name: Option<String>,
    pub password: Option<String>,
}

impl WikiConfig {
    /// Resolve the wiki host: env WIKI_HOST > config > None.
    pub fn host(&self) -> Option<String> {
        env_override("WIKI_HOST")
            .or_else(|| non_empty(self.wiki.host.as_deref()))
            .map(|host| host.trim_end_matches('/').to_string())
    }

    /// Resolve the scheme prefix, always ending in `://`.
    pub fn transfer_protocol(&self) -> String {
        let raw = env_override("WIKI_TRANSFER_PROTOCOL")
            .or_else(|| non_empty(self.wiki.transfer_protocol.as_deref()))
            .unwrap_or_else(|| DEFAULT_TRANSFER_PROTOCOL.to_string());
        let scheme = raw.trim_end_matches('/').trim_end_matches(':');
        format!("{scheme}://")
    }

    pub fn article_path(&self) -> String {
        env_override("WIKI_ARTICLE_PATH")
            .or_else(|| non_empty(self.wiki.article_path.as_deref()))
            .unwrap_or_else(|| DEFAULT_ARTICLE_PATH.to_string())
    }

    pub fn api_path(&self) -> String {
        env_override("WIKI_API_PATH")
            .or_else(|| non_empty(self.wiki.api_path.as_deref()))
            .unwrap_or_else(|| DEFAULT_API_PATH.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKI_USER_AGENT")
            .or_else(|| non_empty(self.wiki.user_agent.as_deref()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn content_model(&self) -> String {
        non_empty(self.preview.content_model.as_deref())
            .unwrap_or_else(|| DEFAULT_CONTENT_MODEL.to_string())
    }

    /// Full API endpoint, or None when no host is configured.
    pub fn api_url(&self) -> Option<String> {
        let host = self.host()?;
        Some(format!(
            "{}{}{}",
            self.transfer_protocol(),
            host,
            leading_slash(&self.api_path())
        ))
    }

    /// Article base used for `<base href>` in rendered previews. A trailing
    /// `$1` title placeholder is dropped so relative links resolve against
    /// the article directory.
    pub fn base_url(&self) -> Option<String> {
        let host = self.host()?;
        let article_path = self.article_path();
        let article_dir = article_path.strip_suffix("$1").unwrap_or(&article_path);
        Some(format!(
            "{}{}{}",
            self.transfer_protocol(),
            host,
            leading_slash(article_dir)
        ))
    }

    /// Bot credentials: env WIKI_BOT_USER/WIKI_BOT_PASS > `[auth]`. Both
    /// must be present.
    pub fn credentials(&self) -> Option<(String, String)> {
        let user = env_override("WIKI_BOT_USER")
            .or_else(|| non_empty(self.auth.user_name.as_deref()))?;
        let password = env_override("WIKI_BOT_PASS")
            .or_else(|| non_empty(self.auth.password.as_deref()))?;
        Some((user, password))
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_empty(Some(&value)))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn leading_slash(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
