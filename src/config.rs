use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub ui: UiConfig,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  /// Cake whose reviews the dashboard opens with `v`
  pub default_cake: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long fetched data counts as fresh
  #[serde(default = "default_stale_time_secs")]
  pub stale_time_secs: u64,
  /// Queue writes to the same resource family instead of letting them overlap
  #[serde(default = "default_true")]
  pub serialize_mutations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
  #[serde(default = "default_tick_rate_ms")]
  pub tick_rate_ms: u64,
  #[serde(default = "default_search_debounce_ms")]
  pub search_debounce_ms: u64,
  /// Reviews per page
  #[serde(default = "default_page_size")]
  pub page_size: u32,
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_stale_time_secs() -> u64 {
  30
}

fn default_true() -> bool {
  true
}

fn default_tick_rate_ms() -> u64 {
  250
}

fn default_search_debounce_ms() -> u64 {
  300
}

fn default_page_size() -> u32 {
  20
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: default_stale_time_secs(),
      serialize_mutations: true,
    }
  }
}

impl Default for UiConfig {
  fn default() -> Self {
    Self {
      tick_rate_ms: default_tick_rate_ms(),
      search_debounce_ms: default_search_debounce_ms(),
      page_size: default_page_size(),
    }
  }
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Result<chrono::Duration> {
    i64::try_from(self.stale_time_secs)
      .ok()
      .and_then(chrono::Duration::try_seconds)
      .ok_or_else(|| eyre!("cache.stale_time_secs is out of range: {}", self.stale_time_secs))
  }
}

impl UiConfig {
  pub fn tick_rate(&self) -> Duration {
    Duration::from_millis(self.tick_rate_ms)
  }

  pub fn search_debounce(&self) -> Duration {
    Duration::from_millis(self.search_debounce_ms)
  }
}

impl Config {
  /// Config with every default and the given API URL.
  pub fn default_for(url: &str) -> Self {
    Self {
      api: ApiConfig {
        url: url.to_string(),
        timeout_secs: default_timeout_secs(),
      },
      cache: CacheConfig::default(),
      ui: UiConfig::default(),
      title: None,
      default_cake: None,
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sweetnest.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sweetnest/config.yaml
  ///
  /// Without a file, `api_url` alone is enough to run.
  pub fn load(explicit_path: Option<&Path>, api_url: Option<&str>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match (path, api_url) {
      (Some(p), _) => Self::load_from_path(&p)?,
      (None, Some(url)) => Self::default_for(url),
      (None, None) => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/sweetnest/config.yaml\n\
           or pass --api-url. See config.example.yaml for the format."
        ))
      }
    };

    if let Some(url) = api_url {
      config.api.url = url.to_string();
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sweetnest.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sweetnest").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config = Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    config
      .cache
      .stale_time()
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;
    Ok(config)
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// API bearer token from `SWEETNEST_API_TOKEN`, if set.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SWEETNEST_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://api.sweetnest.test\n").unwrap();

    assert_eq!(config.api.url, "https://api.sweetnest.test");
    assert_eq!(config.api.timeout(), Duration::from_secs(10));
    assert_eq!(config.cache.stale_time().unwrap(), chrono::Duration::seconds(30));
    assert!(config.cache.serialize_mutations);
    assert_eq!(config.ui.tick_rate(), Duration::from_millis(250));
    assert_eq!(config.ui.search_debounce(), Duration::from_millis(300));
    assert_eq!(config.ui.page_size, 20);
    assert!(config.default_cake.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
title: Bakery Admin
default_cake: choco-1
api:
  url: http://localhost:4000/api
  timeout_secs: 3
cache:
  stale_time_secs: 5
  serialize_mutations: false
ui:
  tick_rate_ms: 100
  search_debounce_ms: 150
  page_size: 5
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.title.as_deref(), Some("Bakery Admin"));
    assert_eq!(config.default_cake.as_deref(), Some("choco-1"));
    assert_eq!(config.api.timeout_secs, 3);
    assert_eq!(config.cache.stale_time_secs, 5);
    assert!(!config.cache.serialize_mutations);
    assert_eq!(config.ui.search_debounce_ms, 150);
    assert_eq!(config.ui.page_size, 5);
  }

  #[test]
  fn test_out_of_range_stale_time_is_error() {
    let config = Config::parse("api:\n  url: http://x\ncache:\n  stale_time_secs: 18446744073709551615\n").unwrap();
    assert!(config.cache.stale_time().is_err());

    // Fits in i64 but not in a chrono duration
    let config = Config::parse("api:\n  url: http://x\ncache:\n  stale_time_secs: 9223372036854775807\n").unwrap();
    assert!(config.cache.stale_time().is_err());
  }

  #[test]
  fn test_load_rejects_out_of_range_stale_time() {
    let path = std::env::temp_dir().join(format!("sweetnest-stale-{}.yaml", std::process::id()));
    std::fs::write(&path, "api:\n  url: http://x\ncache:\n  stale_time_secs: 18446744073709551615\n").unwrap();

    let err = Config::load(Some(&path), None).unwrap_err();
    std::fs::remove_file(&path).unwrap();

    assert!(err.to_string().contains("stale_time_secs is out of range"));
  }

  #[test]
  fn test_missing_api_section_is_error() {
    assert!(Config::parse("title: nope\n").is_err());
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml")), None).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_explicit_file_with_url_override() {
    let path = std::env::temp_dir().join(format!("sweetnest-config-{}.yaml", std::process::id()));
    std::fs::write(&path, "api:\n  url: http://from-file\nui:\n  page_size: 7\n").unwrap();

    let config = Config::load(Some(&path), Some("http://from-flag")).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.api.url, "http://from-flag");
    assert_eq!(config.ui.page_size, 7);
  }
}
