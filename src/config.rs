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
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  /// Email of the signed-in user, used to find them in the user directory
  pub email: String,
  /// Name of the cookie carrying the session token
  #[serde(default = "default_session_cookie")]
  pub session_cookie: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_session_cookie() -> String {
  "nuxt-session".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Age after which the bills snapshot is considered stale
  #[serde(default = "default_interval_secs")]
  pub stale_threshold_secs: u64,
  /// Period of the background refresh timer
  #[serde(default = "default_interval_secs")]
  pub refresh_interval_secs: u64,
}

fn default_interval_secs() -> u64 {
  45
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_threshold_secs: default_interval_secs(),
      refresh_interval_secs: default_interval_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_threshold(&self) -> Duration {
    Duration::from_secs(self.stale_threshold_secs)
  }

  pub fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_interval_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./splitc.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/splitc/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/splitc/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("splitc.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("splitc").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    url::Url::parse(&config.api.url)
      .map_err(|e| eyre!("api.url {:?} is not a valid URL: {}", config.api.url, e))?;
    if config.cache.refresh_interval_secs == 0 {
      return Err(eyre!("cache.refresh_interval_secs must be greater than 0"));
    }
    Ok(config)
  }

  /// Get the session token from environment variables.
  ///
  /// Checks SPLITC_SESSION first, then SPLITC_TOKEN as fallback.
  pub fn get_session_token() -> Result<String> {
    std::env::var("SPLITC_SESSION")
      .or_else(|_| std::env::var("SPLITC_TOKEN"))
      .map_err(|_| {
        eyre!("Session token not found. Set SPLITC_SESSION or SPLITC_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_fill_optional_sections() {
    let config = Config::from_yaml(
      "api:\n  url: https://split.example.com\n  email: me@example.com\n",
    )
    .unwrap();

    assert_eq!(config.api.session_cookie, "nuxt-session");
    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.cache.stale_threshold(), Duration::from_secs(45));
    assert_eq!(config.cache.refresh_interval(), Duration::from_secs(45));
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn test_rejects_invalid_url() {
    let err = Config::from_yaml("api:\n  url: not a url\n  email: me@example.com\n").unwrap_err();
    assert!(err.to_string().contains("api.url"));
  }

  #[test]
  fn test_rejects_zero_refresh_interval() {
    let err = Config::from_yaml(
      "api:\n  url: https://split.example.com\n  email: me@example.com\ncache:\n  refresh_interval_secs: 0\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("cache.refresh_interval_secs"));
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      "api:\n  url: http://localhost:3000\n  email: a@b.io\ncache:\n  stale_threshold_secs: 10\n"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.cache.stale_threshold_secs, 10);
    assert_eq!(config.cache.refresh_interval_secs, 45);
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let err = Config::load(Some(Path::new("/nonexistent/splitc.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
