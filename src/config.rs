use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// How the application is reopened once the install step is over.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Reopen {
    /// Relaunch whenever a bundle is in place, whether or not it was running before
    Always,
    /// Relaunch only if the application was running when the update started
    WhenRunning,
}

impl Default for Reopen {
    fn default() -> Self {
        Self::Always
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    /// File name for the downloaded artifact; defaults to the last URL path segment
    pub artifact_name: Option<String>,
    /// Retries after the first attempt
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://dl.google.com/chrome/mac/stable/GGRO/googlechrome.pkg".to_string(),
            artifact_name: None,
            retries: 12,
            retry_delay_secs: 5,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// File name of the descriptor inside the expanded package
    pub descriptor: String,
    pub version_pattern: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            descriptor: "Distribution".to_string(),
            version_pattern: r#"CFBundleShortVersionString="([^"]+)""#.to_string(),
        }
    }
}

impl PackageConfig {
    pub fn version_regex(&self) -> Result<Regex> {
        Regex::new(&self.version_pattern)
            .with_context(|| format!("Invalid version pattern: {}", self.version_pattern))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Process name, as matched by the running-process check and the quit request
    pub name: String,
    pub path: PathBuf,
    pub version_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Google Chrome".to_string(),
            path: PathBuf::from("/Applications/Google Chrome.app"),
            version_key: "CFBundleShortVersionString".to_string(),
        }
    }
}

impl AppConfig {
    /// Bundle directory name, e.g. `Google Chrome.app`
    pub fn bundle_name(&self) -> Result<&str> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Application path has no bundle name: {:?}", self.path))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub threshold_secs: u64,
    pub max_ticks: u32,
    pub interval_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold_secs: 1200,
            max_ticks: 108,
            interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Volume the platform installer targets
    pub target: PathBuf,
    pub reopen: Reopen,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::from("/"),
            reopen: Reopen::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lock_file: PathBuf,

    /// Parent directory for the scratch working area (system temp dir when unset)
    pub work_root: Option<PathBuf>,

    pub source: SourceConfig,
    pub package: PackageConfig,
    pub app: AppConfig,
    pub idle: IdleConfig,
    pub install: InstallConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_file: std::env::temp_dir().join("idle-update.lock"),
            work_root: None,
            source: SourceConfig::default(),
            package: PackageConfig::default(),
            app: AppConfig::default(),
            idle: IdleConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// A missing file at the default location yields the built-in defaults;
    /// an explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("idle-update")
            .join("config.toml")
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.package.version_regex()?;

        reqwest::Url::parse(&self.source.url)
            .with_context(|| format!("Invalid source url: {}", self.source.url))?;

        if self.idle.max_ticks > 0 && self.idle.interval_secs == 0 {
            bail!("idle.interval_secs must be greater than zero");
        }

        if !self.app.path.is_absolute() {
            bail!("app.path must be absolute: {}", self.app.path.display());
        }
        self.app.bundle_name()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.retries, 12);
        assert_eq!(config.idle.max_ticks, 108);
        assert_eq!(config.idle.interval_secs, 300);
        assert_eq!(config.idle.threshold_secs, 1200);
        assert_eq!(config.install.reopen, Reopen::Always);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [idle]
            max_ticks = 3

            [install]
            reopen = "when-running"
            "#,
        )
        .unwrap();

        assert_eq!(config.idle.max_ticks, 3);
        assert_eq!(config.idle.threshold_secs, 1200);
        assert_eq!(config.install.reopen, Reopen::WhenRunning);
        assert_eq!(config.package.descriptor, "Distribution");
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let config = Config::from_toml("[package]\nversion_pattern = \"([\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_relative_app_path() {
        let config = Config::from_toml("[app]\npath = \"Chrome.app\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = Config::from_toml("[idle]\ninterval_secs = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[source]\nurl = \"https://example.com/app.zip\"\nretries = 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.source.url, "https://example.com/app.zip");
        assert_eq!(config.source.retries, 2);
    }
}
