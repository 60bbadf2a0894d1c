use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::keys::KeyChord;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub organization: OrganizationConfig,
    #[serde(default)]
    pub terms: TermsConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub lockdown: LockdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrganizationConfig {
    pub name: String,
    #[serde(default = "default_app_id")]
    pub app_id: String,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: "Contoso".to_string(),
            app_id: default_app_id(),
        }
    }
}

fn default_app_id() -> String {
    "TermsGate".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TermsConfig {
    pub version: String,
    #[serde(default = "default_terms_title")]
    pub title: String,
    /// Replaces the built-in text when set.
    #[serde(default)]
    pub text_path: Option<PathBuf>,
}

impl Default for TermsConfig {
    fn default() -> Self {
        Self {
            version: crate::tos_text::DEFAULT_TERMS_VERSION.to_string(),
            title: default_terms_title(),
            text_path: None,
        }
    }
}

fn default_terms_title() -> String {
    "Acceptable Use Policy".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_max_dismissals")]
    pub max_dismissals: u32,
    /// Repetition interval of the scheduled task; 0 disables repetition.
    #[serde(default = "default_reminder_hours")]
    pub reminder_hours: u32,
    #[serde(default = "default_true")]
    pub fullscreen: bool,
    #[serde(default = "default_true")]
    pub require_scroll_confirmation: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_dismissals: default_max_dismissals(),
            reminder_hours: default_reminder_hours(),
            fullscreen: true,
            require_scroll_confirmation: true,
        }
    }
}

fn default_max_dismissals() -> u32 {
    3
}
fn default_reminder_hours() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LockdownConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub hide_taskbar: bool,
    #[serde(default = "default_blocked_keys")]
    pub blocked_keys: Vec<String>,
}

impl Default for LockdownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hide_taskbar: true,
            blocked_keys: default_blocked_keys(),
        }
    }
}

fn default_blocked_keys() -> Vec<String> {
    ["Win", "Alt+Tab", "Alt+Esc", "Alt+F4", "Ctrl+Esc"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Relative paths resolve against the executable directory. Unset means
    /// `logs` inside the store directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StoreConfig {
    /// Overrides the machine-wide base directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config.toml at {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config.toml")?;
        config.validate()?;

        Ok(config)
    }

    /// Explicit path must exist; otherwise fall back to defaults when no file is found.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let path = get_config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.terms.version.trim().is_empty() {
            return Err(ConfigError::EmptyTermsVersion);
        }
        validate_identifier("name", &self.organization.name)?;
        validate_identifier("app_id", &self.organization.app_id)?;
        self.blocked_chords()?;
        Ok(())
    }

    pub fn blocked_chords(&self) -> Result<Vec<KeyChord>, ConfigError> {
        self.lockdown
            .blocked_keys
            .iter()
            .map(|entry| {
                KeyChord::parse(entry).ok_or_else(|| ConfigError::InvalidKeyChord {
                    entry: entry.clone(),
                })
            })
            .collect()
    }

    /// Machine-scoped directory holding the acceptance record.
    pub fn store_dir(&self) -> PathBuf {
        let base = self
            .store
            .dir
            .clone()
            .unwrap_or_else(default_store_base);
        base.join(&self.organization.name)
            .join(&self.organization.app_id)
    }

    /// Machine-scoped log directory, writable by the agent once `install` ran.
    pub fn default_log_dir(&self) -> PathBuf {
        self.store_dir().join("logs")
    }

    /// Configured log directory first, the machine-scoped one as fallback.
    pub fn log_dirs(&self) -> Vec<PathBuf> {
        let fallback = self.default_log_dir();
        let configured = match &self.logging.dir {
            Some(dir) if dir.is_relative() => get_exe_dir().join(dir),
            Some(dir) => dir.clone(),
            None => return vec![fallback],
        };
        if configured == fallback {
            vec![fallback]
        } else {
            vec![configured, fallback]
        }
    }

    /// Scheduler path, e.g. `\Contoso\TermsGate`.
    pub fn task_name(&self) -> String {
        format!(
            "\\{}\\{}",
            self.organization.name, self.organization.app_id
        )
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyIdentifier { field });
    }
    let reserved = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    if value.contains(&reserved[..]) || value == "." || value == ".." {
        return Err(ConfigError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(windows)]
fn default_store_base() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
}

#[cfg(not(windows))]
fn default_store_base() -> PathBuf {
    PathBuf::from("/var/lib")
}

pub fn get_exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn get_config_path() -> PathBuf {
    let exe_dir = get_exe_dir();
    let config_path = exe_dir.join("config").join("config.toml");

    if config_path.exists() {
        return config_path;
    }

    let cwd_config = PathBuf::from("config/config.toml");
    if cwd_config.exists() {
        return cwd_config;
    }

    config_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.prompt.max_dismissals, 3);
        assert_eq!(config.task_name(), "\\Contoso\\TermsGate");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [organization]
            name = "Fabrikam"

            [terms]
            version = "3.3.0"
            "#,
        )
        .unwrap();

        assert_eq!(config.organization.app_id, "TermsGate");
        assert_eq!(config.terms.version, "3.3.0");
        assert_eq!(config.terms.title, "Acceptable Use Policy");
        assert_eq!(config.prompt.reminder_hours, 4);
        assert!(config.lockdown.enabled);
        assert_eq!(config.lockdown.blocked_keys.len(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn shipped_config_parses() {
        let config: Config = toml::from_str(include_str!("../config/config.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.organization.name, "Contoso");
        assert_eq!(config.blocked_chords().unwrap().len(), 5);
    }

    #[test]
    fn store_dir_is_scoped_by_organization_and_app() {
        let mut config = Config::default();
        config.store.dir = Some(PathBuf::from("/tmp/base"));
        assert_eq!(
            config.store_dir(),
            PathBuf::from("/tmp/base").join("Contoso").join("TermsGate")
        );
    }

    #[test]
    fn logs_default_to_the_store_directory() {
        let mut config = Config::default();
        config.store.dir = Some(PathBuf::from("/tmp/base"));
        let store_logs = PathBuf::from("/tmp/base/Contoso/TermsGate/logs");
        assert_eq!(config.log_dirs(), vec![store_logs.clone()]);

        config.logging.dir = Some(PathBuf::from("/var/log/terms"));
        assert_eq!(
            config.log_dirs(),
            vec![PathBuf::from("/var/log/terms"), store_logs.clone()]
        );

        config.logging.dir = Some(PathBuf::from("data/logs"));
        assert_eq!(config.log_dirs()[0], get_exe_dir().join("data/logs"));
        assert_eq!(config.log_dirs()[1], store_logs);
    }

    #[test]
    fn empty_version_is_rejected() {
        let mut config = Config::default();
        config.terms.version = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyTermsVersion)
        ));
    }

    #[test]
    fn organization_name_cannot_escape_the_store() {
        let mut config = Config::default();
        config.organization.name = "..".to_string();
        assert!(config.validate().is_err());

        config.organization.name = "Contoso\\Evil".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIdentifier { field: "name", .. })
        ));
    }

    #[test]
    fn bad_key_chord_is_rejected() {
        let mut config = Config::default();
        config.lockdown.blocked_keys = vec!["Alt+Banana".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeyChord { .. })
        ));
    }

    #[test]
    fn load_from_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[terms]\nversion = \"\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "[terms]\nversion = \"4.0.0\"\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().terms.version, "4.0.0");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_or_default(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
