use config::{Config, ConfigError, Environment, File as ConfigFile};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;

/// How the remote side is asked for directory contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// Structured listing when the server supports it, otherwise names plus a cwd probe.
    #[default]
    Auto,
    /// Structured listing only.
    Mlsd,
    /// Name listing plus a cwd probe for every entry.
    Nlst,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MirrorConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default = "default_remote_base")]
    pub remote_base_dir: String,
    #[serde(default = "default_local_base")]
    pub local_base_dir: PathBuf,
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    #[serde(default = "default_true")]
    pub passive_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default = "default_exclude_names")]
    pub exclude_names: Vec<String>,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default = "default_true")]
    pub sort_entries: bool,
    #[serde(default = "default_true")]
    pub sanitize_names: bool,
    #[serde(default)]
    pub listing_mode: ListingMode,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_csv: Option<PathBuf>,
}

fn default_port() -> u16 {
    21
}

fn default_username() -> String {
    "anonymous".to_string()
}

fn default_remote_base() -> String {
    "/".to_string()
}

fn default_local_base() -> PathBuf {
    PathBuf::from("./ftp_backup")
}

fn default_true() -> bool {
    true
}

fn default_exclude_names() -> Vec<String> {
    vec![".".to_string(), "..".to_string()]
}

fn default_file_pattern() -> String {
    "*".to_string()
}

fn default_workers() -> usize {
    1
}

impl MirrorConfig {
    /// Defaults for everything except the host.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            port: default_port(),
            username: default_username(),
            password: None,
            password_env: None,
            remote_base_dir: default_remote_base(),
            local_base_dir: default_local_base(),
            skip_existing: true,
            passive_mode: true,
            max_depth: None,
            exclude_names: default_exclude_names(),
            file_pattern: default_file_pattern(),
            sort_entries: true,
            sanitize_names: true,
            listing_mode: ListingMode::Auto,
            workers: default_workers(),
            report_csv: None,
        }
    }

    /// Sample configuration written by `init-config`.
    pub fn example() -> Self {
        Self {
            username: "your_username".to_string(),
            password_env: Some("FTP_MIRROR_PASSWORD".to_string()),
            report_csv: Some(PathBuf::from("mirror_report.csv")),
            ..Self::new("ftp.example.com")
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if let Err(e) = Pattern::new(&self.file_pattern) {
            return Err(Error::InvalidConfig(format!(
                "invalid file_pattern '{}': {}",
                self.file_pattern, e
            )));
        }
        Ok(())
    }

    /// Copy safe to print or log.
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }

    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Load from the optional `Config` file (or `config_name`), then `FTP_MIRROR_*`
/// environment variables.
pub fn load_configuration(config_name: Option<&str>) -> Result<MirrorConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(config_name.unwrap_or("Config")).required(false))
        .add_source(
            Environment::with_prefix("FTP_MIRROR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("exclude_names"),
        )
        .build()?;
    builder.try_deserialize::<MirrorConfig>()
}
