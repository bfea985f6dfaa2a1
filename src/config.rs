//! Configuration Management
//!
//! Reads the properties of the active named configuration (`core/project`,
//! `compute/zone`, ...) the same way the gcloud CLI lays them out on disk:
//!
//! - `<config dir>/properties` (lowest precedence)
//! - `<config dir>/configurations/config_<name>`
//! - `CLOUDSDK_<SECTION>_<NAME>` environment variables (highest precedence)
//!
//! Loaded properties are immutable; resolving resource parameters only ever
//! reads them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Section assumed for property keys written without one (`project`)
pub const DEFAULT_SECTION: &str = "core";

/// Configuration used when nothing selects one
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// Reserved name meaning "no named configuration"
pub const NONE_CONFIG_NAME: &str = "NONE";

const ENV_CONFIG_DIR: &str = "CLOUDSDK_CONFIG";
const ENV_ACTIVE_CONFIG: &str = "CLOUDSDK_ACTIVE_CONFIG_NAME";
const ENV_PREFIX: &str = "CLOUDSDK_";

/// Sections whose names contain `_`, checked before splitting env var names
const MULTI_WORD_SECTIONS: &[&str] = &["api_endpoint_overrides", "api_client_overrides"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "invalid configuration name [{0}]: names must start with a lowercase letter and \
         contain only lowercase letters a-z, digits 0-9, and hyphens '-'"
    )]
    InvalidConfigName(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Property values of one named configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    config_name: Option<String>,
    values: BTreeMap<String, String>,
}

/// Normalize `project` to `core/project`; other keys are kept as written
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.contains('/') {
        key.to_string()
    } else {
        format!("{}/{}", DEFAULT_SECTION, key)
    }
}

impl Properties {
    /// Properties with no values at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build in-memory properties, mostly for tests and embedding
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
            .collect();
        Self {
            config_name: None,
            values,
        }
    }

    /// Return a copy with one property set (empty value unsets it)
    pub fn with(mut self, key: &str, value: &str) -> Self {
        let key = normalize_key(key);
        if value.is_empty() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value.to_string());
        }
        self
    }

    /// Get a property value; empty values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&normalize_key(key))
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Name of the configuration these properties were loaded from
    pub fn config_name(&self) -> Option<&str> {
        self.config_name.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Load the active configuration from the gcloud config directory and
    /// the process environment.
    pub fn load(configuration: Option<&str>) -> Result<Self, ConfigError> {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let Some(dir) = gcloud_config_dir(&env) else {
            tracing::debug!("No config directory found, using environment only");
            return Self::load_from(Path::new(""), configuration, &env);
        };
        Self::load_from(&dir, configuration, &env)
    }

    /// Load from an explicit directory and environment snapshot
    pub fn load_from(
        dir: &Path,
        configuration: Option<&str>,
        env: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let config_name = active_config_name(dir, configuration, env)?;
        let mut values = BTreeMap::new();

        if !dir.as_os_str().is_empty() {
            if let Some(content) = read_optional(&dir.join("properties"))? {
                parse_ini(&content, &mut values);
            }

            if config_name != NONE_CONFIG_NAME {
                let path = dir
                    .join("configurations")
                    .join(format!("config_{}", config_name));
                match read_optional(&path)? {
                    Some(content) => parse_ini(&content, &mut values),
                    None => tracing::debug!("Configuration file {:?} does not exist", path),
                }
            }
        }

        for (var, value) in env {
            if let Some(key) = env_property_key(var) {
                values.insert(key, value.clone());
            }
        }

        tracing::debug!(
            "Loaded {} properties from configuration [{}]",
            values.len(),
            config_name
        );

        Ok(Self {
            config_name: Some(config_name),
            values,
        })
    }
}

/// Get the gcloud configuration directory
pub fn gcloud_config_dir(env: &BTreeMap<String, String>) -> Option<PathBuf> {
    if let Some(path) = env.get(ENV_CONFIG_DIR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    // Default to ~/.config/gcloud on Linux/macOS
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Configuration names must be a lowercase letter followed by
/// lowercase letters, digits and hyphens. `NONE` is reserved and valid.
pub fn is_valid_config_name(name: &str) -> bool {
    if name == NONE_CONFIG_NAME {
        return true;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate a GCP project ID format
///
/// Project IDs are 6-30 characters of lowercase letters, digits and hyphens,
/// start with a letter and do not end with a hyphen. Legacy domain-scoped
/// IDs (`example.com:my-project`) are accepted as well.
pub fn is_valid_project_id(project: &str) -> bool {
    let project = match project.split_once(':') {
        Some((domain, rest)) => {
            let domain_ok = !domain.is_empty()
                && domain
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
            if !domain_ok {
                return false;
            }
            rest
        }
        None => project,
    };

    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn active_config_name(
    dir: &Path,
    explicit: Option<&str>,
    env: &BTreeMap<String, String>,
) -> Result<String, ConfigError> {
    if let Some(name) = explicit {
        if !is_valid_config_name(name) {
            return Err(ConfigError::InvalidConfigName(name.to_string()));
        }
        return Ok(name.to_string());
    }

    let from_env = env.get(ENV_ACTIVE_CONFIG).map(|s| s.trim().to_string());
    let from_file = if from_env.is_none() && !dir.as_os_str().is_empty() {
        read_optional(&dir.join("active_config"))?.map(|s| s.trim().to_string())
    } else {
        None
    };

    match from_env.or(from_file).filter(|s| !s.is_empty()) {
        Some(name) if is_valid_config_name(&name) => Ok(name),
        Some(name) => {
            tracing::warn!(
                "Invalid configuration name [{}]. Using empty configuration.",
                name
            );
            Ok(NONE_CONFIG_NAME.to_string())
        }
        None => Ok(DEFAULT_CONFIG_NAME.to_string()),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse an INI properties file into `section/name` keys
fn parse_ini(content: &str, values: &mut BTreeMap<String, String>) {
    let mut section: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = Some(name.trim().to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!("Ignoring malformed configuration line: {}", line);
            continue;
        };
        let Some(section) = section.as_deref() else {
            tracing::warn!("Ignoring property outside of a section: {}", key.trim());
            continue;
        };
        values.insert(
            format!("{}/{}", section, key.trim()),
            value.trim().to_string(),
        );
    }
}

/// Map `CLOUDSDK_CORE_PROJECT` to `core/project`
fn env_property_key(var: &str) -> Option<String> {
    if var == ENV_CONFIG_DIR || var == ENV_ACTIVE_CONFIG {
        return None;
    }
    let rest = var.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();

    for section in MULTI_WORD_SECTIONS {
        if let Some(name) = rest
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|n| !n.is_empty())
        {
            return Some(format!("{}/{}", section, name));
        }
    }

    match rest.split_once('_') {
        Some((section, name)) if !section.is_empty() && !name.is_empty() => {
            Some(format!("{}/{}", section, name))
        }
        _ => None,
    }
}
