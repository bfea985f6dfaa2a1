//! Parameter resolution
//!
//! A parameter that the input string did not carry is looked up through an
//! ordered chain of [`Fallthrough`]s: a command-line flag, a property of the
//! active configuration, a static default. The first non-empty value wins.

use super::error::{ResourceError, Result};
use crate::config::{self, Properties, DEFAULT_SECTION};
use serde::{Deserialize, Serialize};

/// One source for a parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallthrough {
    /// A command-line flag and the value it was given, if any
    Arg {
        flag: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// A `section/name` property of the active configuration
    Property(String),
    /// A hard-coded value such as `global`
    Default(String),
}

impl Fallthrough {
    pub fn arg(flag: &str, value: Option<&str>) -> Self {
        Self::Arg {
            flag: flag.to_string(),
            value: value.map(String::from),
        }
    }

    pub fn property(key: &str) -> Self {
        Self::Property(config::normalize_key(key))
    }

    pub fn default_value(value: &str) -> Self {
        Self::Default(value.to_string())
    }

    /// The value this fallthrough provides, if any
    pub fn value(&self, properties: &Properties) -> Option<String> {
        let value = match self {
            Self::Arg { value, .. } => value.clone(),
            Self::Property(key) => {
                let value = properties.get(key)?;
                if config::normalize_key(key) == "core/project"
                    && !config::is_valid_project_id(value)
                {
                    tracing::warn!("Ignoring invalid project ID [{}] from [{}]", value, key);
                    return None;
                }
                Some(value.to_string())
            }
            Self::Default(value) => Some(value.clone()),
        };
        value.filter(|v| !v.is_empty())
    }

    /// How a user can supply the value through this fallthrough
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Arg { flag, .. } => {
                Some(format!("provide the flag [{}] on the command line", flag))
            }
            Self::Property(key) => {
                let (section, name) = key.split_once('/').unwrap_or((DEFAULT_SECTION, key));
                let config_key = if section == DEFAULT_SECTION {
                    name.to_string()
                } else {
                    key.clone()
                };
                Some(format!(
                    "set the property [{}] with `gcloud config set {} VALUE` or the \
                     environment variable [CLOUDSDK_{}_{}]",
                    key,
                    config_key,
                    section.to_ascii_uppercase(),
                    name.to_ascii_uppercase()
                ))
            }
            Self::Default(value) if value.is_empty() => None,
            Self::Default(value) => Some(format!("use the default [{}]", value)),
        }
    }

    /// True for fallthroughs specified on the command line
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Arg { .. })
    }
}

/// Resolve one parameter.
///
/// A non-empty `explicit` value always wins; otherwise each fallthrough is
/// tried in order. Fails with [`ResourceError::ParameterResolution`] naming
/// the parameter when nothing yields a value.
pub fn resolve(
    param: &str,
    explicit: Option<&str>,
    fallthroughs: &[Fallthrough],
    properties: &Properties,
) -> Result<String> {
    if let Some(value) = explicit.filter(|v| !v.is_empty()) {
        return Ok(value.to_string());
    }

    for fallthrough in fallthroughs {
        if let Some(value) = fallthrough.value(properties) {
            tracing::debug!("Resolved [{}] = [{}] via {:?}", param, value, fallthrough);
            return Ok(value);
        }
    }

    Err(ResourceError::ParameterResolution {
        param: param.to_string(),
        hints: fallthroughs.iter().filter_map(Fallthrough::hint).collect(),
    })
}
