//! Collections
//!
//! A collection is one resource type of one API version: `compute.instances`
//! in `compute/v1`, `pubsub.projects.topics` in `pubsub/v1`, and so on.

use super::error::{ResourceError, Result};
use super::template::PathTemplate;
use std::fmt;

/// Identity of a collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    pub api: String,
    pub version: String,
    pub name: String,
}

impl CollectionKey {
    pub fn new(api: &str, version: &str, name: &str) -> Self {
        Self {
            api: api.to_string(),
            version: version.to_string(),
            name: name.to_string(),
        }
    }

    /// `api.name`, the form used on the command line
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.api, self.name)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.api, self.name, self.version)
    }
}

/// Split `compute.instances` into `("compute", "instances")`
pub fn split_collection_name(collection: &str) -> Result<(&str, &str)> {
    match collection.split_once('.') {
        Some((api, name)) if !api.is_empty() && !name.is_empty() => Ok((api, name)),
        _ => Err(ResourceError::UnregisteredCollection(collection.to_string())),
    }
}

/// Normalize a base URL so that it always ends with a single `/`
pub fn normalize_base_url(base_url: &str) -> String {
    format!("{}/", base_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    key: CollectionKey,
    base_url: String,
    templates: Vec<PathTemplate>,
}

impl CollectionInfo {
    pub fn new(key: CollectionKey, base_url: &str, templates: Vec<PathTemplate>) -> Result<Self> {
        if templates.is_empty() {
            return Err(ResourceError::invalid_definition(format!(
                "collection [{}] has no path template",
                key.full_name()
            )));
        }
        if let Some(t) = templates.iter().find(|t| t.params().is_empty()) {
            return Err(ResourceError::invalid_definition(format!(
                "template [{}] of collection [{}] has no parameters",
                t,
                key.full_name()
            )));
        }
        let parsed = url::Url::parse(base_url).map_err(|e| {
            ResourceError::invalid_definition(format!("bad base url [{}]: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResourceError::invalid_definition(format!(
                "base url [{}] must be http or https",
                base_url
            )));
        }

        Ok(Self {
            key,
            base_url: normalize_base_url(base_url),
            templates,
        })
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn api_name(&self) -> &str {
        &self.key.api
    }

    pub fn api_version(&self) -> &str {
        &self.key.version
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn full_name(&self) -> String {
        self.key.full_name()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Templates in registration order
    pub fn templates(&self) -> &[PathTemplate] {
        &self.templates
    }

    /// The first registered template, used for rendering and bare IDs
    pub fn canonical(&self) -> &PathTemplate {
        &self.templates[0]
    }

    pub fn params(&self) -> Vec<&str> {
        self.canonical().params()
    }

    pub fn same_templates(&self, templates: &[PathTemplate]) -> bool {
        self.templates == templates
    }

    pub fn template_strings(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.as_str().to_string()).collect()
    }
}
