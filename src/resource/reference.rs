//! Resource references
//!
//! A [`Resource`] is the fully resolved output of the parser: every
//! parameter of the selected template has a non-empty value. References are
//! read-only; there is no way to build a partial one.

use super::collection::{CollectionInfo, CollectionKey};
use super::template::PathTemplate;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Resource {
    collection: Arc<CollectionInfo>,
    template: usize,
    params: BTreeMap<String, String>,
    endpoint: String,
}

impl Resource {
    /// Only the parser builds references, after resolving every parameter
    pub(crate) fn new(
        collection: Arc<CollectionInfo>,
        template: usize,
        params: BTreeMap<String, String>,
        endpoint: String,
    ) -> Self {
        debug_assert!(template < collection.templates().len());
        Self {
            collection,
            template,
            params,
            endpoint,
        }
    }

    /// Full collection name, e.g. `compute.instances`
    pub fn collection(&self) -> String {
        self.collection.full_name()
    }

    pub fn collection_info(&self) -> &CollectionInfo {
        &self.collection
    }

    pub fn key(&self) -> &CollectionKey {
        self.collection.key()
    }

    /// The template this reference was matched or built against
    pub fn template(&self) -> &PathTemplate {
        &self.collection.templates()[self.template]
    }

    /// Base URL used for the self link (the API base URL or its override)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Canonical path-only name, e.g. `projects/p/locations/l/things/t`
    pub fn relative_name(&self) -> String {
        self.template().expand(&self.params, false)
    }

    /// Relative name prefixed with the API base URL
    pub fn self_link(&self) -> String {
        format!("{}{}", self.endpoint, self.template().expand(&self.params, true))
    }

    /// Value of the last path parameter
    pub fn name(&self) -> &str {
        self.template()
            .last_param()
            .and_then(|p| self.get(p))
            .unwrap_or_default()
    }

    /// Value of any parameter
    pub fn get(&self, param: &str) -> Option<&str> {
        self.params.get(param).map(|v| v.as_str())
    }

    /// Parameters in path order
    pub fn params(&self) -> Vec<(&str, &str)> {
        self.template()
            .params()
            .into_iter()
            .filter_map(|p| self.params.get_key_value(p))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn param_map(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.collection.key() == other.collection.key() && self.params == other.params
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.collection.key().hash(state);
        self.params.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.self_link())
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Resource", 5)?;
        state.serialize_field("collection", &self.collection())?;
        state.serialize_field("api_version", self.collection.api_version())?;
        state.serialize_field("relative_name", &self.relative_name())?;
        state.serialize_field("self_link", &self.self_link())?;
        state.serialize_field("params", &self.params)?;
        state.end()
    }
}
