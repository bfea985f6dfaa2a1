//! Collection Registry
//!
//! Holds every known collection with its path templates, the default
//! version of each API, and the fallthrough chains used to fill parameters
//! that a resource string does not carry.
//!
//! Built-in definitions are embedded JSON files (compiled into the binary);
//! more can be loaded from YAML or JSON files at startup. A registry is a
//! plain value: build it once per invocation and `clone()` it when a
//! command needs scoped registrations or a different API version.

use super::collection::{
    normalize_base_url, split_collection_name, CollectionInfo, CollectionKey,
};
use super::error::{ResourceError, Result};
use super::resolver::Fallthrough;
use super::template::PathTemplate;
use crate::config::Properties;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Embedded definition files (compiled into the binary)
const DEFINITION_FILES: &[&str] = &[
    include_str!("../resources/common.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/storage.json"),
    include_str!("../resources/gke.json"),
    include_str!("../resources/platform.json"),
];

/// Property section holding per-API base URL overrides
pub const ENDPOINT_OVERRIDES_SECTION: &str = "api_endpoint_overrides";

/// Collection definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionDef {
    /// Name without the API prefix, e.g. `projects.topics`
    pub name: String,
    /// Canonical path template
    pub path: String,
    /// Other accepted shapes, tried after `path` in this order
    #[serde(default)]
    pub alternate_paths: Vec<String>,
}

/// One version of one API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDef {
    pub name: String,
    pub version: String,
    pub base_url: String,
    /// Version used when a collection is named without one
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
}

/// Fallthrough chain for one parameter
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDefaultDef {
    pub api: String,
    /// Collection name without the API prefix; absent means every collection
    #[serde(default)]
    pub collection: Option<String>,
    pub param: String,
    pub fallthroughs: Vec<Fallthrough>,
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefinitionFile {
    #[serde(default)]
    pub apis: Vec<ApiDef>,
    #[serde(default)]
    pub param_defaults: Vec<ParamDefaultDef>,
}

#[derive(Debug, Clone, Default)]
struct ApiVersions {
    versions: BTreeSet<String>,
    default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ParamDefaultKey {
    api: String,
    collection: Option<String>,
    param: String,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    collections: Vec<Arc<CollectionInfo>>,
    index: HashMap<CollectionKey, usize>,
    apis: BTreeMap<String, ApiVersions>,
    param_defaults: HashMap<ParamDefaultKey, Vec<Fallthrough>>,
    /// Chains tried before any registered default, for every API
    overrides: HashMap<String, Vec<Fallthrough>>,
    properties: Arc<Properties>,
}

impl Registry {
    /// Empty registry reading defaults from `properties`
    pub fn new(properties: Properties) -> Self {
        Self {
            properties: Arc::new(properties),
            ..Self::default()
        }
    }

    /// Registry with every embedded definition loaded
    pub fn builtin(properties: Properties) -> Result<Self> {
        let mut registry = Self::new(properties);
        for content in DEFINITION_FILES {
            let file: DefinitionFile = serde_json::from_str(content).map_err(|e| {
                ResourceError::invalid_definition(format!("embedded definitions: {}", e))
            })?;
            registry.load_definitions(&file)?;
        }
        tracing::debug!(
            "Loaded {} built-in collections across {} APIs",
            registry.collections.len(),
            registry.apis.len()
        );
        Ok(registry)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Replace the configuration used for fallthroughs and endpoint overrides
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    /// Register one collection.
    ///
    /// Registering the same templates twice is a no-op; different templates
    /// under the same `(api, version, name)` fail with `DuplicateCollection`.
    pub fn register(
        &mut self,
        api: &str,
        version: &str,
        name: &str,
        base_url: &str,
        templates: &[&str],
    ) -> Result<Arc<CollectionInfo>> {
        let key = CollectionKey::new(api, version, name);
        let parsed = templates
            .iter()
            .map(|t| PathTemplate::parse(t))
            .collect::<Result<Vec<_>>>()?;

        if let Some(&idx) = self.index.get(&key) {
            let existing = &self.collections[idx];
            if existing.same_templates(&parsed) {
                return Ok(Arc::clone(existing));
            }
            return Err(ResourceError::DuplicateCollection {
                collection: key.full_name(),
                existing: existing.template_strings(),
            });
        }

        for other in self
            .collections
            .iter()
            .filter(|c| c.api_name() == api && c.api_version() == version)
        {
            if let Some(t) = parsed.iter().find(|t| other.templates().contains(*t)) {
                return Err(ResourceError::AmbiguousPath {
                    collection: key.full_name(),
                    existing: other.full_name(),
                    path: t.as_str().to_string(),
                });
            }
        }

        let info = Arc::new(CollectionInfo::new(key.clone(), base_url, parsed)?);
        tracing::debug!(
            "Registered {} at {}{}",
            key,
            info.base_url(),
            info.canonical()
        );

        self.index.insert(key, self.collections.len());
        self.collections.push(Arc::clone(&info));
        self.apis
            .entry(api.to_string())
            .or_default()
            .versions
            .insert(version.to_string());

        Ok(info)
    }

    /// Register every collection of one API version
    pub fn register_api(&mut self, def: &ApiDef) -> Result<()> {
        for collection in &def.collections {
            let templates: Vec<&str> = std::iter::once(collection.path.as_str())
                .chain(collection.alternate_paths.iter().map(|p| p.as_str()))
                .collect();
            self.register(
                &def.name,
                &def.version,
                &collection.name,
                &def.base_url,
                &templates,
            )?;
        }

        let entry = self.apis.entry(def.name.clone()).or_default();
        entry.versions.insert(def.version.clone());
        if def.default {
            entry.default = Some(def.version.clone());
        }
        Ok(())
    }

    /// Apply a parsed definition file
    pub fn load_definitions(&mut self, file: &DefinitionFile) -> Result<()> {
        for api in &file.apis {
            self.register_api(api)?;
        }
        for default in &file.param_defaults {
            self.set_param_default(
                &default.api,
                default.collection.as_deref(),
                &default.param,
                default.fallthroughs.clone(),
            );
        }
        Ok(())
    }

    /// Load definitions from a YAML or JSON file
    pub fn load_definitions_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResourceError::invalid_definition(format!("failed to read {:?}: {}", path, e))
        })?;
        // YAML is a superset of JSON, one parser covers both
        let file: DefinitionFile = serde_yaml::from_str(&content).map_err(|e| {
            ResourceError::invalid_definition(format!("failed to parse {:?}: {}", path, e))
        })?;
        tracing::info!("Loading resource definitions from {:?}", path);
        self.load_definitions(&file)
    }

    /// Look up a collection by its full identity
    pub fn get_collection(
        &self,
        api: &str,
        version: &str,
        name: &str,
    ) -> Result<Arc<CollectionInfo>> {
        self.index
            .get(&CollectionKey::new(api, version, name))
            .map(|&idx| Arc::clone(&self.collections[idx]))
            .ok_or_else(|| {
                ResourceError::UnregisteredCollection(format!("{}.{} ({})", api, name, version))
            })
    }

    /// Look up `api.name` in the API's default version
    pub fn lookup(&self, collection: &str) -> Result<Arc<CollectionInfo>> {
        let (api, name) = split_collection_name(collection)?;
        let version = self
            .default_version(api)
            .ok_or_else(|| ResourceError::UnregisteredCollection(collection.to_string()))?;
        self.get_collection(api, version, name)
            .map_err(|_| ResourceError::UnregisteredCollection(collection.to_string()))
    }

    /// Version used for `api`: the marked default, else the only one
    pub fn default_version(&self, api: &str) -> Option<&str> {
        let entry = self.apis.get(api)?;
        if let Some(version) = entry.default.as_deref() {
            return Some(version);
        }
        match entry.versions.len() {
            1 => entry.versions.iter().next().map(|v| v.as_str()),
            _ => None,
        }
    }

    pub fn set_default_version(&mut self, api: &str, version: &str) -> Result<()> {
        let entry = self
            .apis
            .get_mut(api)
            .filter(|e| e.versions.contains(version))
            .ok_or_else(|| ResourceError::UnregisteredCollection(format!("{} ({})", api, version)))?;
        entry.default = Some(version.to_string());
        Ok(())
    }

    /// Clone the registry and switch one API to another registered version
    pub fn clone_with_api_version(&self, api: &str, version: &str) -> Result<Self> {
        let mut registry = self.clone();
        registry.set_default_version(api, version)?;
        Ok(registry)
    }

    /// Registered API names with their versions
    pub fn apis(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.apis
            .iter()
            .map(|(name, e)| (name.as_str(), e.versions.iter().map(|v| v.as_str()).collect()))
    }

    /// All collections in registration order
    pub fn collections(&self) -> impl Iterator<Item = &Arc<CollectionInfo>> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Set the fallthrough chain of `param` for one collection of `api`, or
    /// for every collection when `collection` is `None`.
    pub fn set_param_default(
        &mut self,
        api: &str,
        collection: Option<&str>,
        param: &str,
        fallthroughs: Vec<Fallthrough>,
    ) {
        self.param_defaults.insert(
            ParamDefaultKey {
                api: api.to_string(),
                collection: collection.map(String::from),
                param: param.to_string(),
            },
            fallthroughs,
        );
    }

    /// Registered chain for `param`; a collection-specific chain wins
    pub fn param_default(&self, api: &str, collection: &str, param: &str) -> &[Fallthrough] {
        let mut key = ParamDefaultKey {
            api: api.to_string(),
            collection: Some(collection.to_string()),
            param: param.to_string(),
        };
        if let Some(chain) = self.param_defaults.get(&key) {
            return chain;
        }
        key.collection = None;
        self.param_defaults
            .get(&key)
            .map(|c| c.as_slice())
            .unwrap_or_default()
    }

    /// Put `fallthrough` in front of every chain for `param`, in every API.
    ///
    /// Used for command-line flags such as `--project`, which must win over
    /// configuration properties.
    pub fn prepend_fallthrough(&mut self, param: &str, fallthrough: Fallthrough) {
        self.overrides
            .entry(param.to_string())
            .or_default()
            .insert(0, fallthrough);
    }

    /// Complete chain tried for `param` of `info`
    pub fn fallthroughs(&self, info: &CollectionInfo, param: &str) -> Vec<Fallthrough> {
        let mut chain = self.overrides.get(param).cloned().unwrap_or_default();
        chain.extend_from_slice(self.param_default(info.api_name(), info.name(), param));
        chain
    }

    /// Base URL for self links: the endpoint override property, else the
    /// registered base URL.
    pub fn endpoint(&self, info: &CollectionInfo) -> String {
        let key = format!("{}/{}", ENDPOINT_OVERRIDES_SECTION, info.api_name());
        match self.properties.get(&key) {
            Some(url) => normalize_base_url(url),
            None => info.base_url().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THINGS: &str = "projects/{projectsId}/locations/{locationsId}/things/{thingsId}";

    fn registry() -> Registry {
        let mut r = Registry::new(Properties::empty());
        r.register(
            "myapi",
            "v1",
            "projects.locations.things",
            "https://myapi.googleapis.com/v1/",
            &[THINGS],
        )
        .unwrap();
        r
    }

    #[test]
    fn test_builtin_registry_loads_successfully() {
        let registry = Registry::builtin(Properties::empty()).unwrap();
        assert!(!registry.is_empty(), "Registry should have collections");
        assert!(registry.lookup("compute.instances").is_ok());
        assert!(registry.lookup("storage.objects").is_ok());
        assert!(registry.lookup("pubsub.projects.topics").is_ok());
    }

    #[test]
    fn test_builtin_compute_defaults_to_v1() {
        let registry = Registry::builtin(Properties::empty()).unwrap();
        let info = registry.lookup("compute.instances").unwrap();
        assert_eq!(info.api_version(), "v1");
        assert_eq!(
            info.params(),
            vec!["project", "zone", "instance"],
            "Compute instances should be zonal"
        );
        assert_eq!(
            registry.param_default("compute", "instances", "project"),
            &[Fallthrough::Property("core/project".to_string())]
        );
    }

    #[test]
    fn test_get_collection() {
        let r = registry();
        let info = r
            .get_collection("myapi", "v1", "projects.locations.things")
            .unwrap();
        assert_eq!(info.canonical().as_str(), THINGS);
        assert!(matches!(
            r.get_collection("myapi", "v2", "projects.locations.things"),
            Err(ResourceError::UnregisteredCollection(_))
        ));
        assert!(matches!(
            r.lookup("otherapi.things"),
            Err(ResourceError::UnregisteredCollection(_))
        ));
    }

    #[test]
    fn test_register_same_templates_is_noop() {
        let mut r = registry();
        r.register(
            "myapi",
            "v1",
            "projects.locations.things",
            "https://myapi.googleapis.com/v1/",
            &[THINGS],
        )
        .unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_register_conflicting_templates_fails() {
        let mut r = registry();
        let err = r
            .register(
                "myapi",
                "v1",
                "projects.locations.things",
                "https://myapi.googleapis.com/v1/",
                &["things/{thingsId}"],
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::DuplicateCollection { .. }));
    }

    #[test]
    fn test_register_same_path_twice_is_ambiguous() {
        let mut r = registry();
        let err = r
            .register(
                "myapi",
                "v1",
                "things",
                "https://myapi.googleapis.com/v1/",
                &[THINGS],
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::AmbiguousPath { .. }));

        // Same path in another version is fine
        r.register(
            "myapi",
            "v2",
            "projects.locations.things",
            "https://myapi.googleapis.com/v2/",
            &[THINGS],
        )
        .unwrap();
    }

    #[test]
    fn test_clone_is_independent() {
        let base = registry();
        let mut scoped = base.clone();
        scoped
            .register(
                "myapi",
                "v1",
                "projects.widgets",
                "https://myapi.googleapis.com/v1/",
                &["projects/{projectsId}/widgets/{widgetsId}"],
            )
            .unwrap();

        assert!(scoped.lookup("myapi.projects.widgets").is_ok());
        assert!(base.lookup("myapi.projects.widgets").is_err());
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn test_default_version_resolution() {
        let mut r = registry();
        assert_eq!(r.default_version("myapi"), Some("v1"));

        r.register(
            "myapi",
            "v2",
            "projects.locations.things",
            "https://myapi.googleapis.com/v2/",
            &[THINGS],
        )
        .unwrap();
        assert_eq!(r.default_version("myapi"), None);
        assert!(r.lookup("myapi.projects.locations.things").is_err());

        let switched = r.clone_with_api_version("myapi", "v2").unwrap();
        assert_eq!(
            switched
                .lookup("myapi.projects.locations.things")
                .unwrap()
                .api_version(),
            "v2"
        );
        assert!(r.clone_with_api_version("myapi", "v3").is_err());
    }

    #[test]
    fn test_param_default_precedence() {
        let mut r = registry();
        r.set_param_default("myapi", None, "locationsId", vec![Fallthrough::default_value("global")]);
        r.set_param_default(
            "myapi",
            Some("projects.locations.things"),
            "locationsId",
            vec![Fallthrough::property("core/location")],
        );
        assert_eq!(
            r.param_default("myapi", "projects.locations.things", "locationsId"),
            &[Fallthrough::Property("core/location".to_string())]
        );
        assert_eq!(
            r.param_default("myapi", "projects.widgets", "locationsId"),
            &[Fallthrough::Default("global".to_string())]
        );
        assert!(r.param_default("myapi", "projects.widgets", "thingsId").is_empty());
    }

    #[test]
    fn test_prepend_fallthrough_goes_first() {
        let mut r = registry();
        r.set_param_default("myapi", None, "projectsId", vec![Fallthrough::property("project")]);
        r.prepend_fallthrough("projectsId", Fallthrough::arg("--project", Some("flag-proj")));
        let info = r.lookup("myapi.projects.locations.things").unwrap();
        let chain = r.fallthroughs(&info, "projectsId");
        assert_eq!(chain.len(), 2);
        assert!(chain[0].is_active());
    }

    #[test]
    fn test_endpoint_override() {
        let r = registry().with_properties(Properties::from_pairs([(
            "api_endpoint_overrides/myapi",
            "http://localhost:8080/v1",
        )]));
        let info = r.lookup("myapi.projects.locations.things").unwrap();
        assert_eq!(r.endpoint(&info), "http://localhost:8080/v1/");
    }

    #[test]
    fn test_load_definitions_file_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defs.yaml");
        std::fs::write(
            &path,
            r#"
apis:
  - name: widgets
    version: v1alpha
    base_url: https://widgets.googleapis.com/v1alpha/
    collections:
      - name: projects.widgets
        path: projects/{projectsId}/widgets/{widgetsId}
param_defaults:
  - api: widgets
    param: projectsId
    fallthroughs:
      - property: core/project
"#,
        )
        .unwrap();

        let mut r = Registry::new(Properties::empty());
        r.load_definitions_file(&path).unwrap();
        let info = r.lookup("widgets.projects.widgets").unwrap();
        assert_eq!(info.api_version(), "v1alpha");
        assert_eq!(r.fallthroughs(&info, "projectsId").len(), 1);

        assert!(r.load_definitions_file(&dir.path().join("missing.yaml")).is_err());
    }
}
