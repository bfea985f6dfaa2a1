//! Resource Parser
//!
//! Turns what a user typed into a [`Resource`]. Accepted spellings, for a
//! collection with template `projects/{project}/zones/{zone}/instances/{instance}`:
//!
//! - a full URL: `https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/i`
//! - a relative name: `projects/p/zones/z/instances/i`
//! - a bare ID: `i` (the other parameters come from fallthroughs)
//! - a collection path: `/p/z/i` (every parameter) or `z/i` (all but the first)
//! - an optional `compute.instances::` prefix on any non-URL form
//! - nothing at all, in which case every parameter must resolve
//!
//! Cloud Storage additionally accepts `gs://bucket/object`.
//!
//! Values carried by the input win over explicit `params`, which win over
//! the registered fallthrough chain.

use super::collection::CollectionInfo;
use super::error::{ResourceError, Result};
use super::reference::Resource;
use super::registry::Registry;
use super::resolver;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Explicit parameter values, keyed by parameter name
pub type Params = BTreeMap<String, String>;

const GCS_SCHEME: &str = "gs://";
const GCS_HOST: &str = "storage.googleapis.com";
const STORAGE_BUCKETS: &str = "storage.buckets";
const STORAGE_OBJECTS: &str = "storage.objects";

fn is_url(line: &str) -> bool {
    line.starts_with("https://") || line.starts_with("http://")
}

/// Path of `url` below `base`, if `url` lives under it
fn strip_base<'a>(url: &'a Url, base: &str) -> Option<&'a str> {
    let base = Url::parse(base).ok()?;
    if url.scheme() != base.scheme()
        || url.host_str() != base.host_str()
        || url.port_or_known_default() != base.port_or_known_default()
    {
        return None;
    }
    url.path().strip_prefix(base.path())
}

fn decode_tokens(path: &str) -> Option<Vec<String>> {
    path.trim_end_matches('/')
        .split('/')
        .map(|t| urlencoding::decode(t).ok().map(|d| d.into_owned()))
        .collect()
}

/// Split an optional `api.collection::` prefix off a collection path
fn split_collection_prefix(line: &str) -> (Option<&str>, &str) {
    match line.split_once("::") {
        Some((prefix, path)) if prefix.contains('.') && !prefix.contains('/') => {
            (Some(prefix), path)
        }
        _ => (None, line),
    }
}

/// Accepted spellings, used in `InvalidResource` errors
fn expected_formats(info: &CollectionInfo) -> Vec<String> {
    let mut formats: Vec<String> = info.templates().iter().map(|t| t.format_hint()).collect();
    let params: Vec<String> = info.params().iter().map(|p| p.to_uppercase()).collect();
    if let Some(last) = params.last() {
        formats.push(last.clone());
    }
    if params.len() > 2 {
        formats.push(params[1..].join("/"));
    }
    formats.push(format!("/{}", params.join("/")));
    formats.dedup();
    formats
}

impl Registry {
    /// Parse `line` as a resource of `collection` (`api.name`).
    ///
    /// An empty `line` resolves every parameter from `params` and the
    /// fallthrough chains.
    pub fn parse(&self, line: &str, collection: &str, params: &Params) -> Result<Resource> {
        let line = line.trim();
        tracing::debug!("Parsing [{}] as {}", line, collection);

        if is_url(line) {
            return self.parse_url_as(line, collection, params);
        }
        if line.starts_with(GCS_SCHEME) {
            let resource = self.parse_storage_url(line)?;
            return self.check_collection(resource, collection, line);
        }

        let info = self.lookup(collection)?;
        let (prefix, path) = split_collection_prefix(line);
        if let Some(prefix) = prefix {
            if prefix != info.full_name() {
                return Err(ResourceError::WrongCollection {
                    expected: info.full_name(),
                    got: prefix.to_string(),
                    path: line.to_string(),
                });
            }
        }

        if path.is_empty() {
            let template = Self::template_for_params(&info, params);
            return self.build(info, template, BTreeMap::new(), params, None);
        }

        let (template, values) = Self::match_collection_path(&info, path)?;
        self.build(info, template, values, params, None)
    }

    /// Parse `line` when the caller does not know its collection.
    ///
    /// The collection must come from the input itself: a full URL, a
    /// `gs://` path or an `api.collection::` prefix. Anything else fails
    /// with `UnknownCollection`.
    pub fn parse_any(&self, line: &str, params: &Params) -> Result<Resource> {
        let line = line.trim();
        if is_url(line) {
            return self.parse_url(line);
        }
        if line.starts_with(GCS_SCHEME) {
            return self.parse_storage_url(line);
        }
        match split_collection_prefix(line) {
            (Some(collection), _) => self.parse(line, collection, params),
            (None, _) => Err(ResourceError::UnknownCollection(line.to_string())),
        }
    }

    /// Build a resource from parameters alone
    pub fn create(&self, collection: &str, params: &Params) -> Result<Resource> {
        self.parse("", collection, params)
    }

    /// Self link of a possibly incomplete reference: parameters that
    /// neither `params` nor the fallthroughs provide render as `*`.
    pub fn weak_self_link(&self, collection: &str, params: &Params) -> Result<String> {
        let info = self.lookup(collection)?;
        let template = &info.templates()[Self::template_for_params(&info, params)];

        let mut values = BTreeMap::new();
        for param in template.params() {
            let chain = self.fallthroughs(&info, param);
            let explicit = params.get(param).map(|v| v.as_str());
            if let Ok(value) = resolver::resolve(param, explicit, &chain, self.properties()) {
                values.insert(param.to_string(), value);
            }
        }

        Ok(format!(
            "{}{}",
            self.endpoint(&info),
            template.expand(&values, true)
        ))
    }

    /// Parse a full URL into whichever registered collection it belongs to
    pub fn parse_url(&self, line: &str) -> Result<Resource> {
        let url = Url::parse(line).map_err(|_| ResourceError::invalid_resource(line))?;

        for info in self.collections() {
            if let Some(resource) = self.match_url(&url, info, &Params::new())? {
                return Ok(resource);
            }
        }

        // https://storage.googleapis.com/bucket/object
        if url.scheme() == "https"
            && url.host_str() == Some(GCS_HOST)
            && self.lookup(STORAGE_BUCKETS).is_ok()
        {
            if let Some(tokens) = decode_tokens(url.path().trim_start_matches('/')) {
                let path = tokens.join("/");
                if !path.is_empty() {
                    return self.parse_storage_path(&path);
                }
            }
        }

        Err(ResourceError::invalid_resource(line))
    }

    /// Parse `gs://bucket` or `gs://bucket/object`
    pub fn parse_storage_url(&self, line: &str) -> Result<Resource> {
        let path = line
            .strip_prefix(GCS_SCHEME)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ResourceError::invalid_resource(line))?;
        self.parse_storage_path(path)
    }

    fn parse_storage_path(&self, path: &str) -> Result<Resource> {
        let (bucket, object) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(ResourceError::invalid_resource(path));
        }

        let mut params = Params::new();
        params.insert("bucket".to_string(), bucket.to_string());
        if object.is_empty() {
            self.create(STORAGE_BUCKETS, &params)
        } else {
            params.insert("object".to_string(), object.to_string());
            self.create(STORAGE_OBJECTS, &params)
        }
    }

    fn parse_url_as(&self, line: &str, collection: &str, params: &Params) -> Result<Resource> {
        let info = self.lookup(collection)?;
        let url = Url::parse(line).map_err(|_| ResourceError::InvalidResource {
            input: line.to_string(),
            expected: expected_formats(&info),
        })?;

        if let Some(resource) = self.match_url(&url, &info, params)? {
            return Ok(resource);
        }

        match self.parse_url(line) {
            Ok(resource) => self.check_collection(resource, collection, line),
            Err(ResourceError::InvalidResource { .. }) => Err(ResourceError::InvalidResource {
                input: line.to_string(),
                expected: info
                    .templates()
                    .iter()
                    .map(|t| format!("{}{}", self.endpoint(&info), t.format_hint()))
                    .collect(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Versions may differ; only the collection name has to agree
    fn check_collection(&self, resource: Resource, collection: &str, line: &str) -> Result<Resource> {
        if resource.collection() == collection {
            Ok(resource)
        } else {
            Err(ResourceError::WrongCollection {
                expected: collection.to_string(),
                got: resource.collection(),
                path: line.to_string(),
            })
        }
    }

    /// Try `url` against the endpoint override and base URL of `info`
    fn match_url(
        &self,
        url: &Url,
        info: &Arc<CollectionInfo>,
        params: &Params,
    ) -> Result<Option<Resource>> {
        let endpoint = self.endpoint(info);
        let mut bases = vec![endpoint];
        if bases[0] != info.base_url() {
            bases.push(info.base_url().to_string());
        }

        for base in bases {
            let Some(path) = strip_base(url, &base) else {
                continue;
            };
            let Some(tokens) = decode_tokens(path) else {
                continue;
            };
            for (idx, template) in info.templates().iter().enumerate() {
                if let Some(values) = template.match_tokens(&tokens) {
                    tracing::debug!("URL matched {} template [{}]", info.key(), template);
                    return self
                        .build(Arc::clone(info), idx, values, params, Some(base))
                        .map(Some);
                }
            }
        }
        Ok(None)
    }

    /// First template whose parameters are all given explicitly, else the
    /// canonical one.
    fn template_for_params(info: &CollectionInfo, params: &Params) -> usize {
        info.templates()
            .iter()
            .position(|t| {
                t.params()
                    .iter()
                    .all(|p| params.get(*p).is_some_and(|v| !v.is_empty()))
            })
            .unwrap_or(0)
    }

    /// Match a relative name or collection path against `info`
    fn match_collection_path(
        info: &CollectionInfo,
        path: &str,
    ) -> Result<(usize, BTreeMap<String, String>)> {
        let invalid = || ResourceError::InvalidResource {
            input: path.to_string(),
            expected: expected_formats(info),
        };

        let fully_specified = path.starts_with('/');
        let body = path.strip_prefix('/').unwrap_or(path);
        let tokens: Vec<String> = body.split('/').map(String::from).collect();

        if !fully_specified && tokens.len() > 1 {
            for (idx, template) in info.templates().iter().enumerate() {
                if let Some(values) = template.match_tokens(&tokens) {
                    return Ok((idx, values));
                }
            }
        }

        if tokens.iter().any(|t| t.is_empty()) {
            return Err(invalid());
        }

        let template = info.canonical();
        let params = template.params();
        let count = params.len();
        let multi = params
            .last()
            .is_some_and(|last| template.is_multi_segment(last));

        // Index of the first parameter the tokens fill
        let first = if fully_specified {
            match tokens.len() {
                n if n == count => 0,
                n if multi && n > count => 0,
                _ => return Err(invalid()),
            }
        } else {
            match tokens.len() {
                1 => count - 1,
                n if multi && n >= count => 0,
                n if count > 2 && n == count - 1 => 1,
                _ => return Err(invalid()),
            }
        };

        let mut values = BTreeMap::new();
        let slots = &params[first..];
        for (i, param) in slots.iter().enumerate() {
            let value = if i == slots.len() - 1 {
                tokens[i..].join("/")
            } else {
                tokens[i].clone()
            };
            values.insert(param.to_string(), value);
        }
        Ok((0, values))
    }

    /// Resolve every missing parameter and validate the result
    fn build(
        &self,
        info: Arc<CollectionInfo>,
        template: usize,
        mut values: BTreeMap<String, String>,
        params: &Params,
        endpoint: Option<String>,
    ) -> Result<Resource> {
        let path = &info.templates()[template];

        for param in path.params() {
            if values.get(param).is_some_and(|v| !v.is_empty()) {
                continue;
            }
            let chain = self.fallthroughs(&info, param);
            let value = resolver::resolve(
                param,
                params.get(param).map(|v| v.as_str()),
                &chain,
                self.properties(),
            )?;
            values.insert(param.to_string(), value);
        }

        for (param, value) in &values {
            let reason = if value.contains('/') && !path.is_multi_segment(param) {
                "value may not contain '/'"
            } else if value == "." || value == ".." {
                "value may not be a relative path segment"
            } else {
                continue;
            };
            return Err(ResourceError::InvalidParamValue {
                param: param.clone(),
                value: value.clone(),
                reason: reason.to_string(),
            });
        }

        let endpoint = endpoint.unwrap_or_else(|| self.endpoint(&info));
        Ok(Resource::new(info, template, values, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Properties;
    use crate::resource::resolver::Fallthrough;

    const THINGS: &str = "projects/{projectsId}/locations/{locationsId}/things/{thingsId}";

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn registry(props: Properties) -> Registry {
        let mut r = Registry::new(props);
        r.register(
            "myapi",
            "v1",
            "projects.locations.things",
            "https://myapi.googleapis.com/v1/",
            &[THINGS],
        )
        .unwrap();
        r.set_param_default("myapi", None, "projectsId", vec![Fallthrough::property("core/project")]);
        r.set_param_default(
            "myapi",
            None,
            "locationsId",
            vec![Fallthrough::property("core/location")],
        );
        r
    }

    #[test]
    fn test_bare_id_with_explicit_and_property() {
        let r = registry(Properties::from_pairs([("core/location", "us-central1")]));
        let res = r
            .parse(
                "my-thing",
                "myapi.projects.locations.things",
                &params(&[("projectsId", "proj1")]),
            )
            .unwrap();
        assert_eq!(res.get("projectsId"), Some("proj1"));
        assert_eq!(res.get("locationsId"), Some("us-central1"));
        assert_eq!(res.name(), "my-thing");
        assert_eq!(
            res.relative_name(),
            "projects/proj1/locations/us-central1/things/my-thing"
        );
    }

    #[test]
    fn test_self_link_parses_to_same_reference() {
        let r = registry(Properties::from_pairs([("core/location", "us-central1")]));
        let short = r
            .parse(
                "my-thing",
                "myapi.projects.locations.things",
                &params(&[("projectsId", "proj1")]),
            )
            .unwrap();
        let full = r
            .parse(
                "https://myapi.googleapis.com/v1/projects/proj1/locations/us-central1/things/my-thing",
                "myapi.projects.locations.things",
                &Params::new(),
            )
            .unwrap();
        assert_eq!(short, full);
    }

    #[test]
    fn test_empty_input_without_fallthrough_names_last_param() {
        let r = registry(Properties::from_pairs([
            ("core/project", "proj-one"),
            ("core/location", "us-central1"),
        ]));
        let err = r
            .parse("", "myapi.projects.locations.things", &Params::new())
            .unwrap_err();
        assert_eq!(err.missing_param(), Some("thingsId"));
    }

    #[test]
    fn test_create() {
        let r = registry(Properties::empty());
        let res = r
            .create(
                "myapi.projects.locations.things",
                &params(&[
                    ("projectsId", "p"),
                    ("locationsId", "l"),
                    ("thingsId", "t"),
                ]),
            )
            .unwrap();
        assert_eq!(res.relative_name(), "projects/p/locations/l/things/t");

        let err = r
            .create(
                "myapi.projects.locations.things",
                &params(&[("projectsId", "p"), ("thingsId", "t")]),
            )
            .unwrap_err();
        assert_eq!(err.missing_param(), Some("locationsId"));
    }

    #[test]
    fn test_input_values_win_over_params() {
        let r = registry(Properties::empty());
        let res = r
            .parse(
                "projects/a/locations/b/things/c",
                "myapi.projects.locations.things",
                &params(&[("projectsId", "other")]),
            )
            .unwrap();
        assert_eq!(res.get("projectsId"), Some("a"));
    }

    #[test]
    fn test_collection_path_forms() {
        let r = registry(Properties::from_pairs([("core/project", "proj-one")]));
        let c = "myapi.projects.locations.things";

        let full = r.parse("/p/l/t", c, &Params::new()).unwrap();
        assert_eq!(full.relative_name(), "projects/p/locations/l/things/t");

        let partial = r.parse("l/t", c, &Params::new()).unwrap();
        assert_eq!(
            partial.relative_name(),
            "projects/proj-one/locations/l/things/t"
        );

        let prefixed = r.parse("myapi.projects.locations.things::/p/l/t", c, &Params::new()).unwrap();
        assert_eq!(prefixed, full);

        assert!(matches!(
            r.parse("otherapi.things::/p/l/t", c, &Params::new()),
            Err(ResourceError::WrongCollection { .. })
        ));
    }

    #[test]
    fn test_invalid_shapes() {
        let r = registry(Properties::from_pairs([("core/project", "proj-one")]));
        let c = "myapi.projects.locations.things";
        for bad in ["/p/t", "a/b/c/d", "x//y", "projects/p/zones/z/things/t/extra"] {
            assert!(
                matches!(
                    r.parse(bad, c, &Params::new()),
                    Err(ResourceError::InvalidResource { .. })
                ),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_url_with_unknown_host_is_invalid() {
        let r = registry(Properties::empty());
        let err = r
            .parse(
                "https://example.com/v1/projects/p/locations/l/things/t",
                "myapi.projects.locations.things",
                &Params::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidResource { .. }));
    }

    #[test]
    fn test_url_of_other_collection_is_wrong_collection() {
        let mut r = registry(Properties::empty());
        r.register(
            "myapi",
            "v1",
            "projects.widgets",
            "https://myapi.googleapis.com/v1/",
            &["projects/{projectsId}/widgets/{widgetsId}"],
        )
        .unwrap();
        let err = r
            .parse(
                "https://myapi.googleapis.com/v1/projects/p/widgets/w",
                "myapi.projects.locations.things",
                &Params::new(),
            )
            .unwrap_err();
        match err {
            ResourceError::WrongCollection { expected, got, .. } => {
                assert_eq!(expected, "myapi.projects.locations.things");
                assert_eq!(got, "myapi.projects.widgets");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_url_values_are_decoded() {
        let r = registry(Properties::empty());
        let res = r
            .parse(
                "https://myapi.googleapis.com/v1/projects/p/locations/l/things/a%20b",
                "myapi.projects.locations.things",
                &Params::new(),
            )
            .unwrap();
        assert_eq!(res.name(), "a b");
        assert!(res.self_link().ends_with("/things/a%20b"));
    }

    #[test]
    fn test_parse_any_infers_collection() {
        let r = registry(Properties::from_pairs([("core/project", "proj-one")]));

        let from_url = r
            .parse_any(
                "https://myapi.googleapis.com/v1/projects/p/locations/l/things/t",
                &Params::new(),
            )
            .unwrap();
        assert_eq!(from_url.collection(), "myapi.projects.locations.things");

        let from_prefix = r
            .parse_any("myapi.projects.locations.things::l/t", &Params::new())
            .unwrap();
        assert_eq!(
            from_prefix.relative_name(),
            "projects/proj-one/locations/l/things/t"
        );

        let err = r.parse_any("l/t", &Params::new()).unwrap_err();
        assert!(matches!(err, ResourceError::UnknownCollection(_)));

        let err = r.parse_any("nope.things::t", &Params::new()).unwrap_err();
        assert!(matches!(err, ResourceError::UnregisteredCollection(_)));
    }

    #[test]
    fn test_weak_self_link_marks_missing_params() {
        let r = registry(Properties::from_pairs([("core/project", "proj-one")]));
        let link = r
            .weak_self_link(
                "myapi.projects.locations.things",
                &params(&[("thingsId", "t")]),
            )
            .unwrap();
        assert_eq!(
            link,
            "https://myapi.googleapis.com/v1/projects/proj-one/locations/*/things/t"
        );
    }

    #[test]
    fn test_dot_segments_rejected() {
        let r = registry(Properties::empty());
        for bad in [".", ".."] {
            let err = r
                .create(
                    "myapi.projects.locations.things",
                    &params(&[("projectsId", "p"), ("locationsId", "l"), ("thingsId", bad)]),
                )
                .unwrap_err();
            assert!(matches!(err, ResourceError::InvalidParamValue { .. }));
        }
    }

    #[test]
    fn test_slash_in_simple_param_rejected() {
        let r = registry(Properties::empty());
        let err = r
            .create(
                "myapi.projects.locations.things",
                &params(&[("projectsId", "p"), ("locationsId", "l"), ("thingsId", "a/b")]),
            )
            .unwrap_err();
        assert!(matches!(err, ResourceError::InvalidParamValue { .. }));
    }

    #[test]
    fn test_endpoint_override_is_used_and_accepted() {
        let props = Properties::from_pairs([(
            "api_endpoint_overrides/myapi",
            "http://localhost:8080/v1/",
        )]);
        let r = registry(props);
        let c = "myapi.projects.locations.things";
        let res = r.parse("/p/l/t", c, &Params::new()).unwrap();
        assert_eq!(
            res.self_link(),
            "http://localhost:8080/v1/projects/p/locations/l/things/t"
        );

        let from_override = r.parse(&res.self_link(), c, &Params::new()).unwrap();
        assert_eq!(from_override, res);

        let from_base = r
            .parse(
                "https://myapi.googleapis.com/v1/projects/p/locations/l/things/t",
                c,
                &Params::new(),
            )
            .unwrap();
        assert_eq!(from_base, res);
    }

    #[test]
    fn test_multiple_templates_first_structural_match_wins() {
        let mut r = Registry::new(Properties::empty());
        r.register(
            "fns",
            "v1",
            "projects.locations.functions",
            "https://fns.googleapis.com/v1/",
            &[
                "projects/{projectsId}/locations/{locationsId}/functions/{functionsId}",
                "projects/{projectsId}/regions/{locationsId}/functions/{functionsId}",
            ],
        )
        .unwrap();
        let c = "fns.projects.locations.functions";

        let legacy = r
            .parse("projects/p/regions/r/functions/f", c, &Params::new())
            .unwrap();
        assert_eq!(legacy.template().as_str(), "projects/{projectsId}/regions/{locationsId}/functions/{functionsId}");
        assert_eq!(legacy.get("locationsId"), Some("r"));

        let canonical = r
            .parse("projects/p/locations/r/functions/f", c, &Params::new())
            .unwrap();
        assert_eq!(legacy, canonical);
        assert_eq!(canonical.relative_name(), "projects/p/locations/r/functions/f");
    }
}
