//! Path templates
//!
//! A template is a `/`-separated list of literal segments and parameter
//! slots, e.g. `projects/{projectsId}/locations/{locationsId}`. A final slot
//! written `{+param}` takes every remaining segment, which is how object
//! names containing `/` are expressed.

use super::error::{ResourceError, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Param(String),
    /// Multi-segment slot, only allowed in last position
    Rest(String),
}

impl Segment {
    fn param_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param(name) | Segment::Rest(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

fn valid_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PathTemplate {
    /// Parse a template string
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Err(ResourceError::invalid_definition("empty path template"));
        }

        let parts: Vec<&str> = trimmed.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut seen = HashSet::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                let (name, rest) = match inner.strip_prefix('+') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                if !valid_param_name(name) {
                    return Err(ResourceError::invalid_definition(format!(
                        "bad parameter [{}] in template [{}]",
                        part, raw
                    )));
                }
                if rest && i != parts.len() - 1 {
                    return Err(ResourceError::invalid_definition(format!(
                        "[{}] must be the last segment of template [{}]",
                        part, raw
                    )));
                }
                if !seen.insert(name.to_string()) {
                    return Err(ResourceError::invalid_definition(format!(
                        "parameter [{}] repeated in template [{}]",
                        name, raw
                    )));
                }
                if rest {
                    Segment::Rest(name.to_string())
                } else {
                    Segment::Param(name.to_string())
                }
            } else {
                if part.is_empty() || part.contains('{') || part.contains('}') {
                    return Err(ResourceError::invalid_definition(format!(
                        "bad literal segment [{}] in template [{}]",
                        part, raw
                    )));
                }
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in path order
    pub fn params(&self) -> Vec<&str> {
        self.segments.iter().filter_map(Segment::param_name).collect()
    }

    pub fn last_param(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(Segment::param_name)
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.segments.iter().any(|s| s.param_name() == Some(name))
    }

    /// True when the last parameter accepts values containing `/`
    pub fn is_multi_segment(&self, name: &str) -> bool {
        matches!(self.segments.last(), Some(Segment::Rest(n)) if n == name)
    }

    /// Structurally match already-decoded path tokens.
    ///
    /// Literals must be equal and every parameter slot must receive a
    /// non-empty token. A rest slot may contain empty pieces (`dir//x`) as
    /// long as its value is not empty. Returns the captured parameter values.
    pub fn match_tokens(&self, tokens: &[String]) -> Option<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        let mut idx = 0;

        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => {
                    if tokens.get(idx)? != lit {
                        return None;
                    }
                    idx += 1;
                }
                Segment::Param(name) => {
                    let token = tokens.get(idx)?;
                    if token.is_empty() {
                        return None;
                    }
                    values.insert(name.clone(), token.clone());
                    idx += 1;
                }
                Segment::Rest(name) => {
                    let value = tokens.get(idx..)?.join("/");
                    if value.is_empty() {
                        return None;
                    }
                    values.insert(name.clone(), value);
                    idx = tokens.len();
                }
            }
        }

        (idx == tokens.len()).then_some(values)
    }

    /// Substitute parameter values.
    ///
    /// With `encode` each value is percent-encoded as a single path segment;
    /// a multi-segment value renders its `/` as `%2F`. Missing values render
    /// as `*`.
    pub fn expand(&self, values: &BTreeMap<String, String>, encode: bool) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(lit) => lit.clone(),
                Segment::Param(name) | Segment::Rest(name) => match values.get(name) {
                    Some(v) if encode => urlencoding::encode(v).into_owned(),
                    Some(v) => v.clone(),
                    None => "*".to_string(),
                },
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Human-readable shape for error messages, e.g. `projects/PROJECT/...`
    pub fn format_hint(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(lit) => lit.clone(),
                Segment::Param(name) | Segment::Rest(name) => name.to_uppercase(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
