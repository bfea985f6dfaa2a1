//! Resource errors
//!
//! Every failure of the registry, resolver and parser is a deterministic
//! function of its input and configuration, so none of these are retried.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("unknown collection [{0}]")]
    UnregisteredCollection(String),

    #[error("could not determine the collection of [{0}]; name it explicitly or use an `api.collection::` prefix")]
    UnknownCollection(String),

    #[error("collection [{collection}] is already registered with different templates: {existing:?}")]
    DuplicateCollection {
        collection: String,
        existing: Vec<String>,
    },

    #[error("path [{path}] of collection [{collection}] is already used by [{existing}]")]
    AmbiguousPath {
        collection: String,
        existing: String,
        path: String,
    },

    #[error("could not parse resource [{input}]{}", expected_suffix(.expected))]
    InvalidResource { input: String, expected: Vec<String> },

    #[error("wrong collection: expected [{expected}], got [{got}], for path [{path}]")]
    WrongCollection {
        expected: String,
        got: String,
        path: String,
    },

    #[error("invalid value [{value}] for parameter [{param}]: {reason}")]
    InvalidParamValue {
        param: String,
        value: String,
        reason: String,
    },

    #[error("{}", resolution_message(.param, .hints))]
    ParameterResolution { param: String, hints: Vec<String> },

    #[error("invalid resource definition: {0}")]
    InvalidDefinition(String),
}

fn expected_suffix(expected: &[String]) -> String {
    if expected.is_empty() {
        String::new()
    } else {
        format!(", expected one of: {}", expected.join(", "))
    }
}

fn resolution_message(param: &str, hints: &[String]) -> String {
    if hints.is_empty() {
        return format!(
            "failed to find a value for [{}]; it must be given explicitly",
            param
        );
    }
    let summary = hints
        .iter()
        .map(|h| format!("- {}", h))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "failed to find a value for [{}]. It can be set in the following ways:\n{}",
        param, summary
    )
}

impl ResourceError {
    pub fn invalid_resource(input: impl Into<String>) -> Self {
        Self::InvalidResource {
            input: input.into(),
            expected: Vec::new(),
        }
    }

    pub fn invalid_definition(context: impl Into<String>) -> Self {
        Self::InvalidDefinition(context.into())
    }

    /// Name of the parameter that could not be resolved, if that is the failure.
    pub fn missing_param(&self) -> Option<&str> {
        match self {
            Self::ParameterResolution { param, .. } => Some(param),
            _ => None,
        }
    }
}
