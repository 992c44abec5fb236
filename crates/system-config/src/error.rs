use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ConfigError> = core::result::Result<T, E>;

/// Errors raised while loading or compiling configuration.
///
/// `node` fields carry the element location, prefixed by its file when known
/// (`stage.xml:/StageParameters/Drive`).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("XML error in {file}: {message}")]
    Xml { file: String, message: String },
    #[error("{node}: missing {field}")]
    MissingField { node: String, field: String },
    #[error("{node}: malformed {field} value {value:?}")]
    MalformedValue {
        node: String,
        field: String,
        value: String,
    },
    #[error("{node}: {kind} collision between index {first} and {second}")]
    Collision {
        node: String,
        kind: &'static str,
        first: usize,
        second: usize,
    },
    #[error("{node}: unsupported {field} {value:?}")]
    UnsupportedVariant {
        node: String,
        field: String,
        value: String,
    },
    #[error("{node}: {field} needs {needed} bytes but only {width} are declared")]
    WidthOverflow {
        node: String,
        field: String,
        needed: usize,
        width: usize,
    },
    #[error("include chain deeper than {depth} levels at {file}")]
    IncludeDepth { depth: usize, file: PathBuf },
    #[error("{node}: {message}")]
    Structure { node: String, message: String },
    #[error(transparent)]
    Link(#[from] apt_link::LinkError),
}

impl ConfigError {
    pub(crate) fn missing(node: &crate::ConfigNode, field: impl Into<String>) -> Self {
        ConfigError::MissingField {
            node: node.location(),
            field: field.into(),
        }
    }

    pub(crate) fn malformed(
        node: &crate::ConfigNode,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ConfigError::MalformedValue {
            node: node.location(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub(crate) fn structure(node: &crate::ConfigNode, message: impl Into<String>) -> Self {
        ConfigError::Structure {
            node: node.location(),
            message: message.into(),
        }
    }

    pub(crate) fn collision(
        node: &crate::ConfigNode,
        kind: &'static str,
        c: crate::resolver::Collision,
    ) -> Self {
        ConfigError::Collision {
            node: node.location(),
            kind,
            first: c.first,
            second: c.second,
        }
    }

    pub(crate) fn unsupported(
        node: &crate::ConfigNode,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ConfigError::UnsupportedVariant {
            node: node.location(),
            field: field.into(),
            value: value.into(),
        }
    }
}
