use std::{io, num::ParseIntError, str::Utf8Error};

use quick_xml::events::attributes::AttrError;
use thiserror::Error;

use crate::data::osm::ElementKey;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-fatal: the element carries no tags any catalog feature accepts.
    #[error("no feature matched {element}")]
    NoFeatureMatched { element: ElementKey },

    /// Fatal for the whole augmentation run.
    #[error("external lookup '{lookup}' failed: {message}")]
    ExternalLookupFailed { lookup: String, message: String },

    #[error("malformed element: {0}")]
    MalformedElement(String),

    #[error("malformed feature catalog: {0}")]
    MalformedCatalog(String),

    #[error("invalid element identifier '{0}', expected <type>:<id>")]
    InvalidElementId(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn lookup_failed(lookup: impl Into<String>, err: impl ToString) -> Self {
        Error::ExternalLookupFailed {
            lookup: lookup.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error must abort the description pipeline.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NoFeatureMatched { .. })
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::MalformedElement(value.to_string())
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error::MalformedElement(value.to_string())
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error::MalformedElement(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
