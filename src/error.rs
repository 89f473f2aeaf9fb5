use std::path::Path;

use strum::Display;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The remote call an error came from.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Operation {
    #[strum(serialize = "create generation")]
    CreateGeneration,
    #[strum(serialize = "get generation status")]
    GenerationStatus,
    #[strum(serialize = "delete generation")]
    DeleteGeneration,
    #[strum(serialize = "get user info")]
    UserInfo,
    #[strum(serialize = "list generations")]
    ListGenerations,
    #[strum(serialize = "download image")]
    DownloadImage,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(String),

    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{operation}: encoding request body: {source}")]
    Encode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation}: executing request: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: API returned status {status}")]
    Status {
        operation: Operation,
        status: u16,
        body: Vec<u8>,
    },

    #[error("{operation}: decoding response: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
        body: Vec<u8>,
    },

    #[error("generation is not complete, current status: {0}")]
    NotComplete(String),

    #[error("no images available for generation {0}")]
    NoImages(String),

    #[error("downloading image {index}: {source}")]
    Image {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sidecar metadata: {0}")]
    Sidecar(String),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Error::io(format!("{action} '{}'", path.to_string_lossy()), source)
    }

    /// The HTTP status code of a remote rejection, looking through
    /// per-image wrapping.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Image { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Body bytes the server sent along with a failed call, if any.
    pub fn raw_body(&self) -> Option<&[u8]> {
        match self {
            Error::Status { body, .. } | Error::Decode { body, .. } => Some(body.as_slice()),
            Error::Image { source, .. } => source.raw_body(),
            _ => None,
        }
    }

    /// 1-based index of the image a download workflow stopped at.
    pub fn failed_image(&self) -> Option<usize> {
        match self {
            Error::Image { index, .. } => Some(*index),
            _ => None,
        }
    }
}
