use std::time::Duration;
use thiserror::Error;

const BODY_PREVIEW_CHARS: usize = 256;

/// The request never produced a usable response.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Single request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS or protocol failure
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    Status {
        status: reqwest::StatusCode,
        body_preview: String,
    },

    /// 2xx response whose body is not what the endpoint promises
    #[error("Unable to deserialize response: {source}. Body was: \"{body_preview}\"")]
    Decode {
        #[source]
        source: serde_json::Error,
        body_preview: String,
    },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The API answered with a structured `{"error": "..."}` payload
    #[error("{0}")]
    Application(String),
}

impl ApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

pub(crate) fn body_preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        return body.to_string();
    }
    let mut preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}
