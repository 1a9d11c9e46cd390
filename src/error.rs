//! Error types for the image service client and the setup phase

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::client::ImageServiceClient`]
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, body read)
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    /// The response body was not the JSON the endpoint promises
    #[error("{endpoint} returned an unexpected body: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// The fixture image does not exist on disk
    #[error("Test image '{}' not found. Please create it.", .0.display())]
    FixtureNotFound(PathBuf),

    /// The fixture image exists but could not be read
    #[error("Failed to read test image '{}': {source}", .path.display())]
    FixtureUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    pub fn transport(endpoint: &str, source: reqwest::Error) -> Self {
        ClientError::Transport {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    pub fn malformed(endpoint: &str, reason: impl Into<String>) -> Self {
        ClientError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures that abort the run before any load is generated
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Error during login: {0}")]
    Login(#[source] ClientError),

    #[error("Error during image upload: {0}")]
    Upload(#[source] ClientError),
}

impl SetupError {
    /// Message printed to the operator before exiting.
    pub fn operator_message(&self) -> String {
        match self {
            SetupError::Upload(ClientError::FixtureNotFound(path)) => {
                format!("Error: Test image '{}' not found. Please create it.", path.display())
            }
            other => other.to_string(),
        }
    }
}
