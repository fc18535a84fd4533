use reqwest::{Method, StatusCode};

/// The ways a run can fail. Every variant is fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Environment variable(s) not defined: {}", .0.join(", "))]
    MissingEnvironment(Vec<String>),

    #[error("Environment variable {name} is set to {value:?}, expected {expected}")]
    InvalidEnvironment {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("{method} {url} failed: {source}")]
    TransportFailure {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} failed with http status {status}, response: {body}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("reading build number state from {path}: {source}")]
    StateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
