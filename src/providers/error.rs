use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials are missing or were rejected. Never retried.
    #[error("Authentication with {provider} failed: {message}")]
    Auth { provider: String, message: String },

    #[error("Failed to parse credentials file '{0}'")]
    Credentials(PathBuf, #[source] serde_yaml::Error),

    /// The provider reported success but the raw file is not where it should be.
    #[error("Provider reported success but raw file '{0}' is missing")]
    MissingOutput(PathBuf),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("Retrieval job {job} failed: {message}")]
    JobFailed { job: String, message: String },

    #[error("Retrieval job {job} did not finish within {seconds} seconds")]
    Timeout { job: String, seconds: u64 },

    #[error("Failed to launch '{0}'")]
    ToolLaunch(String, #[source] std::io::Error),

    #[error("'{program}' exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("I/O error writing raw file '{0}'")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Download stream failed")]
    DownloadIo(#[from] std::io::Error),
}
