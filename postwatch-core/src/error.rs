use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Operation timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Renderer returned status {status}: {message}")]
    RendererStatus { status: u16, message: String },

    #[error("No post elements found for {account}")]
    NoPosts { account: String },

    #[error("Post for {account} is missing its {field}")]
    MissingField { account: String, field: String },

    #[error("Rendering {url} timed out after {seconds} seconds")]
    RenderTimeout { url: String, seconds: u64 },
}

#[derive(Error, Debug, Clone)]
pub enum MediaError {
    #[error("Download of {url} failed with status {status_code}")]
    HttpStatus { url: String, status_code: u16 },

    #[error("Download of {url} failed: {reason}")]
    TransferFailed { url: String, reason: String },

    #[error("Could not write media file {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Could not write dedup file {path}: {source}")]
    DedupWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read dedup file {path}: {source}")]
    DedupRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dedup file {path} is corrupt: {source}")]
    DedupCorrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not append to post log {path}: {source}")]
    LogAppend {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Could not read configuration file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
