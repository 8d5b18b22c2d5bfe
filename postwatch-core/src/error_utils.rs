use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Extraction(e) => {
                error!("Extraction error details: {:?}", e);
            }
            CoreError::Media(e) => {
                error!("Media error details: {:?}", e);
            }
            CoreError::Persistence(e) => {
                error!("Persistence error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Extraction(e) => e.is_retryable(),
            CoreError::Media(e) => e.is_retryable(),
            CoreError::Persistence(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Extraction(e) => e.retry_after(),
            CoreError::Media(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Extraction(e) => e.user_friendly_message(),
            CoreError::Media(e) => e.user_friendly_message(),
            CoreError::Persistence(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. It will be retried.".to_string()
            }
            _ => "An unexpected error occurred. The worker will cool down and resume.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Extraction(_) => "EXTRACTION".to_string(),
            CoreError::Media(_) => "MEDIA".to_string(),
            CoreError::Persistence(_) => "PERSISTENCE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for ExtractionError {
    fn log_error(&self) -> &Self {
        error!("ExtractionError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ExtractionError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::RendererStatus { status, .. } => *status == 429 || *status >= 500,
            ExtractionError::NavigationFailed { .. } | ExtractionError::RenderTimeout { .. } => {
                true
            }
            // The page rendered but had the wrong shape; the next poll may differ.
            ExtractionError::NoPosts { .. } | ExtractionError::MissingField { .. } => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractionError::RendererStatus { status: 429, .. } => Some(Duration::from_secs(120)),
            _ if self.is_retryable() => Some(Duration::from_secs(60)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ExtractionError::NavigationFailed { url, .. } => {
                format!("Could not load {}. Check the renderer and network.", url)
            }
            ExtractionError::RendererStatus { status, .. } => {
                format!("The page renderer answered with status {}.", status)
            }
            ExtractionError::NoPosts { account } => format!(
                "No posts were visible for '{}'. The account may be private or the page layout changed.",
                account
            ),
            ExtractionError::MissingField { account, field } => format!(
                "The newest post for '{}' has no {}. The page layout may have changed.",
                account, field
            ),
            ExtractionError::RenderTimeout { seconds, .. } => {
                format!("The page did not render within {} seconds.", seconds)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ExtractionError::NavigationFailed { .. } => "EXTRACT_NAVIGATION_FAILED".to_string(),
            ExtractionError::RendererStatus { .. } => "EXTRACT_RENDERER_STATUS".to_string(),
            ExtractionError::NoPosts { .. } => "EXTRACT_NO_POSTS".to_string(),
            ExtractionError::MissingField { .. } => "EXTRACT_MISSING_FIELD".to_string(),
            ExtractionError::RenderTimeout { .. } => "EXTRACT_TIMEOUT".to_string(),
        }
    }
}

impl ErrorExt for MediaError {
    fn log_error(&self) -> &Self {
        error!("MediaError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("MediaError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            MediaError::HttpStatus { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            MediaError::TransferFailed { .. } => true,
            MediaError::WriteFailed { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        if self.is_retryable() {
            Some(Duration::from_secs(2))
        } else {
            None
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            MediaError::HttpStatus { status_code, .. } => {
                format!("Media server answered with status {}.", status_code)
            }
            MediaError::TransferFailed { .. } => {
                "Media download failed. The post is recorded without it.".to_string()
            }
            MediaError::WriteFailed { path, .. } => {
                format!("Could not save media to {}. Check disk space and permissions.", path)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            MediaError::HttpStatus { .. } => "MEDIA_HTTP_STATUS".to_string(),
            MediaError::TransferFailed { .. } => "MEDIA_TRANSFER_FAILED".to_string(),
            MediaError::WriteFailed { .. } => "MEDIA_WRITE_FAILED".to_string(),
        }
    }
}

impl ErrorExt for PersistenceError {
    fn log_error(&self) -> &Self {
        error!("PersistenceError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("PersistenceError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PersistenceError::DedupWrite { .. } | PersistenceError::LogAppend { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            PersistenceError::DedupWrite { path, .. } => format!(
                "Could not save seen posts to {}. They are kept in memory and saved again next cycle.",
                path
            ),
            PersistenceError::DedupRead { path, .. } => {
                format!("Could not read seen posts from {}.", path)
            }
            PersistenceError::DedupCorrupt { path, .. } => {
                format!("Seen posts file {} is not valid JSON.", path)
            }
            PersistenceError::LogAppend { path, .. } => {
                format!("Could not append to post log {}.", path)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            PersistenceError::DedupWrite { .. } => "PERSIST_DEDUP_WRITE".to_string(),
            PersistenceError::DedupRead { .. } => "PERSIST_DEDUP_READ".to_string(),
            PersistenceError::DedupCorrupt { .. } => "PERSIST_DEDUP_CORRUPT".to_string(),
            PersistenceError::LogAppend { .. } => "PERSIST_LOG_APPEND".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need the operator to fix the file
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::ReadFailed { path, .. } => {
                format!("Configuration file '{}' could not be read. Check its permissions.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::ReadFailed { .. } => "CONFIG_READ_FAILED".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
            if error.is_retryable() {
                if let Some(retry_after) = error.retry_after() {
                    info!("Error is retryable. Retry after: {:?}", retry_after);
                }
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
