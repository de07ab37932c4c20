//! Error types for Scrapeflow.
//!
//! All errors are represented by the `ScrapeError` enum. Errors raised inside a
//! single template execution are carried inside an [`ExecutorResult`](crate::ExecutorResult)
//! rather than returned, so every variant is serializable for the history sink.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Scrapeflow operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScrapeError {
    /// A path expression could not be resolved against its root.
    #[error("reference '{path}' not found at segment '{segment}'")]
    ReferenceNotFound {
        path: String,
        segment: String,
    },

    /// `$random(min,max)` with unusable bounds.
    #[error("invalid random range: {0}")]
    InvalidRange(String),

    /// Transport level failure, including timeouts.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The remote answered with a non-success status code.
    #[error("http error: status {status}")]
    HttpStatus {
        status: u16,
    },

    /// The extraction rule matched nothing.
    #[error("extraction empty: path '{0}' matched nothing")]
    ExtractionEmpty(String),

    /// User supplied parser code failed, timed out or returned nothing usable.
    #[error("parser error: {0}")]
    ParserError(String),

    /// A template, workflow, header group, proxy or batch task reference is unknown.
    #[error("{kind} '{reference}' not found")]
    NotFound {
        kind: String,
        reference: String,
    },

    /// Definitions that are well-formed JSON but unusable.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// A workflow step failed on every attempt.
    #[error("step '{step}' failed after {attempts} attempt(s): {last_error}")]
    RetryExhausted {
        step: String,
        attempts: u32,
        last_error: String,
    },

    /// Invalid state transition, e.g. starting a batch task that is already running.
    #[error("rejected: {0}")]
    Rejected(String),

    /// A batch worker ended without reporting its item.
    #[error("internal error: {0}")]
    Internal(String),

    /// Data conversion errors (JSON, CSV, TOML).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl ScrapeError {
    pub(crate) fn not_found(
        kind: &str,
        reference: &str,
    ) -> Self {
        ScrapeError::NotFound {
            kind: kind.to_string(),
            reference: reference.to_string(),
        }
    }

    pub(crate) fn reference_not_found(
        path: &str,
        segment: &str,
    ) -> Self {
        ScrapeError::ReferenceNotFound {
            path: path.to_string(),
            segment: segment.to_string(),
        }
    }
}

impl From<ScrapeError> for String {
    fn from(val: ScrapeError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(error: std::io::Error) -> Self {
        ScrapeError::IoError(error.to_string())
    }
}

impl From<ScrapeError> for std::io::Error {
    fn from(val: ScrapeError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for ScrapeError {
    fn from(_: FromUtf8Error) -> Self {
        ScrapeError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(error: serde_json::Error) -> Self {
        ScrapeError::Convert(error.to_string())
    }
}

impl From<csv::Error> for ScrapeError {
    fn from(error: csv::Error) -> Self {
        ScrapeError::Convert(format!("csv: {}", error))
    }
}

impl From<toml::de::Error> for ScrapeError {
    fn from(error: toml::de::Error) -> Self {
        ScrapeError::ConfigurationError(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for ScrapeError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        ScrapeError::ConfigurationError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_not_found_names_segment() {
        let err = ScrapeError::reference_not_found("$.params.q", "q");
        assert_eq!(err.to_string(), "reference '$.params.q' not found at segment 'q'");
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let err = ScrapeError::HttpStatus {
            status: 502,
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "http_status");
        assert_eq!(value["detail"]["status"], 502);

        let back: ScrapeError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }
}
