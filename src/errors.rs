// ABOUTME: Centralized error handling for the cache and task-routing core
// ABOUTME: Defines error codes, retry classification, and conversions used across store/cache/router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Unified Error Handling
//!
//! Every fallible operation in the cache/store/router pipeline returns [`CoreError`].
//! Handlers registered on the task router classify failures as [`Retryability::Retryable`]
//! or [`Retryability::Fatal`] so the router can decide whether to back off and retry or
//! drop the task and log it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Input validation failed (e.g. empty required field on a producer call)
    InvalidInput,
    /// Requested resource was not found
    ResourceNotFound,
    /// Remote API call failed transiently (timeout, 5xx)
    RemoteTransient,
    /// Remote API call was rate-limited (429)
    RemoteRateLimited,
    /// Remote API call failed permanently (4xx other than 429, unknown entity)
    RemotePermanent,
    /// Durable store I/O failed
    StoreError,
    /// Serialization/deserialization failed
    SerializationError,
    /// Configuration is missing or invalid
    ConfigError,
    /// An internal invariant was violated — indicates a bug, not a recoverable condition
    InvariantViolation,
    /// Internal error not covered by a more specific code
    InternalError,
}

impl ErrorCode {
    /// User-facing description of this error code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::RemoteTransient => "The remote API call failed transiently",
            Self::RemoteRateLimited => "The remote API rate-limited the request",
            Self::RemotePermanent => "The remote API rejected the request permanently",
            Self::StoreError => "The durable store operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
            Self::ConfigError => "Configuration is missing or invalid",
            Self::InvariantViolation => "An internal invariant was violated",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// Application error type carrying a code and a message
#[derive(Debug, Clone, Error)]
pub struct CoreError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl CoreError {
    /// Create a new error with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid input convenience constructor
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource-not-found convenience constructor
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(ErrorCode::ResourceNotFound, format!("{resource} not found"))
    }

    /// Store error convenience constructor
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreError, message)
    }

    /// Configuration error convenience constructor
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Invariant-violation convenience constructor — callers should treat this as fatal
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvariantViolation, message)
    }

    /// Internal error convenience constructor
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Remote transient-failure convenience constructor
    #[must_use]
    pub fn remote_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteTransient, message)
    }

    /// Remote rate-limited convenience constructor
    #[must_use]
    pub fn remote_rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemoteRateLimited, message)
    }

    /// Remote permanent-failure convenience constructor
    #[must_use]
    pub fn remote_permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RemotePermanent, message)
    }

    /// Classify this error for retry purposes (see [`Retryability`])
    #[must_use]
    pub const fn retryability(&self) -> Retryability {
        match self.code {
            ErrorCode::RemoteTransient | ErrorCode::RemoteRateLimited => Retryability::Retryable,
            _ => Retryability::Fatal,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type CoreResult<T> = Result<T, CoreError>;

/// Retry classification for task handler failures
///
/// A handler returns `Retryable` for transient/rate-limited remote failures and `Fatal`
/// for permanent remote failures or programming errors; the router decides what happens
/// next based on this tag, not on the error's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Worth retrying with backoff (network timeout, 5xx, 429)
    Retryable,
    /// Not worth retrying (4xx other than 429, unknown entity, handler panic)
    Fatal,
}

/// Conversion from `anyhow::Error` to `CoreError`
impl From<anyhow::Error> for CoreError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InternalError, error.to_string())
    }
}

/// Conversion from `sqlx::Error` to `CoreError`
impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::StoreError, error.to_string())
    }
}

/// Conversion from `serde_json::Error` to `CoreError`
impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, error.to_string())
    }
}

/// Conversion from `std::io::Error` to `CoreError`
impl From<std::io::Error> for CoreError {
    fn from(error: std::io::Error) -> Self {
        Self::new(ErrorCode::InternalError, format!("IO error: {error}"))
    }
}

/// Conversion from `uuid::Error` to `CoreError`
impl From<uuid::Error> for CoreError {
    fn from(error: uuid::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("UUID error: {error}"))
    }
}

/// Conversion from `chrono::ParseError` to `CoreError`
impl From<chrono::ParseError> for CoreError {
    fn from(error: chrono::ParseError) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("Date parse error: {error}"))
    }
}
