//! Structured error kinds (§7).
//!
//! Call sites throughout the workspace mostly propagate with
//! `anyhow::{Result, Context}`, matching the corpus's dominant style, but
//! every error that crosses the RPC boundary is (or wraps) one of these
//! typed variants so `fleet-rpc` can map it onto a status code and, for
//! launch-style multi-target requests, a per-instance detail payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC-facing error kinds, one per row of the §7 table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FleetError {
    #[error("unrecognized setting '{key}'")]
    UnrecognizedSetting { key: String },

    #[error("invalid setting: {message}")]
    InvalidSetting { message: String },

    #[error("instance settings error: {message}")]
    InstanceSettings { message: String },

    #[error("operation requires user confirmation: {message}")]
    NonAuthorizedBridge { message: String },

    #[error("snapshot name already taken: {name}")]
    SnapshotNameTaken { name: String },

    #[error("no such snapshot: {name}")]
    NoSuchSnapshot { name: String },

    #[error("invalid memory size: {message}")]
    InvalidMemorySize { message: String },

    #[error("invalid disk size: {message}")]
    InvalidDiskSize { message: String },

    #[error("invalid hostname: {name}")]
    InvalidHostname { name: String },

    #[error("download failed: {message}")]
    Download { message: String },

    #[error("manifest error: {message}")]
    Manifest { message: String },

    #[error("SSH command failed: {message}")]
    SshExecFailure { message: String },

    #[error("timed out waiting on guest: {message}")]
    SshProcessTimeout { message: String },

    #[error("not implemented on this backend: {message}")]
    NotImplementedOnThisBackend { message: String },

    #[error("failed to start instance '{name}': {message}")]
    StartException { name: String, message: String },

    #[error("failed to prepare image: {message}")]
    CreateImageException { message: String },

    #[error("unsupported setting value type")]
    UnsupportedSettingValueType,

    #[error("too many matching images for query")]
    TooManyMatches,

    #[error("operation cancelled")]
    Cancelled,

    #[error("MAC address allocation exhausted after {attempts} attempts")]
    MacAllocationExhausted { attempts: u32 },

    #[error("deadline exceeded: {message}")]
    DeadlineExceeded { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FleetError {
    /// Name of the gRPC-style status this error surfaces as (§7).
    pub fn status_name(&self) -> &'static str {
        match self {
            FleetError::UnrecognizedSetting { .. }
            | FleetError::InvalidSetting { .. }
            | FleetError::InvalidMemorySize { .. }
            | FleetError::InvalidDiskSize { .. }
            | FleetError::InvalidHostname { .. } => "INVALID_ARGUMENT",

            FleetError::NoSuchSnapshot { .. } => "NOT_FOUND",

            FleetError::SnapshotNameTaken { .. } => "INVALID_ARGUMENT",

            FleetError::InstanceSettings { .. }
            | FleetError::NonAuthorizedBridge { .. }
            | FleetError::SshExecFailure { .. }
            | FleetError::SshProcessTimeout { .. }
            | FleetError::StartException { .. }
            | FleetError::CreateImageException { .. }
            | FleetError::Cancelled => "FAILED_PRECONDITION",

            FleetError::Download { .. } | FleetError::Manifest { .. } => "UNAVAILABLE",

            FleetError::NotImplementedOnThisBackend { .. } => "UNIMPLEMENTED",

            FleetError::UnsupportedSettingValueType | FleetError::TooManyMatches => {
                "INVALID_ARGUMENT"
            }

            FleetError::MacAllocationExhausted { .. } => "RESOURCE_EXHAUSTED",
            FleetError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            FleetError::Internal { .. } => "INTERNAL",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FleetError::Internal {
            message: message.into(),
        }
    }
}

/// Per-target outcome for multi-instance requests (launch, start, ...).
///
/// Lets a client render "3 of 5 instances started" rather than a single
/// opaque failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetDetail {
    pub instance: String,
    pub code: TargetErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetErrorCode {
    DoesNotExist,
    InstanceDeleted,
    Other,
}
