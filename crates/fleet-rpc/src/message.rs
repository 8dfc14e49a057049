//! Wire message types (§6): the RPC method list, the request envelope,
//! and the reply/status messages a bidirectional-streaming call exchanges.

use fleet_core::error::{FleetError, TargetDetail};
use serde::{Deserialize, Serialize};

/// One entry per RPC method named in §6: a request-variant-per-operation
/// enum covering the client-facing surface of this daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcMethod {
    Create,
    Launch,
    Purge,
    Find,
    Info,
    List,
    Clone,
    Networks,
    Mount,
    Recover,
    SshInfo,
    Start,
    Stop,
    Suspend,
    Restart,
    Delete,
    Umount,
    Version,
    Get,
    Set,
    Keys,
    Authenticate,
    Snapshot,
    Restore,
    DaemonInfo,
    Ping,
}

/// A client request: method, method-specific JSON payload (decoded by
/// `fleet-daemon`'s dispatch table), and the verbosity gate for streamed
/// log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub correlation_id: String,
    pub method: RpcMethod,
    #[serde(default)]
    pub verbosity_level: u8,
    pub payload: serde_json::Value,
}

impl RequestEnvelope {
    pub fn new(correlation_id: impl Into<String>, method: RpcMethod, payload: serde_json::Value) -> Self {
        RequestEnvelope {
            correlation_id: correlation_id.into(),
            method,
            verbosity_level: 0,
            payload,
        }
    }

    pub fn with_verbosity(mut self, verbosity_level: u8) -> Self {
        self.verbosity_level = verbosity_level.min(4);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchProgressKind {
    ImageDownload,
    Extracting,
    Preparing,
    WaitingForSsh,
    WaitingForCloudInit,
}

/// Zero or more of these may stream before a call's terminal `RpcStatus`
/// (§6: "Reply messages carry one or more of: log_line, reply_message,
/// launch_progress, update_info, confirm_*").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyMessage {
    LogLine { verbosity: u8, text: String },
    ReplyMessage { text: String },
    LaunchProgress { percent: Option<u8>, kind: LaunchProgressKind },
    UpdateInfo { instance: String, current_release: String, new_release: String },
    /// A bridge auto-creation requires user confirmation (§4.7
    /// `NonAuthorizedBridge`); the client's answer arrives as a follow-up
    /// `ClientAnswer` carrying the same `correlation_id`.
    ConfirmBridgeCreation { correlation_id: String, interface: String },
    ConfirmOverwrite { correlation_id: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAnswer {
    Yes,
    No,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAnswerMessage {
    pub correlation_id: String,
    pub answer: ClientAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Unavailable,
    Unimplemented,
    ResourceExhausted,
    DeadlineExceeded,
    Internal,
    Cancelled,
}

impl StatusCode {
    fn from_status_name(name: &str) -> Self {
        match name {
            "INVALID_ARGUMENT" => StatusCode::InvalidArgument,
            "NOT_FOUND" => StatusCode::NotFound,
            "FAILED_PRECONDITION" => StatusCode::FailedPrecondition,
            "UNAVAILABLE" => StatusCode::Unavailable,
            "UNIMPLEMENTED" => StatusCode::Unimplemented,
            "RESOURCE_EXHAUSTED" => StatusCode::ResourceExhausted,
            "DEADLINE_EXCEEDED" => StatusCode::DeadlineExceeded,
            "INTERNAL" => StatusCode::Internal,
            _ => StatusCode::Internal,
        }
    }
}

/// The terminal message of every call (§7): a status code, a
/// human-readable message, and — for multi-target requests like
/// `launch`/`start` across several names — per-instance detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
    #[serde(default)]
    pub target_details: Vec<TargetDetail>,
}

impl RpcStatus {
    pub fn ok() -> Self {
        RpcStatus {
            code: StatusCode::Ok,
            message: String::new(),
            target_details: Vec::new(),
        }
    }

    pub fn from_error(error: &FleetError) -> Self {
        RpcStatus {
            code: StatusCode::from_status_name(error.status_name()),
            message: error.to_string(),
            target_details: Vec::new(),
        }
    }

    pub fn with_target_details(mut self, details: Vec<TargetDetail>) -> Self {
        self.target_details = details;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// One frame on the connection after the initial cert handshake: either
/// a client request/answer, or a server reply/terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Request(RequestEnvelope),
    ClientAnswer(ClientAnswerMessage),
    Reply(ReplyMessage),
    Status(RpcStatus),
}
