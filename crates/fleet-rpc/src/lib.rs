//! Wire protocol, framed transport, and the authentication gate (C13,
//! §4.9, §6).

pub mod certs;
pub mod framing;
pub mod gate;
pub mod message;
pub mod trust;

pub use certs::{generate_self_signed, fingerprint_of_pem, CertFingerprint, GeneratedCert};
pub use framing::{read_frame, recv_message, send_message, write_frame};
pub use gate::{AuthDecision, AuthGate};
#[cfg(unix)]
pub use gate::restrict_socket_permissions;
pub use message::{
    ClientAnswer, ClientAnswerMessage, Frame, LaunchProgressKind, ReplyMessage, RequestEnvelope, RpcMethod,
    RpcStatus, StatusCode,
};
pub use trust::{default_certificates_dir, TrustStore};
