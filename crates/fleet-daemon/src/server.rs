//! Unix-domain-socket accept loop (§4.9, §6): remove a stale socket, bind,
//! restrict permissions, then spawn one task per accepted connection.

use std::path::Path;
use std::sync::Arc;

use fleet_rpc::framing::{read_frame, write_frame};
use fleet_rpc::gate::{restrict_socket_permissions, AuthDecision};
use fleet_rpc::message::{Frame, RpcMethod, RpcStatus, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::state::AppState;

/// The pre-authentication preamble: the client's self-signed cert, sent
/// once before any `Frame` traffic (§4.9).
#[derive(Debug, Serialize, Deserialize)]
struct Handshake {
    cert_pem: String,
}

/// Binds `socket_path`, removing any stale file left by a prior run, and
/// accepts connections until the process is asked to shut down.
pub async fn serve(socket_path: &Path, state: Arc<AppState>) -> anyhow::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    restrict_socket_permissions(socket_path)?;
    info!(socket = %socket_path.display(), "fleetd listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                debug!(error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, mut stream: UnixStream) -> anyhow::Result<()> {
    let handshake: Handshake = recv(&mut stream).await?;
    let decision = state
        .auth_gate
        .authenticate_connection(handshake.cert_pem.as_bytes())
        .await?;

    match decision {
        AuthDecision::Bootstrapped => info!("bootstrapped first client onto the trust store"),
        AuthDecision::Trusted => debug!("client cert already trusted"),
        AuthDecision::Untrusted => warn!("client cert is untrusted; only `authenticate` will be honored"),
    }
    let mut trusted = decision != AuthDecision::Untrusted;

    loop {
        let frame: Frame = match recv(&mut stream).await {
            Ok(frame) => frame,
            Err(_) => return Ok(()), // client disconnected
        };

        let req = match frame {
            Frame::Request(req) => req,
            Frame::ClientAnswer(answer) => {
                debug!(correlation_id = %answer.correlation_id, "no pending confirmation awaits this answer");
                continue;
            }
            _ => continue,
        };

        if !trusted && req.method != RpcMethod::Authenticate {
            let status = RpcStatus {
                code: StatusCode::Unavailable,
                message: "connection is not yet trusted; call authenticate first".to_string(),
                target_details: Vec::new(),
            };
            send(&mut stream, &Frame::Status(status)).await?;
            continue;
        }

        let is_authenticate = req.method == RpcMethod::Authenticate;
        let req = if is_authenticate {
            inject_cert(req, &handshake.cert_pem)
        } else {
            req
        };

        let (reply_tx, mut reply_rx) = mpsc::channel(32);
        let worker_state = Arc::clone(&state);
        let handle = tokio::spawn(async move { dispatch::dispatch(worker_state, req, reply_tx).await });

        while let Some(reply) = reply_rx.recv().await {
            if send(&mut stream, &Frame::Reply(reply)).await.is_err() {
                break;
            }
        }

        let status = match handle.await {
            Ok(status) => status,
            Err(join_error) => RpcStatus {
                code: StatusCode::Internal,
                message: format!("dispatch task panicked: {join_error}"),
                target_details: Vec::new(),
            },
        };

        if is_authenticate && status.is_ok() {
            trusted = true;
        }

        send(&mut stream, &Frame::Status(status)).await?;
    }
}

/// Splices the connection's handshake cert into the `authenticate` RPC's
/// payload so the client doesn't need to resend it (§4.9).
fn inject_cert(mut req: fleet_rpc::message::RequestEnvelope, cert_pem: &str) -> fleet_rpc::message::RequestEnvelope {
    if let serde_json::Value::Object(ref mut map) = req.payload {
        map.insert("client_cert_pem".to_string(), serde_json::Value::String(cert_pem.to_string()));
    }
    req
}

async fn recv<R, T>(reader: &mut R) -> anyhow::Result<T>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let data = read_frame(reader).await?;
    Ok(serde_json::from_slice(&data)?)
}

async fn send<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(message)?;
    write_frame(writer, &data).await
}
