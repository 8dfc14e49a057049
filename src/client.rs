//! The Unix-socket RPC client (§4.9, §6): connects to `fleetd`, performs the
//! cert handshake, and drives one request to its terminal status, invoking a
//! callback for every streamed reply in between.

use std::path::Path;

use anyhow::{Context, Result};
use fleet_rpc::message::{ClientAnswerMessage, Frame, RequestEnvelope, RpcMethod, RpcStatus};
use fleet_rpc::{recv_message, send_message};
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;

#[derive(Debug, Serialize, Deserialize)]
struct Handshake {
    cert_pem: String,
}

pub struct RpcClient {
    stream: UnixStream,
}

impl RpcClient {
    pub async fn connect(socket_path: &Path, cert_pem: &str) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("connecting to {}", socket_path.display()))?;
        let mut client = RpcClient { stream };
        send_message(
            &mut client.stream,
            &Handshake {
                cert_pem: cert_pem.to_string(),
            },
        )
        .await
        .context("sending identity handshake")?;
        Ok(client)
    }

    /// Sends one request and streams replies to `on_reply` until the
    /// terminal status arrives. A `ClientAnswer` follow-up (for a
    /// confirmation prompt) is never sent by this client since no
    /// dispatch handler currently emits `ConfirmBridgeCreation`/
    /// `ConfirmOverwrite` — reserved for when the bridge-creation
    /// confirmation substream is wired up.
    pub async fn call(
        &mut self,
        method: RpcMethod,
        payload: serde_json::Value,
        verbosity: u8,
        mut on_reply: impl FnMut(&fleet_rpc::message::ReplyMessage),
    ) -> Result<RpcStatus> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let req = RequestEnvelope::new(correlation_id, method, payload).with_verbosity(verbosity);
        send_message(&mut self.stream, &Frame::Request(req))
            .await
            .context("sending request")?;

        loop {
            let frame: Frame = recv_message(&mut self.stream).await.context("reading server frame")?;
            match frame {
                Frame::Reply(reply) => on_reply(&reply),
                Frame::Status(status) => return Ok(status),
                Frame::ClientAnswer(_) | Frame::Request(_) => continue,
            }
        }
    }

    /// Sends a follow-up answer to a pending confirmation prompt. Unused
    /// until a dispatch handler emits `ConfirmBridgeCreation`/
    /// `ConfirmOverwrite`, but kept here since the wire protocol already
    /// models it.
    #[allow(dead_code)]
    pub async fn answer(&mut self, message: ClientAnswerMessage) -> Result<()> {
        send_message(&mut self.stream, &Frame::ClientAnswer(message))
            .await
            .context("sending client answer")
    }
}
