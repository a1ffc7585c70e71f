//! Control-plane surface: a Unix domain socket accepting newline-delimited
//! JSON requests, one connection per command round-trip — the userspace
//! stand-in for the original's ioctl character device. `get_config` and
//! `get_stats` are unauthenticated reads; the other three require
//! [`crate::validator::PrivilegeCheck::has_admin_privilege`].

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::stats::StatsSnapshot;
use crate::validator::PrivilegeCheck;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    SetConfig { config: Config },
    GetConfig,
    GetStats,
    ResetStats,
    FlushConnections,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Config { ok: bool, config: Config },
    Stats { ok: bool, stats: StatsSnapshot },
    Ack { ok: bool },
    Error { ok: bool, error: String },
}

fn error_response(message: impl Into<String>) -> Response {
    Response::Error { ok: false, error: message.into() }
}

/// Handles one decoded request against `pipeline`, enforcing the privilege
/// check for mutating commands.
pub fn handle(pipeline: &Pipeline, privilege: &dyn PrivilegeCheck, request: Request) -> Response {
    match request {
        Request::GetConfig => Response::Config { ok: true, config: (*pipeline.config().load()).clone() },
        Request::GetStats => Response::Stats { ok: true, stats: pipeline.stats().snapshot() },
        Request::SetConfig { config } => {
            if !privilege.has_admin_privilege() {
                return error_response("permission denied: CAP_NET_ADMIN required");
            }
            match pipeline.config().store(config) {
                Ok(()) => Response::Ack { ok: true },
                Err(e) => error_response(e.to_string()),
            }
        }
        Request::ResetStats => {
            if !privilege.has_admin_privilege() {
                return error_response("permission denied: CAP_NET_ADMIN required");
            }
            pipeline.stats().reset();
            Response::Ack { ok: true }
        }
        Request::FlushConnections => {
            if !privilege.has_admin_privilege() {
                return error_response("permission denied: CAP_NET_ADMIN required");
            }
            pipeline.conn_tracker().flush_all(pipeline.stats());
            Response::Ack { ok: true }
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    pipeline: Arc<Pipeline>,
    privilege: Arc<dyn PrivilegeCheck>,
) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle(&pipeline, privilege.as_ref(), request),
            Err(e) => error_response(format!("invalid request: {e}")),
        };
        let mut encoded = serde_json::to_string(&response).unwrap_or_else(|_| {
            "{\"ok\":false,\"error\":\"internal encoding error\"}".to_string()
        });
        encoded.push('\n');
        write_half.write_all(encoded.as_bytes()).await?;
    }
    Ok(())
}

/// Runs the control-plane accept loop on `socket_path` until the process
/// exits. Removes a stale socket file left over from a previous run.
pub async fn serve(
    socket_path: &Path,
    pipeline: Arc<Pipeline>,
    privilege: Arc<dyn PrivilegeCheck>,
) -> io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    loop {
        let (stream, _addr) = listener.accept().await?;
        let pipeline = Arc::clone(&pipeline);
        let privilege = Arc::clone(&privilege);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, pipeline, privilege).await {
                tracing::warn!(error = %e, "control connection ended with an error");
            }
        });
    }
}
