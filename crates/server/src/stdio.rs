//! MCP over stdio: line-delimited JSON-RPC 2.0 served by the `rmcp` service loop.
//!
//! Lines are read as raw bytes. Anything that is not JSON (including invalid UTF-8) gets a
//! `-32700` reply with a null id, and JSON that is not an MCP message gets `-32600` when it
//! carries an id; the session carries on either way. Requests run concurrently and every
//! reply is written as one line under a single lock. On end of input the transport holds
//! the session open until each received request has been answered, then flushes and closes.

use crate::handler::RelayServer;
use crate::tools::ToolRegistry;
use anyhow::Context as _;
use rmcp::RoleServer;
use rmcp::model::{ClientJsonRpcMessage, ErrorCode, JsonRpcMessage, ServerJsonRpcMessage};
use rmcp::service::serve_directly;
use rmcp::transport::Transport;
use serde_json::{Value, json};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Serve requests from `reader` until it is exhausted, writing replies to `writer`.
///
/// # Errors
///
/// Returns an error if the service task panics.
pub async fn serve<R, W>(registry: Arc<ToolRegistry>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let transport = LineTransport::new(reader, writer);
    let running =
        serve_directly::<RoleServer, _, _, _, _>(RelayServer::new(registry), transport, None);
    let reason = running.waiting().await.context("MCP service task failed")?;
    info!(?reason, "stdio session ended");
    Ok(())
}

/// Newline-delimited JSON-RPC over a byte reader and writer.
pub struct LineTransport<R, W> {
    reader: R,
    line: Vec<u8>,
    writer: Arc<Mutex<Option<W>>>,
    /// Requests received (or replies queued by the transport itself) not yet written.
    pending: Arc<watch::Sender<usize>>,
    eof: bool,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            line: Vec::new(),
            writer: Arc::new(Mutex::new(Some(writer))),
            pending: Arc::new(watch::Sender::new(0)),
            eof: false,
        }
    }

    fn decode(&self, line: &[u8]) -> Option<ClientJsonRpcMessage> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_slice(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "received malformed JSON-RPC message");
                let reply = error_reply(&Value::Null, ErrorCode::PARSE_ERROR, "parse error");
                self.reply_directly(reply);
                return None;
            }
        };

        let id = match value.get("id") {
            Some(id) => Some(id.clone()),
            None if !value.is_object() => Some(Value::Null),
            None => None,
        };
        match serde_json::from_value::<ClientJsonRpcMessage>(value) {
            Ok(msg) => {
                if matches!(msg, JsonRpcMessage::Request(_)) {
                    self.pending.send_modify(|n| *n += 1);
                }
                Some(msg)
            }
            Err(e) => {
                match id {
                    Some(id) => {
                        warn!(error = %e, "received invalid JSON-RPC request");
                        self.reply_directly(error_reply(
                            &id,
                            ErrorCode::INVALID_REQUEST,
                            "invalid request",
                        ));
                    }
                    None => debug!(error = %e, "dropping undecodable notification"),
                }
                None
            }
        }
    }

    /// Write a reply the service loop never sees.
    fn reply_directly(&self, reply: Value) {
        let writer = Arc::clone(&self.writer);
        let pending = Arc::clone(&self.pending);
        pending.send_modify(|n| *n += 1);
        tokio::spawn(async move {
            if let Err(e) = write_line(&writer, reply.to_string().into_bytes()).await {
                warn!(error = %e, "failed to write reply");
            }
            pending.send_modify(|n| *n = n.saturating_sub(1));
        });
    }

    async fn wait_until_answered(&self) {
        let mut open = self.pending.subscribe();
        loop {
            let outstanding = *open.borrow_and_update();
            if outstanding == 0 {
                break;
            }
            if open.changed().await.is_err() {
                break;
            }
        }
    }
}

impl<R, W> Transport<RoleServer> for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = io::Error;

    fn send(
        &mut self,
        item: ServerJsonRpcMessage,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let writer = Arc::clone(&self.writer);
        let pending = Arc::clone(&self.pending);
        let answers = matches!(item, JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_));
        let encoded = serde_json::to_vec(&item);
        async move {
            let result = match encoded {
                Ok(buf) => write_line(&writer, buf).await,
                Err(e) => Err(e.into()),
            };
            if answers {
                pending.send_modify(|n| *n = n.saturating_sub(1));
            }
            result
        }
    }

    async fn receive(&mut self) -> Option<ClientJsonRpcMessage> {
        loop {
            if self.eof {
                let outstanding = *self.pending.borrow();
                debug!(pending = outstanding, "input closed; waiting for replies");
                self.wait_until_answered().await;
                return None;
            }

            match self.reader.read_until(b'\n', &mut self.line).await {
                Ok(0) => {
                    self.eof = true;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "failed to read request line");
                    self.eof = true;
                    continue;
                }
            }

            let line = std::mem::take(&mut self.line);
            if let Some(msg) = self.decode(&line) {
                return Some(msg);
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        let writer = self.writer.lock().await.take();
        if let Some(mut w) = writer {
            w.flush().await?;
            w.shutdown().await?;
        }
        Ok(())
    }
}

fn error_reply(id: &Value, code: ErrorCode, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code.0, "message": message } })
}

async fn write_line<W>(writer: &Mutex<Option<W>>, mut buf: Vec<u8>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    buf.push(b'\n');
    let mut guard = writer.lock().await;
    let Some(w) = guard.as_mut() else {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output already closed"));
    };
    w.write_all(&buf).await?;
    w.flush().await
}
