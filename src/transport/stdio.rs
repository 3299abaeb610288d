//! Line-delimited JSON-RPC over stdin/stdout, for the server hosted as a
//! subprocess of a single trusted parent. There is no bearer-token
//! handshake on this transport -- the parent that spawned the process
//! already is the authenticated party, so every frame runs as the admin
//! subject, matching how `noa-mcp-server` hosts a single trusted client
//! over the same pipe.

use crate::dispatch::Dispatcher;
use crate::models::Subject;
use crate::Result;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

pub async fn run(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = lines.next_line().await.map_err(|e| crate::SpiralError::Internal(e.into()))?;
        let Some(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let response = super::handle_frame(&dispatcher, Subject::Admin, request_id, trimmed).await;
        let encoded = serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":-32603,"message":"encode failure: {e}"}}}}"#)
        });
        stdout.write_all(encoded.as_bytes()).await.map_err(|e| crate::SpiralError::Internal(e.into()))?;
        stdout.write_all(b"\n").await.map_err(|e| crate::SpiralError::Internal(e.into()))?;
        stdout.flush().await.map_err(|e| crate::SpiralError::Internal(e.into()))?;
    }
    Ok(())
}
