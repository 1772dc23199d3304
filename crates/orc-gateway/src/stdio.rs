//! Stdio transport (SPEC_FULL.md §6): a newline-delimited JSON-RPC loop used
//! by the `self` tool server a spawned Codex subprocess connects back through
//! (`mcp-stdio` subcommand). Mirrors the auth-then-dispatch shape of
//! `agenticlaw-gateway::ws::handle_text_message`, minus the broadcast
//! event stream a one-shot stdio client has no use for.

use std::sync::Arc;

use orc_core::protocol::IncomingMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::rpc::{dispatch, to_response};
use crate::state::AppState;

pub async fn serve(state: Arc<AppState>) {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    let mut authenticated = state.auth.verify(None);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => line,
            Ok(Some(_)) => continue,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "stdio transport read error");
                return;
            }
        };

        match serde_json::from_str::<IncomingMessage>(&line) {
            Ok(IncomingMessage::Auth { token }) => {
                authenticated = state.auth.verify(token.as_deref());
                let event = serde_json::json!({ "event": "auth", "data": { "ok": authenticated } });
                write_line(&mut stdout, &event).await;
            }
            Ok(IncomingMessage::Rpc(req)) => {
                if !authenticated {
                    let resp = serde_json::json!({
                        "id": req.id,
                        "error": { "code": -32000, "message": "not authenticated" },
                    });
                    write_line(&mut stdout, &resp).await;
                    continue;
                }
                let result = dispatch(&req.method, req.params, &state).await;
                let response = to_response(req.id, result);
                write_line(&mut stdout, &response).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "unparseable stdio message");
            }
        }
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, value: &impl serde::Serialize) {
    if let Ok(mut json) = serde_json::to_string(value) {
        json.push('\n');
        let _ = stdout.write_all(json.as_bytes()).await;
        let _ = stdout.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_message_parses_auth_shorthand() {
        let parsed: IncomingMessage = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert!(matches!(parsed, IncomingMessage::Auth { token: Some(t) } if t == "abc"));
    }
}
