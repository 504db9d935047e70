//! Stdio transport
//!
//! One session for the life of the process. Each line on stdin is one
//! JSON-RPC message; each outbound message is written to stdout as one line.
//! Logs must go to stderr in this mode.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::dispatcher::Dispatcher;
use crate::protocol::{error_codes, JsonRpcError};
use crate::session::CloseReason;

/// Longest accepted input line
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Serve a single session on stdin/stdout until EOF or `shutdown`
pub async fn run(dispatcher: Dispatcher) -> io::Result<()> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout(), MAX_LINE_BYTES).await
}

/// Serve a single session over any byte streams
pub async fn serve<R, W>(
    dispatcher: Dispatcher,
    reader: R,
    mut writer: W,
    max_line_bytes: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (session_id, mut rx) = dispatcher.connect();
    tracing::info!(session_id = %session_id, "Stdio session started");

    let mut writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let mut line = serde_json::to_string(&message)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut writer_done = false;

    loop {
        line.clear();

        let read = tokio::select! {
            read = read_line_bounded(&mut reader, &mut line, max_line_bytes) => read,
            // The session closed itself, e.g. after `shutdown`
            _ = &mut writer_task => {
                writer_done = true;
                break;
            }
        };

        match read {
            Ok(0) => {
                tracing::debug!(session_id = %session_id, "Stdin closed");
                break;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(session_id = %session_id, error = %e, "Rejecting oversized message");
                dispatcher
                    .reject_message(&session_id, JsonRpcError::new(error_codes::INVALID_REQUEST, e.to_string()))
                    .await;
                continue;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Failed to read stdin");
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if dispatcher.handle_message(&session_id, trimmed).await.is_err() {
            break;
        }
    }

    dispatcher
        .close_session(&session_id, CloseReason::Transport)
        .await;

    if !writer_done {
        match writer_task.await {
            Ok(result) => result?,
            Err(e) => tracing::error!(error = %e, "Stdout writer task failed"),
        }
    }

    tracing::info!(session_id = %session_id, "Stdio session ended");
    Ok(())
}

/// Read one `\n`-terminated line of at most `max_bytes`
///
/// An oversized line is consumed up to and including its newline and
/// reported as `InvalidData`, so the next call starts on the next message.
/// Returns 0 at EOF.
pub async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_bytes: usize,
) -> io::Result<usize> {
    let mut raw = Vec::new();
    let mut too_long = false;
    let mut total = 0usize;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }

        let (end, newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        total += end;
        if total > max_bytes {
            too_long = true;
            raw.clear();
        } else {
            raw.extend_from_slice(&available[..end]);
        }
        reader.consume(end);

        if newline {
            break;
        }
    }

    if too_long {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message exceeds {} bytes ({} bytes)", max_bytes, total),
        ));
    }

    buf.push_str(&String::from_utf8_lossy(&raw));
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::MockProvider;
    use crate::testing::{test_state, text_pdf, write_fixture};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, DuplexStream, Lines};

    struct Client {
        input: DuplexStream,
        output: Lines<BufReader<DuplexStream>>,
    }

    impl Client {
        async fn send(&mut self, message: &str) {
            self.input.write_all(message.as_bytes()).await.unwrap();
            self.input.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<Value> {
            let line = tokio::time::timeout(Duration::from_secs(10), self.output.next_line())
                .await
                .unwrap()
                .unwrap()?;
            Some(serde_json::from_str(&line).unwrap())
        }
    }

    fn start(dispatcher: Dispatcher, max_line_bytes: usize) -> (Client, tokio::task::JoinHandle<io::Result<()>>) {
        let (input, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, output) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(serve(dispatcher, server_in, server_out, max_line_bytes));
        let client = Client {
            input,
            output: BufReader::new(output).lines(),
        };
        (client, task)
    }

    #[tokio::test]
    async fn test_read_line_bounded() {
        let data = b"short\nthis line is far too long\nok\n".to_vec();
        let mut reader = BufReader::with_capacity(4, &data[..]);
        let mut buf = String::new();

        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), 6);
        assert_eq!(buf, "short\n");

        buf.clear();
        let err = read_line_bounded(&mut reader, &mut buf, 10).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(buf.is_empty());

        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), 3);
        assert_eq!(buf, "ok\n");

        buf.clear();
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_session_over_lines() {
        let temp = TempDir::new().unwrap();
        let sources = TempDir::new().unwrap();
        let path = write_fixture(&sources, "doc.pdf", &text_pdf(3));
        let state = test_state(temp.path(), MockProvider::new("x"));
        let (mut client, task) = start(state.dispatcher().clone(), MAX_LINE_BYTES);

        client
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#)
            .await;
        assert_eq!(client.recv().await.unwrap()["result"]["protocolVersion"], "2025-03-26");

        client
            .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;

        let call = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "extract-document-contents",
                "arguments": { "source": path.to_string_lossy(), "pages": "-1" }
            }
        });
        client.send(&call.to_string()).await;
        let response = client.recv().await.unwrap();
        assert_eq!(response["id"], 2);
        assert_eq!(response["result"]["structuredContent"]["pagesProcessed"], json!([3]));

        client.send(r#"{"jsonrpc":"2.0","id":3,"method":"shutdown"}"#).await;
        assert_eq!(client.recv().await.unwrap()["id"], 3);
        let notice = client.recv().await.unwrap();
        assert_eq!(notice["params"]["reason"], "client");
        assert!(client.recv().await.is_none());

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(state.dispatcher().registry().is_empty());
    }

    #[tokio::test]
    async fn test_eof_closes_session() {
        let temp = TempDir::new().unwrap();
        let state = test_state(temp.path(), MockProvider::new("x"));
        let (mut client, task) = start(state.dispatcher().clone(), MAX_LINE_BYTES);

        client.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
        assert_eq!(client.recv().await.unwrap()["result"], json!({}));

        let Client { input, mut output } = client;
        drop(input);

        let line = output.next_line().await.unwrap().unwrap();
        let notice: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(notice["params"]["reason"], "transport");

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(state.dispatcher().registry().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected() {
        let temp = TempDir::new().unwrap();
        let state = test_state(temp.path(), MockProvider::new("x"));
        let (mut client, _task) = start(state.dispatcher().clone(), 64);

        client.send(&format!(r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#, "x".repeat(200))).await;
        let response = client.recv().await.unwrap();
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], error_codes::INVALID_REQUEST);

        client.send(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).await;
        assert_eq!(client.recv().await.unwrap()["id"], 2);
    }
}
