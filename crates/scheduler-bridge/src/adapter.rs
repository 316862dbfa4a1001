//! MCP adapter for the agent runtime
//!
//! Reads newline-delimited MCP requests, answers the handshake and catalog
//! requests inline and runs each `tools/call` as its own task so slow
//! scheduler calls never block later input. All replies funnel through one
//! writer task, one complete line per message, in completion order.

use anyhow::{anyhow, Context, Result};
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::ErrorData;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use scheduler_bridge_protocol::{encode_line, LineReader, McpMethod, McpRequest, McpResponse};

use crate::tools::{self, SchedulerRpc};

/// How long in-flight tool calls may keep running after stdin closes
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves the MCP side of the bridge over a pair of byte streams
pub struct McpAdapter<S> {
    rpc: Arc<S>,
    drain_timeout: Duration,
}

impl<S: SchedulerRpc + 'static> McpAdapter<S> {
    pub fn new(rpc: Arc<S>) -> Self {
        Self {
            rpc,
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    /// Override the grace period for in-flight calls at end of input
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Advertised in the `initialize` reply
    pub fn server_info() -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Scheduler Bridge".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Schedule prompts to run later in this conversation, list them, and cancel them."
                    .to_string(),
            ),
        }
    }

    /// Serve until `input` reaches end of stream.
    ///
    /// Returns an error if reading fails, if writing replies fails, or if a
    /// tool-call task panics.
    pub async fn run<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (replies, outbox) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_replies(output, outbox));

        let mut lines = LineReader::new(input);
        let mut calls = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line, &replies, &mut calls),
                    Ok(None) => {
                        info!("Agent runtime closed input");
                        break Ok(());
                    }
                    Err(e) => break Err(anyhow::Error::new(e).context("Failed to read MCP input")),
                },
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            break Err(anyhow!("Tool call task panicked: {}", e));
                        }
                    }
                }
            }
        };

        let outcome = match outcome {
            Ok(()) => self.drain(&mut calls).await,
            Err(e) => {
                calls.abort_all();
                Err(e)
            }
        };

        drop(replies);
        // Aborted calls drop their reply senders once the set is gone.
        drop(calls);
        let written = writer
            .await
            .context("Reply writer task failed")?
            .context("Failed to write MCP output");

        outcome.and(written)
    }

    async fn drain(&self, calls: &mut JoinSet<()>) -> Result<()> {
        if calls.is_empty() {
            return Ok(());
        }
        info!(in_flight = calls.len(), "Waiting for in-flight tool calls");

        let finished = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = calls.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        return Err(anyhow!("Tool call task panicked: {}", e));
                    }
                }
            }
            Ok(())
        })
        .await;

        match finished {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    abandoned = calls.len(),
                    "Tool calls still running after {:?}, abandoning them", self.drain_timeout
                );
                calls.abort_all();
                Ok(())
            }
        }
    }

    fn handle_line(
        &self,
        line: &str,
        replies: &mpsc::UnboundedSender<McpResponse>,
        calls: &mut JoinSet<()>,
    ) {
        let request: McpRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping malformed MCP line: {}", e);
                return;
            }
        };

        let Some(method) = McpMethod::parse(&request.method) else {
            if request.is_notification() {
                debug!(method = %request.method, "Ignoring unknown notification");
            } else {
                warn!(method = %request.method, "Unsupported MCP method");
                let id = request.id.unwrap_or(JsonValue::Null);
                send(replies, McpResponse::method_not_found(id, &request.method));
            }
            return;
        };

        if !method.expects_reply() {
            info!(%method, "Agent runtime notification");
            return;
        }

        let id = request.id.unwrap_or(JsonValue::Null);
        match method {
            McpMethod::Initialize => {
                info!("Agent runtime initializing");
                let reply = match serde_json::to_value(Self::server_info()) {
                    Ok(info) => McpResponse::success(id, info),
                    Err(e) => McpResponse::error(id, ErrorData::internal_error(e.to_string(), None)),
                };
                send(replies, reply);
            }
            McpMethod::ToolsList => {
                debug!("Listing tools");
                send(replies, McpResponse::success(id, json!({ "tools": tools::catalog() })));
            }
            McpMethod::ToolsCall => {
                let params = request.params.unwrap_or(JsonValue::Null);
                let name = params.get("name").and_then(JsonValue::as_str).map(str::to_string);
                let arguments = params.get("arguments").cloned().unwrap_or(JsonValue::Null);
                let rpc = Arc::clone(&self.rpc);
                let replies = replies.clone();

                calls.spawn(async move {
                    let result = match name {
                        Some(name) => {
                            debug!(tool = %name, "Dispatching tool call");
                            tools::call_tool(rpc.as_ref(), &name, arguments).await
                        }
                        None => {
                            warn!("tools/call without a tool name");
                            tools::text_result("tools/call requires a tool name", true)
                        }
                    };
                    let reply = match serde_json::to_value(&result) {
                        Ok(result) => McpResponse::success(id, result),
                        Err(e) => {
                            McpResponse::error(id, ErrorData::internal_error(e.to_string(), None))
                        }
                    };
                    send(&replies, reply);
                });
            }
            McpMethod::Initialized => {}
        }
    }
}

fn send(replies: &mpsc::UnboundedSender<McpResponse>, reply: McpResponse) {
    if replies.send(reply).is_err() {
        warn!("Reply writer has stopped, dropping reply");
    }
}

async fn write_replies<W>(
    mut output: W,
    mut outbox: mpsc::UnboundedReceiver<McpResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outbox.recv().await {
        let line = match encode_line(&reply) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode MCP reply: {}", e);
                continue;
            }
        };
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, BridgeResult};
    use async_trait::async_trait;
    use scheduler_bridge_protocol::SchedulerMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;
    use tokio_test::io::Builder;

    /// Answers after a per-method delay so replies can overtake each other
    struct SlowRpc {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchedulerRpc for SlowRpc {
        async fn call(&self, method: SchedulerMethod, _params: JsonValue) -> BridgeResult<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                SchedulerMethod::List => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(json!([]))
                }
                SchedulerMethod::Cancel => Err(BridgeError::Remote("Task 4 not found".into())),
                SchedulerMethod::Create => Ok(json!({"id": 1})),
            }
        }
    }

    fn adapter() -> (McpAdapter<SlowRpc>, Arc<SlowRpc>) {
        let rpc = Arc::new(SlowRpc {
            calls: AtomicUsize::new(0),
        });
        (McpAdapter::new(Arc::clone(&rpc)), rpc)
    }

    async fn run_with(input: &str) -> Vec<JsonValue> {
        let (adapter, _) = adapter();
        let (mut agent, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, agent_out) = tokio::io::duplex(64 * 1024);

        agent.write_all(input.as_bytes()).await.unwrap();
        drop(agent);

        adapter.run(server_in, server_out).await.unwrap();
        read_all(agent_out).await
    }

    async fn read_all(stream: DuplexStream) -> Vec<JsonValue> {
        let mut lines = LineReader::new(stream);
        let mut out = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_malformed_line_produces_no_output() {
        let (adapter, _) = adapter();
        let input = Builder::new().read(b"this is not json\n").build();
        let output = Builder::new().build();

        adapter.run(input, output).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialized_notification_is_silent() {
        let (adapter, _) = adapter();
        let input = Builder::new()
            .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .build();
        let output = Builder::new().build();

        adapter.run(input, output).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_reply() {
        let replies = run_with(
            "{\"jsonrpc\":\"2.0\",\"id\":0,\"method\":\"initialize\",\"params\":{}}\n",
        )
        .await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["jsonrpc"], "2.0");
        assert_eq!(replies[0]["id"], 0);
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "scheduler-bridge");
        assert!(replies[0]["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_reply() {
        let replies = run_with("{\"id\":\"a\",\"method\":\"tools/list\"}\n").await;

        let tools = replies[0]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0]["name"], "schedule_task");
    }

    #[tokio::test]
    async fn test_unknown_method_gets_method_not_found() {
        let replies = run_with(
            "{\"id\":7,\"method\":\"resources/list\"}\n{\"method\":\"notifications/cancelled\"}\n",
        )
        .await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 7);
        assert_eq!(replies[0]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_replies_in_completion_order() {
        let input = concat!(
            "{\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"list_scheduled_tasks\",\"arguments\":{}}}\n",
            "{\"id\":2,\"method\":\"tools/call\",\"params\":{\"name\":\"cancel_scheduled_task\",\"arguments\":{\"task_id\":4}}}\n",
        );
        let replies = run_with(input).await;

        let ids: Vec<i64> = replies.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, [2, 1]);

        assert_eq!(replies[0]["result"]["isError"], true);
        assert_eq!(replies[0]["result"]["content"][0]["text"], "Task 4 not found");
        assert_eq!(replies[1]["result"]["content"][0]["text"], "[]");
    }

    #[tokio::test]
    async fn test_tool_failure_keeps_serving() {
        let input = concat!(
            "{\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"schedule_task\",\"arguments\":{\"name\":\"t\"}}}\n",
            "{\"id\":2,\"method\":\"tools/call\",\"params\":{\"arguments\":{}}}\n",
            "{\"id\":3,\"method\":\"tools/list\"}\n",
        );
        let replies = run_with(input).await;

        assert_eq!(replies.len(), 3);
        for reply in &replies {
            assert!(reply.get("error").is_none());
        }
        let by_id = |id: i64| replies.iter().find(|r| r["id"] == id).unwrap();
        assert_eq!(by_id(1)["result"]["isError"], true);
        assert_eq!(by_id(2)["result"]["isError"], true);
        assert!(by_id(3)["result"]["tools"].is_array());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_abandons_slow_calls() {
        let (adapter, rpc) = adapter();
        let adapter = adapter.with_drain_timeout(Duration::from_millis(50));
        let input = Builder::new()
            .read(b"{\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"list_scheduled_tasks\"}}\n")
            .build();
        let output = Builder::new().build();

        adapter.run(input, output).await.unwrap();
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }
}
